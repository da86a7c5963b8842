//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::BridgeSettings;

/// Resolve the default settings file path (`~/.tdbridge/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tdbridge").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BridgeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<BridgeSettings> {
    let defaults = serde_json::to_value(BridgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TDJSON_SERVER_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored (file/default value stays).
pub fn apply_env_overrides<F>(settings: &mut BridgeSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("TDJSON_SERVER_LISTEN_HOSTNAME") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("TDJSON_SERVER_LISTEN_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.u64("TDJSON_SERVER_MAX_RECEIVE_INTERVAL", 0, 60_000) {
        settings.server.max_receive_interval_ms = v;
    }
    if let Some(v) = env.i32("TDJSON_SERVER_LOG_VERBOSITY_LEVEL", 0, 1024) {
        settings.engine.log_verbosity_level = v;
    }
    if let Some(v) = env.string("TDJSON_SERVER_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("TDJSON_SERVER_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an integer and keep it only if it lies within `min..=max`.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.ranged(name, min, max)
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.ranged(name, min, max)
    }

    fn i32(&self, name: &str, min: i32, max: i32) -> Option<i32> {
        self.ranged(name, min, max)
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = self.string(name)?;
        let result = parse_in_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 3000, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_settings_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server":{"port":4100,"maxReceiveIntervalMs":250},"logging":{"json":true}}"#,
        )
        .unwrap();

        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.server.port, 4100);
        assert_eq!(settings.server.max_receive_interval_ms, 250);
        assert_eq!(settings.server.host, "localhost");
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_json_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_matches!(read_settings_file(&path), Err(SettingsError::Json(_)));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = BridgeSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("TDJSON_SERVER_LISTEN_PORT", "3999"),
                ("TDJSON_SERVER_LISTEN_HOSTNAME", "0.0.0.0"),
                ("TDJSON_SERVER_MAX_RECEIVE_INTERVAL", "50"),
                ("TDJSON_SERVER_LOG_VERBOSITY_LEVEL", "5"),
                ("TDJSON_SERVER_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.server.port, 3999);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.max_receive_interval_ms, 50);
        assert_eq!(settings.engine.log_verbosity_level, 5);
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = BridgeSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("TDJSON_SERVER_LISTEN_PORT", "not-a-port"),
                ("TDJSON_SERVER_MAX_RECEIVE_INTERVAL", "-1"),
                ("TDJSON_SERVER_LOG_JSON", "maybe"),
            ]),
        );
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.max_receive_interval_ms, 100);
        assert!(!settings.logging.json);
    }

    #[test]
    fn empty_env_value_is_ignored() {
        let mut settings = BridgeSettings::default();
        apply_env_overrides(&mut settings, env(&[("TDJSON_SERVER_LISTEN_HOSTNAME", "")]));
        assert_eq!(settings.server.host, "localhost");
    }

    // ── parsing helpers ─────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("sure"), None);
    }

    #[test]
    fn parse_in_range_bounds() {
        assert_eq!(parse_in_range::<u64>("100", 0, 100), Some(100));
        assert_eq!(parse_in_range::<u64>("101", 0, 100), None);
        assert_eq!(parse_in_range::<i32>(" 3 ", 0, 10), Some(3));
    }
}
