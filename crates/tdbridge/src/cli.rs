//! Command-line interface. Flags override the settings file and environment.

use std::path::PathBuf;

use clap::Parser;
use tdbridge_settings::BridgeSettings;

/// WebSocket bridge multiplexing clients onto one TDLib engine.
#[derive(Parser, Debug, Default)]
#[command(name = "tdbridge", version, about)]
pub struct Cli {
    /// Settings file (defaults to `~/.tdbridge/settings.json`).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    pub port: Option<u16>,

    /// Upper bound on the engine poll loop's idle wait, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub max_receive_interval: Option<u64>,

    /// Engine log verbosity set at startup.
    #[arg(long, value_name = "LEVEL")]
    pub engine_verbosity: Option<i32>,

    /// Leave the engine's log verbosity untouched.
    #[arg(long)]
    pub keep_engine_verbosity: bool,

    /// Log filter when `RUST_LOG` is unset (e.g. `info`, `tdbridge_server=debug`).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Apply flags that were given on top of `settings`.
    pub fn apply(&self, settings: &mut BridgeSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ms) = self.max_receive_interval {
            settings.server.max_receive_interval_ms = ms;
        }
        if let Some(level) = self.engine_verbosity {
            settings.engine.log_verbosity_level = level;
        }
        if self.keep_engine_verbosity {
            settings.engine.set_log_verbosity = false;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}
