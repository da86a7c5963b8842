//! The message envelope exchanged with the engine and with logical clients.
//!
//! An envelope is any JSON object. Only three keys mean anything to the
//! bridge: `@type`, `@extra` and `@client_id`. Everything else is opaque and
//! passes through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::{CLIENT_ID_KEY, EXTRA_KEY, REQUEST_ID_KEY, TYPE_KEY};

/// Reasons a frame cannot be treated as an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The text is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The JSON is valid but not an object.
    #[error("expected a JSON object, got {kind}")]
    NotAnObject {
        /// JSON kind that was received (`array`, `string`, ...).
        kind: &'static str,
    },
}

/// A JSON object message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// Parse a text frame into an envelope.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Wrap an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(EnvelopeError::NotAnObject {
                kind: json_kind(&other),
            }),
        }
    }

    /// The `@type` discriminator, if present and a string.
    pub fn type_name(&self) -> Option<&str> {
        self.0.get(TYPE_KEY).and_then(Value::as_str)
    }

    /// The engine client id this message is addressed to.
    ///
    /// `None` for engine-wide messages (key absent or `null`).
    pub fn client_id(&self) -> Option<i64> {
        self.0.get(CLIENT_ID_KEY).and_then(Value::as_i64)
    }

    /// Whether `@client_id` is present with a non-null value, integer or not.
    pub fn has_client_id(&self) -> bool {
        self.0.get(CLIENT_ID_KEY).is_some_and(|v| !v.is_null())
    }

    /// The correlation token stored at `@extra.requestId`.
    pub fn request_id(&self) -> Option<&str> {
        self.0
            .get(EXTRA_KEY)
            .and_then(|extra| extra.get(REQUEST_ID_KEY))
            .and_then(Value::as_str)
    }

    /// Merge a correlation token into `@extra`, keeping every other `@extra` key.
    ///
    /// A missing `@extra` is created. A non-object `@extra` cannot hold keys and
    /// is replaced.
    pub fn set_request_id(&mut self, token: &str) {
        let extra = self
            .0
            .entry(EXTRA_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !extra.is_object() {
            *extra = Value::Object(Map::new());
        }
        if let Value::Object(map) = extra {
            let _ = map.insert(REQUEST_ID_KEY.into(), Value::String(token.into()));
        }
    }

    /// Look up an arbitrary key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Serialize to compact JSON text.
    pub fn to_json(&self) -> String {
        // A `Map<String, Value>` always serializes.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Borrow the underlying object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a plain JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Value> for Envelope {
    type Error = EnvelopeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Envelope> for Value {
    fn from(envelope: Envelope) -> Self {
        envelope.into_value()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn parse_object() {
        let env = Envelope::parse(r#"{"@type":"getMe","@client_id":3}"#).unwrap();
        assert_eq!(env.type_name(), Some("getMe"));
        assert_eq!(env.client_id(), Some(3));
    }

    #[test]
    fn parse_rejects_invalid_json() {
        let err = Envelope::parse("not json").unwrap_err();
        assert_matches!(err, EnvelopeError::InvalidJson(_));
    }

    #[test]
    fn parse_rejects_array() {
        let err = Envelope::parse("[1,2,3]").unwrap_err();
        assert_matches!(err, EnvelopeError::NotAnObject { kind: "array" });
        assert_eq!(err.to_string(), "expected a JSON object, got array");
    }

    #[test]
    fn parse_rejects_scalar() {
        assert_matches!(
            Envelope::parse("42"),
            Err(EnvelopeError::NotAnObject { kind: "number" })
        );
        assert_matches!(
            Envelope::parse(r#""text""#),
            Err(EnvelopeError::NotAnObject { kind: "string" })
        );
    }

    #[test]
    fn non_integer_client_id_is_present_but_unreadable() {
        for raw in [r#"{"@client_id":"5"}"#, r#"{"@client_id":5.5}"#] {
            let env = Envelope::parse(raw).unwrap();
            assert_eq!(env.client_id(), None);
            assert!(env.has_client_id());
        }
    }

    #[test]
    fn missing_client_id_is_none() {
        let env = Envelope::parse(r#"{"@type":"updateOption"}"#).unwrap();
        assert_eq!(env.client_id(), None);
    }

    #[test]
    fn null_client_id_is_none() {
        let env = Envelope::parse(r#"{"@type":"updateOption","@client_id":null}"#).unwrap();
        assert_eq!(env.client_id(), None);
        assert!(!env.has_client_id());
    }

    #[test]
    fn request_id_read_from_extra() {
        let env = Envelope::parse(r#"{"@type":"ok","@extra":{"requestId":"abc"}}"#).unwrap();
        assert_eq!(env.request_id(), Some("abc"));
    }

    #[test]
    fn request_id_absent_without_extra() {
        let env = Envelope::parse(r#"{"@type":"ok"}"#).unwrap();
        assert_eq!(env.request_id(), None);
    }

    #[test]
    fn request_id_ignores_non_string() {
        let env = Envelope::parse(r#"{"@type":"ok","@extra":{"requestId":7}}"#).unwrap();
        assert_eq!(env.request_id(), None);
    }

    #[test]
    fn set_request_id_creates_extra() {
        let mut env = Envelope::parse(r#"{"@type":"getAuthorizationState"}"#).unwrap();
        env.set_request_id("t1");
        assert_eq!(env.request_id(), Some("t1"));
    }

    #[test]
    fn set_request_id_keeps_other_extra_keys() {
        let mut env = Envelope::from_value(json!({
            "@type": "getChats",
            "@extra": {"trace": "x", "attempt": 2},
            "limit": 10,
        }))
        .unwrap();
        env.set_request_id("t2");

        let value = env.into_value();
        assert_eq!(value["@extra"]["trace"], "x");
        assert_eq!(value["@extra"]["attempt"], 2);
        assert_eq!(value["@extra"]["requestId"], "t2");
        assert_eq!(value["limit"], 10);
    }

    #[test]
    fn set_request_id_overwrites_previous_token() {
        let mut env = Envelope::parse(r#"{"@type":"x","@extra":{"requestId":"old"}}"#).unwrap();
        env.set_request_id("new");
        assert_eq!(env.request_id(), Some("new"));
    }

    #[test]
    fn set_request_id_replaces_non_object_extra() {
        let mut env = Envelope::parse(r#"{"@type":"x","@extra":"opaque"}"#).unwrap();
        env.set_request_id("t3");
        assert_eq!(env.get("@extra"), Some(&json!({"requestId": "t3"})));
    }

    #[test]
    fn opaque_fields_survive_roundtrip() {
        let original = json!({
            "@type": "sendMessage",
            "chat_id": -100_123,
            "input_message_content": {"@type": "inputMessageText", "text": {"text": "hi"}},
        });
        let env = Envelope::from_value(original.clone()).unwrap();
        let back: Value = serde_json::from_str(&env.to_json()).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn serde_is_transparent() {
        let env: Envelope = serde_json::from_str(r#"{"@type":"ok"}"#).unwrap();
        assert_eq!(serde_json::to_string(&env).unwrap(), r#"{"@type":"ok"}"#);
    }
}
