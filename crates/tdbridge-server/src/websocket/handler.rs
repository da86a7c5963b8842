//! Classification of inbound WebSocket frames.

use axum::extract::ws::Message;
use tdbridge_core::constants::{CLOSE_INVALID_PAYLOAD, CLOSE_UNSUPPORTED};
use tdbridge_core::{Envelope, EnvelopeError};

/// What the session does with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Submit this text to the engine unchanged.
    Forward(String),
    /// Protocol violation: close with this code and reason.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason sent to the peer.
        reason: &'static str,
    },
    /// The peer closed the connection.
    Closed,
    /// Control frame with no payload for the engine.
    Ignore,
}

/// Decide what to do with `msg`.
///
/// Text frames must hold a JSON object; anything else is a protocol error.
/// The original text is forwarded, not a re-serialization.
pub fn classify(msg: &Message) -> FrameOutcome {
    match msg {
        Message::Text(text) => match Envelope::parse(text.as_str()) {
            Ok(_) => FrameOutcome::Forward(text.as_str().to_owned()),
            Err(EnvelopeError::InvalidJson(_)) => FrameOutcome::Close {
                code: CLOSE_INVALID_PAYLOAD,
                reason: "invalid JSON",
            },
            Err(EnvelopeError::NotAnObject { .. }) => FrameOutcome::Close {
                code: CLOSE_INVALID_PAYLOAD,
                reason: "expected a JSON object",
            },
        },
        Message::Binary(_) => FrameOutcome::Close {
            code: CLOSE_UNSUPPORTED,
            reason: "binary frames are not supported",
        },
        Message::Close(_) => FrameOutcome::Closed,
        Message::Ping(_) | Message::Pong(_) => FrameOutcome::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn text(s: &str) -> Message {
        Message::Text(s.to_owned().into())
    }

    #[test]
    fn object_is_forwarded_verbatim() {
        let raw = r#"{ "@type": "getAuthorizationState",  "@extra": {"a": 1} }"#;
        assert_eq!(classify(&text(raw)), FrameOutcome::Forward(raw.to_owned()));
    }

    #[test]
    fn invalid_json_closes_with_1007() {
        assert_matches!(
            classify(&text("{not json")),
            FrameOutcome::Close { code: 1007, .. }
        );
    }

    #[test]
    fn non_object_closes_with_1007() {
        for raw in ["[1,2]", "42", "\"s\"", "null"] {
            assert_matches!(
                classify(&text(raw)),
                FrameOutcome::Close { code: 1007, reason: "expected a JSON object" }
            );
        }
    }

    #[test]
    fn binary_closes_with_1003() {
        assert_matches!(
            classify(&Message::Binary(b"{}".to_vec().into())),
            FrameOutcome::Close { code: 1003, .. }
        );
    }

    #[test]
    fn control_frames_are_ignored() {
        assert_eq!(classify(&Message::Ping(vec![1].into())), FrameOutcome::Ignore);
        assert_eq!(classify(&Message::Pong(vec![].into())), FrameOutcome::Ignore);
        assert_eq!(classify(&Message::Close(None)), FrameOutcome::Closed);
    }
}
