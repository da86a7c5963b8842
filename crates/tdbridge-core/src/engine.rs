//! The native engine collaborator.
//!
//! The engine is single-instance per process and exposes four operations.
//! Only one task may call [`Engine::receive`]; everything else may be called
//! from any task.

use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::envelope::Envelope;

/// Engine-assigned logical client id.
pub type ClientId = i32;

/// Errors from the engine's synchronous bootstrap calls.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `execute` returned no response at all.
    #[error("engine returned no response to {request_type}")]
    ExecuteFailed {
        /// `@type` of the request that failed.
        request_type: String,
    },

    /// `execute` responded with something other than `ok`.
    #[error("engine rejected {request_type}: {response}")]
    Rejected {
        /// `@type` of the request that was rejected.
        request_type: String,
        /// Raw engine response.
        response: String,
    },
}

/// Operations the bridge consumes from the native engine.
pub trait Engine: Send + Sync {
    /// Allocate a fresh logical client id. Never fails.
    fn create_client_id(&self) -> ClientId;

    /// Submit a JSON request on behalf of `client_id`. Fire-and-forget.
    fn send(&self, client_id: ClientId, request: &str);

    /// Wait up to `timeout` for the next pending message.
    fn receive(&self, timeout: Duration) -> Option<String>;

    /// Run a synchronous command and return its JSON response.
    fn execute(&self, request: &str) -> Option<String>;
}

/// Set the engine's own log verbosity.
///
/// Any response other than `{"@type":"ok"}` is a fatal startup condition.
pub fn set_log_verbosity(engine: &dyn Engine, level: i32) -> Result<(), EngineError> {
    const REQUEST_TYPE: &str = "setLogVerbosityLevel";

    let request = json!({
        "@type": REQUEST_TYPE,
        "new_verbosity_level": level,
    });
    let Some(response) = engine.execute(&request.to_string()) else {
        return Err(EngineError::ExecuteFailed {
            request_type: REQUEST_TYPE.into(),
        });
    };

    let accepted = Envelope::parse(&response)
        .map(|env| env.type_name() == Some("ok"))
        .unwrap_or(false);
    if !accepted {
        warn!(level, response, "engine rejected log verbosity");
        return Err(EngineError::Rejected {
            request_type: REQUEST_TYPE.into(),
            response,
        });
    }

    debug!(level, "engine log verbosity set");
    Ok(())
}
