//! Wire-level constants shared by server and client.

/// Envelope key naming the message kind.
pub const TYPE_KEY: &str = "@type";

/// Envelope key holding the opaque correlation payload.
pub const EXTRA_KEY: &str = "@extra";

/// Envelope key carrying the engine client id on engine-originated messages.
pub const CLIENT_ID_KEY: &str = "@client_id";

/// Field injected into `@extra` to correlate a response with its request.
pub const REQUEST_ID_KEY: &str = "requestId";

/// Query parameter carrying the logical client key on connect.
pub const CLIENT_KEY_PARAM: &str = "clientKey";

/// Normal (caller-initiated) WebSocket close.
pub const CLOSE_NORMAL: u16 = 1000;

/// Server is shutting down.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code for a frame whose data type is not accepted (binary frames).
pub const CLOSE_UNSUPPORTED: u16 = 1003;

/// Close code for a text frame that is not a JSON object.
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;

/// Close code for a peer that stopped answering pings.
pub const CLOSE_POLICY: u16 = 1008;
