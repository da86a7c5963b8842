//! Connection state machine.
//!
//! Every lifecycle decision goes through [`transition`], so the retry policy
//! lives in one table instead of in event handlers.

use tdbridge_core::constants::CLOSE_NORMAL;

/// Lifecycle of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport and none wanted.
    Disconnected,
    /// A transport is being established (or about to be retried).
    Connecting,
    /// Transport is open; sends go straight out.
    Open,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Caller asked to connect.
    Start,
    /// Caller asked to disconnect.
    Stop,
    /// The transport handshake completed.
    TransportOpened,
    /// The transport closed. `None` means no close frame (abnormal end or
    /// failed handshake).
    TransportClosed(Option<u16>),
}

/// Side effect the manager performs after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do.
    None,
    /// Open a new transport.
    Connect,
    /// Cancel the in-flight handshake.
    Abort,
    /// Close the open transport with the normal close code.
    Close,
    /// Flush the outbound queue into the now-open transport.
    Drain,
    /// Open a new transport after the reconnect delay.
    Reconnect,
}

/// Whether a close code means the peer ended the connection on purpose.
pub fn is_normal_close(code: Option<u16>) -> bool {
    code == Some(CLOSE_NORMAL)
}

/// Next state and the action to take for `input` in `state`.
pub fn transition(state: ConnectionState, input: Input) -> (ConnectionState, Action) {
    use self::ConnectionState::{Connecting, Disconnected, Open};

    match (state, input) {
        (Disconnected, Input::Start) => (Connecting, Action::Connect),
        (Connecting | Open, Input::Start) => (state, Action::None),

        (Disconnected, Input::Stop) => (Disconnected, Action::None),
        (Connecting, Input::Stop) => (Disconnected, Action::Abort),
        (Open, Input::Stop) => (Disconnected, Action::Close),

        (Connecting, Input::TransportOpened) => (Open, Action::Drain),
        (Disconnected | Open, Input::TransportOpened) => (state, Action::None),

        (Connecting | Open, Input::TransportClosed(code)) if is_normal_close(code) => {
            (Disconnected, Action::None)
        }
        (Connecting | Open, Input::TransportClosed(_)) => (Connecting, Action::Reconnect),
        (Disconnected, Input::TransportClosed(_)) => (Disconnected, Action::None),
    }
}
