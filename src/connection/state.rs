use std::fmt;

/// Lifecycle state of a [`Connection`](crate::Connection).
///
/// All transitions go through `Connection::change_state`, an atomic
/// compare-and-swap; invalid transitions are rejected, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };

        write!(f, "{}", name)
    }
}
