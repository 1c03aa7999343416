mod connection;
mod heartbeat;
mod keep_alive;
mod state;

pub use connection::Connection;
pub(crate) use connection::ConnectionDelegate;
pub use heartbeat::HeartbeatMonitor;
pub use keep_alive::KeepAliveData;
pub use state::ConnectionState;
