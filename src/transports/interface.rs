use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::connection::Connection;
use crate::protocol::NegotiationResponse;

/// Capability set every transport strategy implements. The connection owns
/// exactly one transport at a time and drives it exclusively through this
/// interface.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports_keep_alive(&self) -> bool;

    /// Performs the negotiate handshake for the connection.
    async fn negotiate(
        &self,
        connection: &Arc<Connection>,
        connection_data: &str,
    ) -> Result<NegotiationResponse, String>;

    /// Opens the transport's channel to the server. Resolves exactly once:
    /// with `Ok` when the transport is ready to deliver frames, with `Err`
    /// when it could not be brought up.
    async fn start(&self, connection: &Arc<Connection>, connection_data: &str) -> Result<(), String>;

    /// Sends one already serialized payload to the server.
    async fn send(
        &self,
        connection: &Arc<Connection>,
        data: &str,
        connection_data: &str,
    ) -> Result<(), String>;

    /// Stops the transport. `None` means do not contact the server. Repeated
    /// aborts are no-ops.
    async fn abort(&self, connection: &Arc<Connection>, timeout: Option<Duration>, connection_data: &str);

    /// Signal from the heartbeat monitor that the connection went silent; the
    /// transport decides whether and how to reconnect.
    fn lost_connection(&self, connection: &Arc<Connection>);
}
