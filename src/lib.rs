mod completer;
mod communication;
mod connection;
mod hubs;
mod protocol;
mod tests;
mod transports;

pub use completer::{ManualFuture, ManualFutureCompleter};
pub use communication::{EhttpClient, HttpClient, HttpError};
pub use connection::{Connection, ConnectionState, HeartbeatMonitor, KeepAliveData};
pub use hubs::{HubConnection, HubProxy, NoopStatistics, UsageStatistics};
pub use protocol::{HubInvocation, HubRegistrationData, HubResult, NegotiationResponse, Version};
pub use transports::{AutoTransport, ClientTransport, LongPollingTransport, WebSocketTransport};
