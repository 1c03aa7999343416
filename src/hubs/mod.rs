mod hub_connection;
mod hub_proxy;
mod statistics;

pub use hub_connection::HubConnection;
pub use hub_proxy::HubProxy;
pub use statistics::{NoopStatistics, UsageStatistics};
