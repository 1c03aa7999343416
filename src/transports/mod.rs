mod auto;
mod http_based;
mod interface;
mod long_polling;
mod web_socket;

pub use auto::AutoTransport;
pub use interface::ClientTransport;
pub use long_polling::LongPollingTransport;
pub use web_socket::WebSocketTransport;
