mod http;
pub(crate) mod web_socket;

pub use http::{EhttpClient, HttpClient, HttpError};
pub(crate) use web_socket::{WebSocketClient, WebSocketEvents};
