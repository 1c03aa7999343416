use std::str::FromStr;
use std::sync::{Arc, Mutex};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use http::Uri;
use log::{debug, info};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_native_tls::native_tls::TlsConnector;
use tokio_websockets::{ClientBuilder, MaybeTlsStream, Message, WebSocketStream};

/// Delegate events raised by a [`WebSocketClient`].
///
/// `on_open` fires once when the handshake completes, before any frame is
/// delivered. The receiver raises exactly one terminal event: `on_error` when
/// the stream fails, `on_close` when it ends cleanly.
pub(crate) trait WebSocketEvents: Send + Sync {
    fn on_open(&self);
    fn on_text(&self, message: String);
    fn on_error(&self, error: String);
    fn on_close(&self);
}

type SocketSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type SocketStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// The WebSocket collaborator: one open socket with a spawned receiver task
/// that translates inbound frames into delegate events.
pub(crate) struct WebSocketClient {
    sink: tokio::sync::Mutex<SocketSink>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketClient {
    pub(crate) async fn connect(url: &str, events: Arc<dyn WebSocketEvents>) -> Result<Arc<Self>, String> {
        let uri = Uri::from_str(url).map_err(|e| format!("invalid websocket url {:?}: {}", url, e))?;

        debug!("connecting websocket to {}", uri);
        let builder = ClientBuilder::from_uri(uri.clone());

        let stream = if Some("wss") == uri.scheme_str() {
            debug!("connecting to secure endpoint...");
            let Ok(connector) = TlsConnector::new() else {
                return Err("cannot create default TLS connector".to_string());
            };

            let connector = tokio_websockets::Connector::NativeTls(connector.into());
            builder.connector(&connector).connect().await
        } else {
            builder.connect().await
        };

        match stream {
            Ok((socket, _)) => {
                let (write, read) = socket.split();

                let client = Arc::new(WebSocketClient {
                    sink: tokio::sync::Mutex::new(write),
                    receiver: Mutex::new(None),
                });

                events.on_open();
                client.start_receiving(read, events);

                Ok(client)
            }
            Err(error) => Err(error.to_string()),
        }
    }

    fn start_receiving(&self, mut stream: SocketStream, events: Arc<dyn WebSocketEvents>) {
        let handle = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(message) => {
                        if message.is_text() {
                            if let Some(text) = message.as_text() {
                                events.on_text(text.to_string());
                            }
                        }
                    }
                    Err(error) => {
                        events.on_error(error.to_string());
                        return;
                    }
                }
            }

            events.on_close();
        });

        *self.receiver.lock().unwrap() = Some(handle);
    }

    pub(crate) async fn send_text(&self, text: String) -> Result<(), String> {
        let mut sink = self.sink.lock().await;

        sink.send(Message::text(text)).await.map_err(|e| e.to_string())
    }

    /// Stops the receiver so no further delegate events fire. The socket
    /// itself is torn down when the client is dropped.
    pub(crate) fn close(&self) {
        if let Some(receiver) = self.receiver.lock().unwrap().take() {
            info!("stopping websocket receiver");
            receiver.abort();
        }
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        self.close();
    }
}
