use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};

use crate::communication::{HttpClient, WebSocketClient, WebSocketEvents};
use crate::completer::{DelayedOperation, ManualFuture, ManualFutureCompleter};
use crate::connection::{Connection, ConnectionState};
use crate::protocol::NegotiationResponse;

use super::http_based::{receive_parameters, request_url, HttpTransportCore};
use super::interface::ClientTransport;

/// The time to wait before reconnecting after the socket drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Fallback when the server did not supply a transport connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct ConnectionInfo {
    connection: Arc<Connection>,
    data: String,
}

struct SocketState {
    socket: Mutex<Option<Arc<WebSocketClient>>>,
    connection_info: Mutex<Option<ConnectionInfo>>,
    start_completer: Mutex<Option<ManualFutureCompleter<Result<(), String>>>>,
    connect_timeout: Mutex<Option<DelayedOperation>>,
}

impl SocketState {
    fn connection_info(&self) -> Option<ConnectionInfo> {
        self.connection_info.lock().unwrap().clone()
    }
}

/// Transport over one WebSocket. The start completion is armed with a
/// cancellable timeout and resolved by the first inbound frame; socket
/// failures after start schedule delayed reconnects through the shared
/// `ensure_reconnecting` gate.
pub struct WebSocketTransport {
    core: Arc<HttpTransportCore>,
    state: Arc<SocketState>,
}

impl WebSocketTransport {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        WebSocketTransport {
            core: Arc::new(HttpTransportCore::new("webSockets", true, http)),
            state: Arc::new(SocketState {
                socket: Mutex::new(None),
                connection_info: Mutex::new(None),
                start_completer: Mutex::new(None),
                connect_timeout: Mutex::new(None),
            }),
        }
    }
}

fn websocket_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}

fn stop_socket(state: &SocketState) {
    if let Some(socket) = state.socket.lock().unwrap().take() {
        socket.close();
    }
}

async fn perform_connect(core: Arc<HttpTransportCore>, state: Arc<SocketState>, reconnecting: bool) {
    let Some(info) = state.connection_info() else {
        return;
    };
    let connection = info.connection.clone();

    let endpoint = if reconnecting { "reconnect" } else { "connect" };
    let url = request_url(
        &connection,
        endpoint,
        &receive_parameters(&connection, &info.data, core.name()),
    );
    let url = websocket_scheme(&url);

    debug!("WebSocket will connect to url: {}", url);

    let starting = state.start_completer.lock().unwrap().is_some();

    // While the initial start is pending, arm a timeout that fails it if no
    // frame confirms the transport in time. Cancelled by the first frame.
    if starting {
        let mut timeout = connection.transport_connect_timeout();
        if timeout.is_zero() {
            timeout = DEFAULT_CONNECT_TIMEOUT;
        }

        let pending = state.clone();
        let operation = DelayedOperation::schedule(timeout, async move {
            let completer = pending.start_completer.lock().unwrap().take();
            if let Some(completer) = completer {
                error!("WebSocket failed to receive initialized message before timeout");
                stop_socket(&pending);
                completer.complete(Err(
                    "connection did not receive initialized message before the timeout".to_string(),
                ));
            }
        });
        *state.connect_timeout.lock().unwrap() = Some(operation);
    }

    let events = Arc::new(SocketEvents {
        core: core.clone(),
        state: state.clone(),
    });

    match WebSocketClient::connect(&url, events).await {
        Ok(socket) => {
            // The connect timeout may have failed the start while the socket
            // was still being opened; a socket that arrives late is discarded.
            if starting && state.start_completer.lock().unwrap().is_none() {
                socket.close();
                return;
            }

            *state.socket.lock().unwrap() = Some(socket);
        }
        Err(error) => socket_failed(&core, &state, error),
    }
}

fn socket_failed(core: &Arc<HttpTransportCore>, state: &Arc<SocketState>, error: String) {
    let completer = state.start_completer.lock().unwrap().take();
    if let Some(completer) = completer {
        error!("WebSocket did fail while connecting");
        if let Some(operation) = state.connect_timeout.lock().unwrap().take() {
            operation.cancel();
        }

        stop_socket(state);
        completer.complete(Err(error));
        return;
    }

    if core.try_complete_abort() {
        return;
    }

    warn!("transport will reconnect from error: {}", error);
    schedule_reconnect(core, state);
}

fn schedule_reconnect(core: &Arc<HttpTransportCore>, state: &Arc<SocketState>) {
    debug!("WebSocket will reconnect in {:?}", RECONNECT_DELAY);

    let core = core.clone();
    let state = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(RECONNECT_DELAY).await;

        let Some(info) = state.connection_info() else {
            return;
        };

        if info.connection.ensure_reconnecting() {
            warn!("WebSocket reconnecting...");
            perform_connect(core, state, true).await;
        }
    });
}

struct SocketEvents {
    core: Arc<HttpTransportCore>,
    state: Arc<SocketState>,
}

impl WebSocketEvents for SocketEvents {
    fn on_open(&self) {
        debug!("WebSocket did open");

        let Some(info) = self.state.connection_info() else {
            return;
        };

        // No-op unless the socket was reopened during a reconnect.
        if info
            .connection
            .change_state(ConnectionState::Reconnecting, ConnectionState::Connected)
        {
            info.connection.did_reconnect();
        }
    }

    fn on_text(&self, message: String) {
        debug!("WebSocket did receive: {}", message);

        let Some(info) = self.state.connection_info() else {
            return;
        };

        let (_, disconnected) = info.connection.process_response(&message);

        let completer = self.state.start_completer.lock().unwrap().take();
        if let Some(completer) = completer {
            if let Some(operation) = self.state.connect_timeout.lock().unwrap().take() {
                operation.cancel();
            }

            completer.complete(Ok(()));
        }

        if disconnected {
            warn!("WebSocket did receive disconnect command from server, will close");
            info.connection.disconnect();
            stop_socket(&self.state);
        }
    }

    fn on_error(&self, error: String) {
        socket_failed(&self.core, &self.state, error);
    }

    fn on_close(&self) {
        warn!("WebSocket did close");

        if self.core.try_complete_abort() {
            return;
        }

        socket_failed(&self.core, &self.state, "the WebSocket was closed".to_string());
    }
}

#[async_trait]
impl ClientTransport for WebSocketTransport {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn supports_keep_alive(&self) -> bool {
        self.core.supports_keep_alive()
    }

    async fn negotiate(
        &self,
        connection: &Arc<Connection>,
        connection_data: &str,
    ) -> Result<NegotiationResponse, String> {
        debug!("WebSocket will negotiate");
        self.core.negotiate(connection, connection_data).await
    }

    async fn start(&self, connection: &Arc<Connection>, connection_data: &str) -> Result<(), String> {
        debug!("WebSocket will connect with connectionData {}", connection_data);

        *self.state.connection_info.lock().unwrap() = Some(ConnectionInfo {
            connection: connection.clone(),
            data: connection_data.to_string(),
        });

        let (future, completer) = ManualFuture::new();
        *self.state.start_completer.lock().unwrap() = Some(completer);

        perform_connect(self.core.clone(), self.state.clone(), false).await;

        future.await
    }

    async fn send(
        &self,
        _connection: &Arc<Connection>,
        data: &str,
        _connection_data: &str,
    ) -> Result<(), String> {
        debug!("will send data on WebSocket {}", data);

        let socket = self.state.socket.lock().unwrap().clone();
        match socket {
            Some(socket) => socket.send_text(data.to_string()).await,
            None => Err("data could not be sent because the WebSocket is not connected".to_string()),
        }
    }

    async fn abort(&self, connection: &Arc<Connection>, timeout: Option<Duration>, connection_data: &str) {
        warn!("abort, will close WebSocket");
        stop_socket(&self.state);
        self.core.abort(connection, timeout, connection_data).await;
    }

    fn lost_connection(&self, _connection: &Arc<Connection>) {
        warn!("lost connection, closing WebSocket");
        stop_socket(&self.state);

        if self.core.try_complete_abort() {
            return;
        }

        schedule_reconnect(&self.core, &self.state);
    }
}
