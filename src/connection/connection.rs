use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::completer::DelayedOperation;
use crate::protocol::messages;
use crate::protocol::{NegotiationResponse, Version};
use crate::transports::{AutoTransport, ClientTransport};

use super::heartbeat::HeartbeatMonitor;
use super::keep_alive::KeepAliveData;
use super::state::ConnectionState;

const DEFAULT_ABORT_TIMEOUT: Duration = Duration::from_secs(30);

type EventHandler = Arc<dyn Fn() + Send + Sync>;
type ReceivedHandler = Arc<dyn Fn(&Value) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;
type StateChangedHandler = Arc<dyn Fn(ConnectionState) + Send + Sync>;

#[derive(Default)]
struct EventHandlers {
    started: Option<EventHandler>,
    received: Option<ReceivedHandler>,
    error: Option<ErrorHandler>,
    closed: Option<EventHandler>,
    reconnecting: Option<EventHandler>,
    reconnected: Option<EventHandler>,
    state_changed: Option<StateChangedHandler>,
    connection_slow: Option<EventHandler>,
}

/// Session identifiers issued by the server. Cleared together on disconnect.
#[derive(Default)]
struct SessionState {
    connection_id: Option<String>,
    connection_token: Option<String>,
    message_id: Option<String>,
    groups_token: Option<String>,
}

/// Hook surface for a layer that specializes the connection (the hub layer):
/// it provides the negotiate payload and intercepts frames and lifecycle
/// notifications before the plain callback surface sees them.
pub(crate) trait ConnectionDelegate: Send + Sync {
    /// Payload serialized into every request's `connectionData` parameter.
    fn sending_payload(&self) -> Option<String>;

    /// One parsed inbound frame. Implementations forward frames they do not
    /// consume back through [`Connection::forward_received`].
    fn handle_frame(&self, data: &Value);

    fn connection_will_reconnect(&self);

    fn connection_did_close(&self);
}

/// A logical connection to a SignalR server, independent of the transport
/// that carries it.
///
/// The connection negotiates a session, hands off to a transport, routes
/// inbound frames and exposes a callback surface for lifecycle events. It is
/// designed for concurrent access from the caller and from transport I/O
/// tasks; the state transition is the single synchronization point.
///
/// # Examples
///
/// ```ignore
/// let connection = Connection::new("http://localhost:8089/signalr");
/// connection.set_received(|data| info!("received {}", data));
/// connection.start().await?;
/// ```
pub struct Connection {
    me: Weak<Connection>,
    url: String,
    query_string: HashMap<String, String>,
    client_protocol: Version,
    state: Mutex<ConnectionState>,
    session: Mutex<SessionState>,
    headers: Mutex<HashMap<String, String>>,
    disconnect_timeout: Mutex<Duration>,
    transport_connect_timeout: Mutex<Duration>,
    keep_alive: Mutex<Option<KeepAliveData>>,
    connection_data: Mutex<String>,
    transport: Mutex<Option<Arc<dyn ClientTransport>>>,
    monitor: Mutex<Option<Arc<HeartbeatMonitor>>>,
    disconnect_timeout_operation: Mutex<Option<DelayedOperation>>,
    handlers: Mutex<EventHandlers>,
    delegate: Mutex<Option<Weak<dyn ConnectionDelegate>>>,
}

impl Connection {
    /// Creates a connection to the given url. The url is slash terminated if
    /// it is not already.
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Connection::with_query_string(url, HashMap::new())
    }

    /// Creates a connection with caller supplied query parameters that are
    /// forwarded on every request.
    pub fn with_query_string(url: impl Into<String>, query_string: HashMap<String, String>) -> Arc<Self> {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }

        Arc::new_cyclic(|me| Connection {
            me: me.clone(),
            url,
            query_string,
            client_protocol: Version::new(1, 3),
            state: Mutex::new(ConnectionState::Disconnected),
            session: Mutex::new(SessionState::default()),
            headers: Mutex::new(HashMap::new()),
            disconnect_timeout: Mutex::new(Duration::ZERO),
            transport_connect_timeout: Mutex::new(Duration::ZERO),
            keep_alive: Mutex::new(None),
            connection_data: Mutex::new(String::new()),
            transport: Mutex::new(None),
            monitor: Mutex::new(None),
            disconnect_timeout_operation: Mutex::new(None),
            handlers: Mutex::new(EventHandlers::default()),
            delegate: Mutex::new(None),
        })
    }

    /* --- Accessors --- */

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn connection_id(&self) -> Option<String> {
        self.session.lock().unwrap().connection_id.clone()
    }

    pub fn connection_token(&self) -> Option<String> {
        self.session.lock().unwrap().connection_token.clone()
    }

    pub fn message_id(&self) -> Option<String> {
        self.session.lock().unwrap().message_id.clone()
    }

    pub fn groups_token(&self) -> Option<String> {
        self.session.lock().unwrap().groups_token.clone()
    }

    pub fn query_string(&self) -> &HashMap<String, String> {
        &self.query_string
    }

    pub fn client_protocol(&self) -> Version {
        self.client_protocol
    }

    /// Adds an HTTP header carried on every request of the http based
    /// transports.
    pub fn add_header(&self, field: impl Into<String>, value: impl Into<String>) {
        self.headers.lock().unwrap().insert(field.into(), value.into());
    }

    pub fn headers(&self) -> HashMap<String, String> {
        self.headers.lock().unwrap().clone()
    }

    pub(crate) fn transport_connect_timeout(&self) -> Duration {
        *self.transport_connect_timeout.lock().unwrap()
    }

    pub(crate) fn keep_alive(&self) -> Option<KeepAliveData> {
        self.keep_alive.lock().unwrap().clone()
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn ClientTransport>> {
        self.transport.lock().unwrap().clone()
    }

    pub(crate) fn connection_data(&self) -> String {
        self.connection_data.lock().unwrap().clone()
    }

    pub(crate) fn set_delegate(&self, delegate: Weak<dyn ConnectionDelegate>) {
        *self.delegate.lock().unwrap() = Some(delegate);
    }

    fn delegate(&self) -> Option<Arc<dyn ConnectionDelegate>> {
        self.delegate.lock().unwrap().as_ref().and_then(Weak::upgrade)
    }

    fn arc(&self) -> Arc<Connection> {
        self.me.upgrade().expect("the connection handle is gone")
    }

    #[cfg(test)]
    pub(crate) fn install_transport(&self, transport: Arc<dyn ClientTransport>) {
        *self.transport.lock().unwrap() = Some(transport);
    }

    /* --- Callback surface --- */

    pub fn set_started(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.handlers.lock().unwrap().started = Some(Arc::new(handler));
    }

    pub fn set_received(&self, handler: impl Fn(&Value) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().received = Some(Arc::new(handler));
    }

    pub fn set_error(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().error = Some(Arc::new(handler));
    }

    pub fn set_closed(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.handlers.lock().unwrap().closed = Some(Arc::new(handler));
    }

    pub fn set_reconnecting(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.handlers.lock().unwrap().reconnecting = Some(Arc::new(handler));
    }

    pub fn set_reconnected(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.handlers.lock().unwrap().reconnected = Some(Arc::new(handler));
    }

    pub fn set_state_changed(&self, handler: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().state_changed = Some(Arc::new(handler));
    }

    pub fn set_connection_slow(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.handlers.lock().unwrap().connection_slow = Some(Arc::new(handler));
    }

    /* --- Connection management --- */

    /// Atomic compare-and-swap on the connection state. Every transition in
    /// the crate goes through here; the `state_changed` callback fires on
    /// success only.
    pub fn change_state(&self, old: ConnectionState, new: ConnectionState) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if *state != old {
                return false;
            }
            *state = new;
        }

        debug!("connection state did change from {} to {}", old, new);
        let handler = self.handlers.lock().unwrap().state_changed.clone();
        if let Some(handler) = handler {
            handler(new);
        }

        true
    }

    /// Starts the connection, picking the best transport supported by the
    /// server (websockets with long polling fallback).
    pub async fn start(&self) -> Result<(), String> {
        self.start_with(Arc::new(AutoTransport::new())).await
    }

    /// Starts the connection on the given transport: negotiates a session,
    /// then hands off to the transport. Fails without side effects unless the
    /// connection is disconnected.
    pub async fn start_with(&self, transport: Arc<dyn ClientTransport>) -> Result<(), String> {
        if !self.change_state(ConnectionState::Disconnected, ConnectionState::Connecting) {
            return Err("start may only be called when the connection is disconnected".to_string());
        }

        *self.monitor.lock().unwrap() = Some(HeartbeatMonitor::new(self.me.clone()));
        *self.transport.lock().unwrap() = Some(transport.clone());

        let connection_data = self
            .delegate()
            .and_then(|delegate| delegate.sending_payload())
            .unwrap_or_default();
        *self.connection_data.lock().unwrap() = connection_data.clone();

        debug!("will negotiate");
        let negotiation = match transport.negotiate(&self.arc(), &connection_data).await {
            Ok(negotiation) => negotiation,
            Err(error) => {
                error!("negotiation failed {}", error);
                self.did_receive_error(&error);
                self.close_after_failed_start();
                return Err(error);
            }
        };

        debug!("negotiation was successful {:?}", negotiation);
        self.verify_protocol_version(&negotiation.protocol_version);
        self.apply_negotiation(&negotiation);

        debug!("will start transport");
        match transport.start(&self.arc(), &connection_data).await {
            Ok(()) => {
                info!("start transport was successful, using {}", transport.name());
                _ = self.change_state(ConnectionState::Connecting, ConnectionState::Connected);

                if self.keep_alive.lock().unwrap().is_some() && transport.supports_keep_alive() {
                    debug!("connection starting keepalive monitor");
                    let monitor = self.monitor.lock().unwrap().clone();
                    if let Some(monitor) = monitor {
                        monitor.start();
                    }
                }

                let handler = self.handlers.lock().unwrap().started.clone();
                if let Some(handler) = handler {
                    handler();
                }

                Ok(())
            }
            Err(error) => {
                error!("start transport failed {}", error);
                self.did_receive_error(&error);
                self.close_after_failed_start();
                Err(error)
            }
        }
    }

    /// Stops the connection, giving the server the default window to
    /// acknowledge the abort.
    pub async fn stop(&self) {
        self.stop_with_timeout(Some(DEFAULT_ABORT_TIMEOUT)).await;
    }

    /// Stops the connection. `None` means do not contact the server; this is
    /// the path taken when a reconnect window expires. No-op when already
    /// disconnected.
    pub async fn stop_with_timeout(&self, timeout: Option<Duration>) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }

        debug!("connection will stop monitoring keepalive");
        let monitor = self.monitor.lock().unwrap().take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }

        let transport = self.transport.lock().unwrap().take();
        if let Some(transport) = transport {
            debug!("connection will abort transport");
            transport.abort(&self.arc(), timeout, &self.connection_data()).await;
        }

        self.disconnect();
    }

    /// Returns the connection to the disconnected state, clearing the session
    /// identifiers. No-op when already disconnected.
    pub fn disconnect(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnected;
        }

        let monitor = self.monitor.lock().unwrap().take();
        if let Some(monitor) = monitor {
            monitor.stop();
        }

        if let Some(operation) = self.disconnect_timeout_operation.lock().unwrap().take() {
            operation.cancel();
        }

        *self.session.lock().unwrap() = SessionState::default();

        self.did_close();
    }

    fn close_after_failed_start(&self) {
        self.disconnect();
        *self.transport.lock().unwrap() = None;
    }

    fn did_close(&self) {
        debug!("connection did close");
        if let Some(delegate) = self.delegate() {
            delegate.connection_did_close();
        }

        let handler = self.handlers.lock().unwrap().closed.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    fn verify_protocol_version(&self, version_string: &str) {
        match version_string.parse::<Version>() {
            Ok(version) if version == self.client_protocol => {}
            Ok(version) => warn!(
                "remote protocol version is {}, client speaks {}",
                version, self.client_protocol
            ),
            Err(error) => warn!("could not parse remote protocol version: {}", error),
        }
    }

    pub(crate) fn apply_negotiation(&self, negotiation: &NegotiationResponse) {
        {
            let mut session = self.session.lock().unwrap();
            session.connection_id = Some(negotiation.connection_id.clone());
            session.connection_token = Some(negotiation.connection_token.clone());
        }

        *self.disconnect_timeout.lock().unwrap() =
            Duration::from_secs_f64(negotiation.disconnect_timeout.max(0.0));

        {
            let mut timeout = self.transport_connect_timeout.lock().unwrap();
            *timeout += Duration::from_secs_f64(negotiation.transport_connect_timeout.max(0.0));
        }

        if let Some(keep_alive_timeout) = negotiation.keep_alive_timeout {
            if keep_alive_timeout > 0.0 {
                *self.keep_alive.lock().unwrap() =
                    Some(KeepAliveData::new(Duration::from_secs_f64(keep_alive_timeout)));
            }
        }
    }

    /* --- Sending data --- */

    /// Serializes the payload and sends it through the active transport.
    /// Fails synchronously, without transport I/O, when the connection is
    /// disconnected or still connecting.
    pub async fn send<T: Serialize>(&self, data: &T) -> Result<(), String> {
        match self.state() {
            ConnectionState::Disconnected => {
                let error = "start must be called before data can be sent".to_string();
                self.did_receive_error(&error);
                return Err(error);
            }
            ConnectionState::Connecting => {
                let error = "the connection has not been established".to_string();
                self.did_receive_error(&error);
                return Err(error);
            }
            _ => {}
        }

        let message = serde_json::to_string(data).map_err(|e| e.to_string())?;

        let Some(transport) = self.transport() else {
            return Err("no transport is attached to the connection".to_string());
        };

        debug!("connection transport will send {}", message);
        transport.send(&self.arc(), &message, &self.connection_data()).await
    }

    /* --- Received data --- */

    /// Shared frame processing used by every transport: inspects one text
    /// frame and returns the `(should_reconnect, disconnected)` flags for the
    /// transport to act on. A disconnect frame short-circuits; none of its
    /// other fields are processed.
    pub(crate) fn process_response(&self, response: &str) -> (bool, bool) {
        self.update_last_keep_alive();

        if response.is_empty() {
            return (false, false);
        }

        let Ok(result) = serde_json::from_str::<Value>(response) else {
            debug!("ignoring frame that is not valid json: {}", response);
            return (false, false);
        };
        let Some(map) = result.as_object() else {
            return (false, false);
        };

        // A callback id marks a hub call result; it bypasses the session
        // metadata entirely (its "D" key is error data, not a flag).
        if map.contains_key(messages::KEY_HUB_RESULT_MARKER) {
            self.did_receive_data(&result);
            return (false, false);
        }

        let should_reconnect = messages::flag(map.get(messages::KEY_SHOULD_RECONNECT));
        let disconnected = messages::flag(map.get(messages::KEY_DISCONNECTED));

        if disconnected {
            return (should_reconnect, true);
        }

        if let Some(token) = messages::text(map.get(messages::KEY_GROUPS_TOKEN)) {
            self.session.lock().unwrap().groups_token = Some(token);
        }

        if let Some(items) = map.get(messages::KEY_MESSAGES).and_then(Value::as_array) {
            if let Some(id) = messages::text(map.get(messages::KEY_MESSAGE_ID)) {
                self.session.lock().unwrap().message_id = Some(id);
            }

            for message in items {
                self.did_receive_data(message);
            }
        }

        (should_reconnect, false)
    }

    pub(crate) fn did_receive_data(&self, data: &Value) {
        debug!("connection did receive data {}", data);

        if let Some(delegate) = self.delegate() {
            delegate.handle_frame(data);
        } else {
            self.forward_received(data);
        }
    }

    /// Hands a frame to the `received` callback, bypassing the delegate.
    pub(crate) fn forward_received(&self, data: &Value) {
        let handler = self.handlers.lock().unwrap().received.clone();
        if let Some(handler) = handler {
            handler(data);
        }
    }

    pub(crate) fn did_receive_error(&self, error: &str) {
        error!("connection did receive error {}", error);
        let handler = self.handlers.lock().unwrap().error.clone();
        if let Some(handler) = handler {
            handler(error);
        }
    }

    /* --- Reconnecting --- */

    /// Brackets the beginning of a reconnect attempt: arms the countdown that
    /// gives up when no reconnect succeeds within the server's disconnect
    /// timeout, and fires the `reconnecting` callback. The give-up path stops
    /// without contacting the server.
    pub(crate) fn will_reconnect(&self) {
        debug!("connection will reconnect");

        if let Some(delegate) = self.delegate() {
            delegate.connection_will_reconnect();
        }

        let disconnect_timeout = *self.disconnect_timeout.lock().unwrap();
        let weak = self.me.clone();
        let operation = DelayedOperation::schedule(disconnect_timeout, async move {
            if let Some(connection) = weak.upgrade() {
                warn!("connection failed to reconnect");
                connection.stop_with_timeout(None).await;
            }
        });

        debug!(
            "connection will disconnect if reconnect is not performed in {:?}",
            disconnect_timeout
        );
        *self.disconnect_timeout_operation.lock().unwrap() = Some(operation);

        let handler = self.handlers.lock().unwrap().reconnecting.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    /// Cancels the give-up countdown and fires the `reconnected` callback.
    pub(crate) fn did_reconnect(&self) {
        debug!("connection did reconnect");

        if let Some(operation) = self.disconnect_timeout_operation.lock().unwrap().take() {
            operation.cancel();
        }

        let handler = self.handlers.lock().unwrap().reconnected.clone();
        if let Some(handler) = handler {
            handler();
        }

        self.update_last_keep_alive();
    }

    /// The single gate both transports use before entering a reconnect
    /// attempt; `will_reconnect` fires only for the transition winner, which
    /// prevents double entry from concurrent failure paths.
    pub(crate) fn ensure_reconnecting(&self) -> bool {
        if self.change_state(ConnectionState::Connected, ConnectionState::Reconnecting) {
            self.will_reconnect();
        }

        self.state() == ConnectionState::Reconnecting
    }

    pub(crate) fn connection_did_slow(&self) {
        debug!("connection did slow");
        let handler = self.handlers.lock().unwrap().connection_slow.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    pub(crate) fn update_last_keep_alive(&self) {
        if let Some(keep_alive) = self.keep_alive.lock().unwrap().as_mut() {
            keep_alive.touch();
        }
    }
}
