use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use serde_json::Value;

use crate::connection::{Connection, ConnectionDelegate, ConnectionState};
use crate::protocol::messages::KEY_HUB_RESULT_MARKER;
use crate::protocol::{HubInvocation, HubRegistrationData, HubResult};

use super::hub_proxy::HubProxy;
use super::statistics::{NoopStatistics, UsageStatistics};

/// Pending calls older than this are reported by the diagnostic sweep.
const HANGING_CALL_THRESHOLD: Duration = Duration::from_secs(30);

struct PendingCall {
    target: String,
    registered_at: Instant,
    complete: Box<dyn FnOnce(HubResult) + Send>,
}

/// A connection specialized for hubs: it registers the hub proxies in the
/// negotiation payload and demultiplexes inbound frames into either call
/// result delivery or server-to-client event dispatch.
///
/// # Examples
///
/// ```ignore
/// let hub_connection = HubConnection::new("http://localhost:8089");
/// let chat = hub_connection.create_hub_proxy("chat")?;
/// chat.on("broadcast", |args| info!("broadcast {:?}", args));
/// hub_connection.start().await?;
/// let result = chat.invoke("Send", vec![json!("hello")]).await?;
/// ```
pub struct HubConnection {
    inner: Arc<HubConnectionInner>,
}

pub(crate) struct HubConnectionInner {
    pub(crate) connection: Arc<Connection>,
    hubs: Mutex<HashMap<String, Arc<HubProxy>>>,
    callbacks: Mutex<HashMap<String, PendingCall>>,
    next_callback_id: AtomicU64,
    statistics: Mutex<Arc<dyn UsageStatistics>>,
}

impl HubConnection {
    /// Creates a hub connection to the given server url, with `signalr`
    /// appended as the connection endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        HubConnection::with_options(url, HashMap::new(), true)
    }

    pub fn with_query_string(url: impl Into<String>, query_string: HashMap<String, String>) -> Self {
        HubConnection::with_options(url, query_string, true)
    }

    /// `use_default_url: false` keeps the url as given instead of appending
    /// the `signalr` endpoint.
    pub fn with_options(
        url: impl Into<String>,
        query_string: HashMap<String, String>,
        use_default_url: bool,
    ) -> Self {
        let mut url = url.into();
        if use_default_url {
            if !url.ends_with('/') {
                url.push('/');
            }
            url.push_str("signalr");
        }

        let connection = Connection::with_query_string(url, query_string);

        let inner = Arc::new(HubConnectionInner {
            connection: connection.clone(),
            hubs: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(HashMap::new()),
            next_callback_id: AtomicU64::new(1),
            statistics: Mutex::new(Arc::new(NoopStatistics)),
        });

        let delegate: Arc<dyn ConnectionDelegate> = inner.clone();
        connection.set_delegate(Arc::downgrade(&delegate));

        HubConnection { inner }
    }

    /// Creates (or returns the existing) client side proxy for the named
    /// hub. Proxies cannot be added after the connection has been started.
    pub fn create_hub_proxy(&self, hub_name: &str) -> Result<Arc<HubProxy>, String> {
        if self.inner.connection.state() != ConnectionState::Disconnected {
            return Err("proxies cannot be added after the connection has been started".to_string());
        }

        debug!("will create proxy {}", hub_name);

        let name = hub_name.to_lowercase();
        let mut hubs = self.inner.hubs.lock().unwrap();
        if let Some(proxy) = hubs.get(&name) {
            return Ok(proxy.clone());
        }

        let proxy = Arc::new(HubProxy::new(Arc::downgrade(&self.inner), name.clone()));
        hubs.insert(name, proxy.clone());

        Ok(proxy)
    }

    /// The underlying connection, for the callback surface, headers and
    /// state inspection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.connection
    }

    /// Replaces the usage statistics collector.
    pub fn set_statistics(&self, statistics: Arc<dyn UsageStatistics>) {
        *self.inner.statistics.lock().unwrap() = statistics;
    }

    pub async fn start(&self) -> Result<(), String> {
        self.inner.connection.start().await
    }

    pub async fn start_with(
        &self,
        transport: Arc<dyn crate::transports::ClientTransport>,
    ) -> Result<(), String> {
        self.inner.connection.start_with(transport).await
    }

    pub async fn stop(&self) {
        self.inner.connection.stop().await;
    }

    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    #[cfg(test)]
    pub(crate) fn pending_call_count(&self) -> usize {
        self.inner.pending_call_count()
    }
}

impl HubConnectionInner {
    /// Registers a one-shot completion for an outbound call and returns its
    /// correlation id.
    pub(crate) fn register_callback(
        &self,
        target: &str,
        complete: impl FnOnce(HubResult) + Send + 'static,
    ) -> String {
        let id = self.next_callback_id.fetch_add(1, Ordering::SeqCst);
        let key = id.to_string();

        self.callbacks.lock().unwrap().insert(
            key.clone(),
            PendingCall {
                target: target.to_string(),
                registered_at: Instant::now(),
                complete: Box::new(complete),
            },
        );

        let statistics = self.statistics.lock().unwrap().clone();
        statistics.invocation_started(target);

        // Periodic diagnostic sweep for calls that never completed.
        if id % 10 == 0 {
            self.warn_about_hanging_calls();
        }

        key
    }

    pub(crate) fn remove_callback(&self, key: &str) -> bool {
        self.callbacks.lock().unwrap().remove(key).is_some()
    }

    #[cfg(test)]
    pub(crate) fn pending_call_count(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    fn warn_about_hanging_calls(&self) {
        let callbacks = self.callbacks.lock().unwrap();
        for (key, call) in callbacks.iter() {
            let elapsed = call.registered_at.elapsed();
            if elapsed > HANGING_CALL_THRESHOLD {
                warn!("hanging call {} for {}, pending for {:?}", key, call.target, elapsed);
            }
        }
    }

    /// Delivers a call result to its pending call. Each entry fires at most
    /// once; a result for an unknown (already delivered) id is a no-op.
    fn invoke_callback(&self, result: HubResult) {
        let Some(key) = result.id.clone() else {
            return;
        };

        let call = self.callbacks.lock().unwrap().remove(&key);
        if let Some(call) = call {
            let statistics = self.statistics.lock().unwrap().clone();
            statistics.invocation_completed(&call.target);

            (call.complete)(result);
        }
    }

    /// Resolves every pending call with a synthetic error result and empties
    /// the registry; in-flight calls do not survive a reconnect or a close.
    fn clear_pending_calls(&self, message: &str) {
        let drained: Vec<PendingCall> = {
            let mut callbacks = self.callbacks.lock().unwrap();
            callbacks.drain().map(|(_, call)| call).collect()
        };

        for call in drained {
            (call.complete)(HubResult::from_error(message));
        }
    }
}

impl ConnectionDelegate for HubConnectionInner {
    fn sending_payload(&self) -> Option<String> {
        let registrations: Vec<HubRegistrationData> = self
            .hubs
            .lock()
            .unwrap()
            .keys()
            .map(|name| HubRegistrationData { name: name.clone() })
            .collect();

        serde_json::to_string(&registrations).ok()
    }

    fn handle_frame(&self, data: &Value) {
        let Some(map) = data.as_object() else {
            return;
        };

        if map.contains_key(KEY_HUB_RESULT_MARKER) {
            match serde_json::from_value::<HubResult>(data.clone()) {
                Ok(result) => self.invoke_callback(result),
                Err(e) => error!("cannot parse hub result: {}", e),
            }
            return;
        }

        match serde_json::from_value::<HubInvocation>(data.clone()) {
            Ok(invocation) => {
                let proxy = self.hubs.lock().unwrap().get(&invocation.hub.to_lowercase()).cloned();
                if let Some(proxy) = proxy {
                    if let Some(state) = &invocation.state {
                        if !state.is_empty() {
                            proxy.merge_state(state);
                        }
                    }

                    proxy.invoke_event(&invocation.method, &invocation.args);
                }

                self.connection.forward_received(data);
            }
            Err(e) => {
                debug!("frame is not a hub invocation ({}), forwarding", e);
                self.connection.forward_received(data);
            }
        }
    }

    fn connection_will_reconnect(&self) {
        self.clear_pending_calls("Connection started reconnecting before invocation result was received.");
    }

    fn connection_did_close(&self) {
        self.clear_pending_calls("Connection was disconnected before invocation result was received.");
    }
}
