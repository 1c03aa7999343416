use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::completer::ManualFuture;
use crate::protocol::{HubInvocation, HubResult};

use super::hub_connection::HubConnectionInner;

type Subscription = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Client side facade of one server hub: event subscriptions, outbound
/// method invocation, and the client state blob that round trips with every
/// call.
///
/// Obtained from [`HubConnection::create_hub_proxy`] before the connection
/// is started; one proxy exists per lowercase hub name.
///
/// [`HubConnection::create_hub_proxy`]: super::HubConnection::create_hub_proxy
pub struct HubProxy {
    hub: Weak<HubConnectionInner>,
    hub_name: String,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    ignored_events: Mutex<HashSet<String>>,
    state: Arc<Mutex<HashMap<String, Value>>>,
}

impl std::fmt::Debug for HubProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubProxy")
            .field("hub_name", &self.hub_name)
            .finish_non_exhaustive()
    }
}

impl HubProxy {
    pub(crate) fn new(hub: Weak<HubConnectionInner>, hub_name: String) -> Self {
        HubProxy {
            hub,
            hub_name,
            subscriptions: Mutex::new(HashMap::new()),
            ignored_events: Mutex::new(HashSet::new()),
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.hub_name
    }

    /// Subscribes a handler to a server raised event. A second subscription
    /// for the same event replaces the first.
    pub fn on(&self, event_name: &str, handler: impl Fn(&[Value]) + Send + Sync + 'static) {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if subscriptions.insert(event_name.to_string(), Arc::new(handler)).is_some() {
            warn!("proxy already had a subscription for {}, overwriting", event_name);
        }
    }

    /// Suppresses the warning logged when the named event arrives without a
    /// subscriber. A subscribed event is still dispatched.
    pub fn ignore_event(&self, event_name: &str) {
        self.ignored_events.lock().unwrap().insert(event_name.to_string());
    }

    /// Removes an event from the ignore list; reports whether it was listed.
    pub fn unignore_event(&self, event_name: &str) -> bool {
        self.ignored_events.lock().unwrap().remove(event_name)
    }

    /// Snapshot of the client state map.
    pub fn state(&self) -> HashMap<String, Value> {
        self.state.lock().unwrap().clone()
    }

    /// Stores a value in the client state map, transmitted to the server
    /// with every call.
    pub fn set_state_value(&self, key: impl Into<String>, value: Value) {
        self.state.lock().unwrap().insert(key.into(), value);
    }

    /// Incoming keys overwrite, nothing is deleted.
    pub(crate) fn merge_state(&self, incoming: &HashMap<String, Value>) {
        let mut state = self.state.lock().unwrap();
        for (key, value) in incoming {
            state.insert(key.clone(), value.clone());
        }
    }

    /// Dispatches a server raised event to its subscriber.
    pub(crate) fn invoke_event(&self, event_name: &str, args: &[Value]) {
        let subscription = self.subscriptions.lock().unwrap().get(event_name).cloned();

        if let Some(handler) = subscription {
            handler(args);
        } else if !self.ignored_events.lock().unwrap().contains(event_name) {
            warn!("no subscription registered for event {}", event_name);
        }
    }

    /// Invokes a hub method and waits for its result.
    ///
    /// The call registers a one-shot completion under a fresh callback id,
    /// sends the invocation envelope with the current client state snapshot,
    /// and resolves when the matching result frame arrives. Server state
    /// returned with the result is merged into the client state; a server
    /// error resolves the call with that error and also surfaces it through
    /// the connection's error callback.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>, String> {
        let Some(hub) = self.hub.upgrade() else {
            return Err("the hub connection has been dropped".to_string());
        };

        let (future, completer) = ManualFuture::new();

        let state = self.state.clone();
        let connection = hub.connection.clone();
        let callback_id = hub.register_callback(method, move |result: HubResult| {
            if let Some(error) = result.error {
                connection.did_receive_error(&error);
                completer.complete(Err(error));
            } else {
                if let Some(incoming) = &result.state {
                    let mut state = state.lock().unwrap();
                    for (key, value) in incoming {
                        state.insert(key.clone(), value.clone());
                    }
                }

                // The result payload may legitimately be empty.
                completer.complete(Ok(result.result));
            }
        });

        let state = self.state.lock().unwrap().clone();
        let invocation = HubInvocation {
            callback_id: Some(callback_id.clone()),
            hub: self.hub_name.clone(),
            method: method.to_string(),
            args,
            state: if state.is_empty() { None } else { Some(state) },
        };

        if let Err(error) = hub.connection.send(&invocation).await {
            hub.remove_callback(&callback_id);
            return Err(error);
        }

        future.await
    }

    /// Invokes a hub method and deserializes the result payload.
    pub async fn invoke_as<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<T, String> {
        match self.invoke(method, args).await? {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| format!("the invocation result failed to deserialize: {}", e)),
            None => Err("the invocation completed without a result".to_string()),
        }
    }
}
