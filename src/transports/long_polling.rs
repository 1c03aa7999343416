use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::communication::HttpClient;
use crate::completer::{DelayedOperation, ManualFuture, ManualFutureCompleter};
use crate::connection::{Connection, ConnectionState};
use crate::protocol::NegotiationResponse;

use super::http_based::{receive_parameters, request_url, HttpTransportCore};
use super::interface::ClientTransport;

/// The time to wait after the connection drops before confirming a
/// reconnect, when no data arrives first.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// The time to wait after a poll error before polling again.
const ERROR_DELAY: Duration = Duration::from_secs(2);

/// Long polling does not hold a persistent connection: each cycle issues one
/// GET that the server holds until data is ready, and the next poll is issued
/// as soon as the previous response has been processed.
pub struct LongPollingTransport {
    core: Arc<HttpTransportCore>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl LongPollingTransport {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        LongPollingTransport {
            core: Arc::new(HttpTransportCore::new("longPolling", false, http)),
            poll_task: Mutex::new(None),
        }
    }

    /// The sequential poll loop: one outstanding request at a time, the next
    /// one scheduled only after the previous response was fully processed.
    ///
    /// The start continuation resolves on the first cycle's outcome so the
    /// fallback composition can move on when long polling cannot be brought
    /// up; later errors enter the reconnect/retry path instead.
    async fn poll_loop(
        core: Arc<HttpTransportCore>,
        connection: Arc<Connection>,
        connection_data: String,
        start_completer: ManualFutureCompleter<Result<(), String>>,
    ) {
        let mut start_completer = Some(start_completer);

        loop {
            let endpoint = if connection.message_id().is_none() {
                "connect"
            } else if connection.state() == ConnectionState::Reconnecting {
                "reconnect"
            } else {
                "poll"
            };

            // While reconnecting, confirm the reconnect after a fixed delay
            // even if the held request does not produce data first.
            let mut reconnect_confirmation = None;
            if connection.state() == ConnectionState::Reconnecting {
                warn!("will reconnect in {:?}", RECONNECT_DELAY);
                let pending = connection.clone();
                reconnect_confirmation = Some(DelayedOperation::schedule(RECONNECT_DELAY, async move {
                    if pending.change_state(ConnectionState::Reconnecting, ConnectionState::Connected) {
                        pending.did_reconnect();
                    }
                }));
            }

            let url = request_url(
                &connection,
                endpoint,
                &receive_parameters(&connection, &connection_data, core.name()),
            );

            debug!("longPolling will connect at url: {}", url);
            let outcome = core.http.get(&url, &connection.headers()).await;
            drop(reconnect_confirmation);

            match outcome {
                Err(error) => {
                    if core.try_complete_abort() {
                        warn!("longPolling has shutdown due to abort");
                        if let Some(completer) = start_completer.take() {
                            completer.complete(Err("the transport was aborted".to_string()));
                        }
                        return;
                    }

                    if let Some(completer) = start_completer.take() {
                        completer.complete(Err(error.to_string()));
                        return;
                    }

                    debug!("longPolling did fail with error {}", error);
                    connection.ensure_reconnecting();
                    connection.did_receive_error(&error.to_string());

                    debug!("will poll again in {:?}", ERROR_DELAY);
                    tokio::time::sleep(ERROR_DELAY).await;
                }
                Ok(response) => {
                    debug!("longPolling did receive: {}", response);

                    let (should_reconnect, disconnected) = connection.process_response(&response);

                    if let Some(completer) = start_completer.take() {
                        completer.complete(Ok(()));
                    }

                    // Data arrived before the delayed confirmation fired.
                    if connection.state() == ConnectionState::Reconnecting
                        && connection.change_state(ConnectionState::Reconnecting, ConnectionState::Connected)
                    {
                        connection.did_reconnect();
                    }

                    if should_reconnect {
                        debug!("longPolling did receive shouldReconnect command from server");
                        connection.ensure_reconnecting();
                    }

                    if disconnected {
                        debug!("longPolling did receive disconnect command from server");
                        connection.disconnect();
                        return;
                    }

                    if core.try_complete_abort() {
                        warn!("longPolling has shutdown due to abort");
                        return;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ClientTransport for LongPollingTransport {
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
        debug!("longPolling will negotiate");
        self.core.negotiate(connection, connection_data).await
    }

    async fn start(&self, connection: &Arc<Connection>, connection_data: &str) -> Result<(), String> {
        debug!("longPolling will connect with connectionData {}", connection_data);

        let (future, completer) = ManualFuture::new();
        let handle = tokio::spawn(LongPollingTransport::poll_loop(
            self.core.clone(),
            connection.clone(),
            connection_data.to_string(),
            completer,
        ));
        *self.poll_task.lock().unwrap() = Some(handle);

        future.await
    }

    async fn send(
        &self,
        connection: &Arc<Connection>,
        data: &str,
        connection_data: &str,
    ) -> Result<(), String> {
        debug!("longPolling will send data {}", data);
        self.core.send(connection, data, connection_data).await
    }

    async fn abort(&self, connection: &Arc<Connection>, timeout: Option<Duration>, connection_data: &str) {
        debug!("longPolling will abort");
        self.core.abort(connection, timeout, connection_data).await;

        // Cut the held request; the flag above keeps a completed loop from
        // re-polling.
        if let Some(task) = self.poll_task.lock().unwrap().take() {
            task.abort();
        }
    }

    fn lost_connection(&self, _connection: &Arc<Connection>) {
        debug!("longPolling lost connection");
    }
}
