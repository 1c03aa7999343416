use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::communication::{EhttpClient, HttpClient};
use crate::connection::Connection;
use crate::protocol::NegotiationResponse;

use super::interface::ClientTransport;
use super::long_polling::LongPollingTransport;
use super::web_socket::WebSocketTransport;

/// Picks the best transport the server supports.
///
/// Candidates are tried strictly in order (websockets, then long polling);
/// the first one that starts becomes the exclusively active transport, and
/// everything after start is delegated to it alone.
pub struct AutoTransport {
    transports: Mutex<Vec<Arc<dyn ClientTransport>>>,
    transport: Mutex<Option<Arc<dyn ClientTransport>>>,
}

impl AutoTransport {
    pub fn new() -> Self {
        let http: Arc<dyn HttpClient> = Arc::new(EhttpClient);

        AutoTransport::with_transports(vec![
            Arc::new(WebSocketTransport::new(http.clone())),
            Arc::new(LongPollingTransport::new(http)),
        ])
    }

    /// Candidate list in fallback order.
    pub fn with_transports(transports: Vec<Arc<dyn ClientTransport>>) -> Self {
        AutoTransport {
            transports: Mutex::new(transports),
            transport: Mutex::new(None),
        }
    }

    fn active(&self) -> Option<Arc<dyn ClientTransport>> {
        self.transport.lock().unwrap().clone()
    }

    fn remove_candidate(&self, name: &str) {
        let mut transports = self.transports.lock().unwrap();
        if let Some(index) = transports.iter().position(|t| t.name() == name) {
            transports.remove(index);
        }
    }
}

impl Default for AutoTransport {
    fn default() -> Self {
        AutoTransport::new()
    }
}

#[async_trait]
impl ClientTransport for AutoTransport {
    fn name(&self) -> &'static str {
        match self.active() {
            Some(transport) => transport.name(),
            None => "auto",
        }
    }

    fn supports_keep_alive(&self) -> bool {
        self.active().map(|t| t.supports_keep_alive()).unwrap_or(false)
    }

    async fn negotiate(
        &self,
        connection: &Arc<Connection>,
        connection_data: &str,
    ) -> Result<NegotiationResponse, String> {
        debug!("autoTransport will negotiate");

        let first = self
            .transports
            .lock()
            .unwrap()
            .first()
            .cloned()
            .ok_or_else(|| "no transports are available".to_string())?;

        let negotiation = first.negotiate(connection, connection_data).await?;

        if !negotiation.try_web_sockets {
            warn!("server does not support websockets");
            self.remove_candidate("webSockets");
        }

        Ok(negotiation)
    }

    async fn start(&self, connection: &Arc<Connection>, connection_data: &str) -> Result<(), String> {
        debug!("autoTransport will connect with connectionData {}", connection_data);

        let candidates: Vec<Arc<dyn ClientTransport>> = self.transports.lock().unwrap().clone();

        for candidate in candidates {
            debug!("autoTransport will attempt to start {}", candidate.name());

            match candidate.start(connection, connection_data).await {
                Ok(()) => {
                    *self.transport.lock().unwrap() = Some(candidate.clone());
                    info!("did set active transport to {}", candidate.name());
                    return Ok(());
                }
                Err(error) => {
                    warn!("error on start, will switch to next transport. error was: {}", error);
                }
            }
        }

        Err("no transport could be initialized successfully, try specifying a different transport or none at all for auto initialization".to_string())
    }

    async fn send(
        &self,
        connection: &Arc<Connection>,
        data: &str,
        connection_data: &str,
    ) -> Result<(), String> {
        match self.active() {
            Some(transport) => transport.send(connection, data, connection_data).await,
            None => Err("cannot send data, no transport has been selected".to_string()),
        }
    }

    async fn abort(&self, connection: &Arc<Connection>, timeout: Option<Duration>, connection_data: &str) {
        debug!("autoTransport will abort");
        if let Some(transport) = self.active() {
            transport.abort(connection, timeout, connection_data).await;
        }
    }

    fn lost_connection(&self, connection: &Arc<Connection>) {
        warn!("autoTransport lost connection");
        if let Some(transport) = self.active() {
            transport.lost_connection(connection);
        }
    }
}
