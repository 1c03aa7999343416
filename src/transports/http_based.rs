use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use url::form_urlencoded;

use crate::communication::HttpClient;
use crate::connection::Connection;
use crate::protocol::NegotiationResponse;

/// Shared behavior of the http based transports: the negotiate round trip,
/// the send POST, and the one-shot abort, all over the injectable
/// [`HttpClient`] collaborator.
pub(crate) struct HttpTransportCore {
    name: &'static str,
    supports_keep_alive: bool,
    started_abort: AtomicBool,
    pub(crate) http: Arc<dyn HttpClient>,
}

impl HttpTransportCore {
    pub(crate) fn new(name: &'static str, supports_keep_alive: bool, http: Arc<dyn HttpClient>) -> Self {
        HttpTransportCore {
            name,
            supports_keep_alive,
            started_abort: AtomicBool::new(false),
            http,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn supports_keep_alive(&self) -> bool {
        self.supports_keep_alive
    }

    pub(crate) async fn negotiate(
        &self,
        connection: &Arc<Connection>,
        connection_data: &str,
    ) -> Result<NegotiationResponse, String> {
        let url = request_url(
            connection,
            "negotiate",
            &negotiate_parameters(connection, connection_data, self.name),
        );

        debug!("will negotiate at url: {}", url);
        let body = self
            .http
            .get(&url, &connection.headers())
            .await
            .map_err(|e| format!("negotiate failed: {}", e))?;

        serde_json::from_str::<NegotiationResponse>(&body)
            .map_err(|e| format!("the negotiation response failed to deserialize: {}, {}", e, body))
    }

    /// Sends a payload as a form encoded POST to the signed `send` url. A non
    /// empty response body is a frame and is routed back into the connection.
    pub(crate) async fn send(
        &self,
        connection: &Arc<Connection>,
        data: &str,
        connection_data: &str,
    ) -> Result<(), String> {
        let url = request_url(
            connection,
            "send",
            &receive_parameters(connection, connection_data, self.name),
        );

        let body: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("data", data)
            .finish();

        match self.http.post(&url, &connection.headers(), Some(body)).await {
            Ok(response) => {
                debug!("send was successful {}", response);
                if !response.trim().is_empty() {
                    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&response) {
                        connection.did_receive_data(&value);
                    }
                }

                Ok(())
            }
            Err(error) => {
                let error = format!("send failed: {}", error);
                connection.did_receive_error(&error);
                Err(error)
            }
        }
    }

    /// Aborts the transport. The one-shot flag makes repeated aborts no-ops;
    /// `None` skips the server notification entirely.
    pub(crate) async fn abort(
        &self,
        connection: &Arc<Connection>,
        timeout: Option<Duration>,
        connection_data: &str,
    ) {
        if self.started_abort.swap(true, Ordering::SeqCst) {
            return;
        }

        let Some(timeout) = timeout else {
            warn!("stopping transport without informing server");
            return;
        };

        let url = request_url(
            connection,
            "abort",
            &receive_parameters(connection, connection_data, self.name),
        );

        debug!("will abort at url: {}", url);
        match tokio::time::timeout(timeout, self.http.post(&url, &connection.headers(), None)).await {
            Ok(Ok(_)) => info!("abort was successful"),
            Ok(Err(error)) => error!("abort failed {}", error),
            Err(_) => error!("abort timed out"),
        }
    }

    /// Makes any future abort a no-op without contacting the server.
    pub(crate) fn complete_abort(&self) {
        self.started_abort.store(true, Ordering::SeqCst);
    }

    pub(crate) fn try_complete_abort(&self) -> bool {
        self.started_abort.load(Ordering::SeqCst)
    }
}

/// Builds `{url}{endpoint}?{parameters}` against the connection's base url.
pub(crate) fn request_url(connection: &Connection, endpoint: &str, parameters: &[(String, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in parameters {
        serializer.append_pair(key, value);
    }

    format!("{}{}?{}", connection.url(), endpoint, serializer.finish())
}

/// Parameter set of the negotiate request: transport name, registration
/// payload, protocol version, plus all caller supplied query parameters.
pub(crate) fn negotiate_parameters(
    connection: &Connection,
    connection_data: &str,
    transport_name: &str,
) -> Vec<(String, String)> {
    let mut parameters = vec![
        ("transport".to_string(), transport_name.to_string()),
        ("connectionData".to_string(), connection_data.to_string()),
        ("clientProtocol".to_string(), connection.client_protocol().to_string()),
    ];

    if let Some(token) = connection.connection_token() {
        parameters.push(("connectionToken".to_string(), token));
    }

    for (key, value) in connection.query_string() {
        parameters.push((key.clone(), value.clone()));
    }

    parameters
}

/// Parameter set of the receive channel requests (connect, reconnect, poll,
/// send, abort): the session cursors are echoed once known.
pub(crate) fn receive_parameters(
    connection: &Connection,
    connection_data: &str,
    transport_name: &str,
) -> Vec<(String, String)> {
    let mut parameters = vec![
        ("transport".to_string(), transport_name.to_string()),
        ("clientProtocol".to_string(), connection.client_protocol().to_string()),
        ("connectionData".to_string(), connection_data.to_string()),
    ];

    if let Some(token) = connection.connection_token() {
        parameters.push(("connectionToken".to_string(), token));
    }
    if let Some(id) = connection.message_id() {
        parameters.push(("messageId".to_string(), id));
    }
    if let Some(token) = connection.groups_token() {
        parameters.push(("groupsToken".to_string(), token));
    }

    for (key, value) in connection.query_string() {
        parameters.push((key.clone(), value.clone()));
    }

    parameters
}
