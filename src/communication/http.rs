use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;

/// Failure of a single HTTP round trip. The transports only care about the
/// distinction between a server answering with a bad status and the network
/// not answering at all; everything else is flattened to strings at the
/// public boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("request failed with status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
}

/// The HTTP collaborator every http based transport talks through.
///
/// Query parameters are already encoded into `url` by the caller. `post`
/// sends a form encoded body when one is given. Implementations return the
/// response body text on success.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<String, HttpError>;

    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<String>,
    ) -> Result<String, HttpError>;
}

/// Default [`HttpClient`] backed by `ehttp`. The callback based fetch is
/// bridged through a oneshot channel so callers can await it.
pub struct EhttpClient;

impl EhttpClient {
    async fn fetch(mut request: ehttp::Request, headers: &HashMap<String, String>) -> Result<String, HttpError> {
        for (field, value) in headers {
            request.headers.insert(field, value);
        }

        let (sender, receiver) = futures::channel::oneshot::channel::<Result<String, HttpError>>();

        debug!("{} {}", request.method, request.url);
        ehttp::fetch(request, move |result| {
            let outcome = match result {
                Ok(response) => {
                    if response.ok {
                        Ok(response.text().unwrap_or_default().to_string())
                    } else {
                        Err(HttpError::Status(response.status))
                    }
                }
                Err(error) => Err(HttpError::Network(error)),
            };

            _ = sender.send(outcome);
        });

        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(HttpError::Network("the request was cancelled".to_string())),
        }
    }
}

#[async_trait]
impl HttpClient for EhttpClient {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<String, HttpError> {
        EhttpClient::fetch(ehttp::Request::get(url), headers).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: Option<String>,
    ) -> Result<String, HttpError> {
        let mut request = ehttp::Request::post(url, body.map(String::into_bytes).unwrap_or_default());

        if !request.body.is_empty() {
            request
                .headers
                .insert("Content-Type", "application/x-www-form-urlencoded");
        }

        EhttpClient::fetch(request, headers).await
    }
}
