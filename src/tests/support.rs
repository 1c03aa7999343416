use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::communication::{HttpClient, HttpError};
use crate::connection::Connection;
use crate::protocol::NegotiationResponse;
use crate::transports::ClientTransport;

pub(crate) fn negotiation(keep_alive_timeout: Option<f64>) -> NegotiationResponse {
    NegotiationResponse {
        connection_id: "c-1".to_string(),
        connection_token: "token-1".to_string(),
        url: "/signalr".to_string(),
        protocol_version: "1.3".to_string(),
        disconnect_timeout: 30.0,
        try_web_sockets: true,
        keep_alive_timeout,
        transport_connect_timeout: 5.0,
    }
}

/// Polls a condition until it holds or the timeout elapses.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

/// HTTP collaborator that replays scripted responses and records the urls it
/// was asked for.
pub(crate) struct FakeHttpClient {
    responses: Mutex<VecDeque<Result<String, HttpError>>>,
    pub(crate) requests: Mutex<Vec<String>>,
}

impl FakeHttpClient {
    pub(crate) fn new(responses: Vec<Result<String, HttpError>>) -> Arc<Self> {
        Arc::new(FakeHttpClient {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn request(&self, index: usize) -> String {
        self.requests.lock().unwrap()[index].clone()
    }

    fn next(&self, url: &str) -> Result<String, HttpError> {
        self.requests.lock().unwrap().push(url.to_string());

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(HttpError::Network("no scripted response left".to_string())))
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn get(&self, url: &str, _headers: &HashMap<String, String>) -> Result<String, HttpError> {
        self.next(url)
    }

    async fn post(
        &self,
        url: &str,
        _headers: &HashMap<String, String>,
        _body: Option<String>,
    ) -> Result<String, HttpError> {
        self.next(url)
    }
}

/// Transport that records every interaction; start and send can be scripted
/// to fail.
pub(crate) struct FakeTransport {
    name: &'static str,
    fail_start: bool,
    fail_send: bool,
    negotiation: NegotiationResponse,
    pub(crate) started: AtomicUsize,
    pub(crate) sent: Mutex<Vec<String>>,
    pub(crate) aborted: AtomicUsize,
    pub(crate) lost: AtomicUsize,
    pub(crate) negotiated_data: Mutex<Option<String>>,
}

impl FakeTransport {
    pub(crate) fn new(name: &'static str) -> Arc<Self> {
        FakeTransport::build(name, false, false, negotiation(None))
    }

    pub(crate) fn failing(name: &'static str) -> Arc<Self> {
        FakeTransport::build(name, true, false, negotiation(None))
    }

    pub(crate) fn failing_send(name: &'static str) -> Arc<Self> {
        FakeTransport::build(name, false, true, negotiation(None))
    }

    pub(crate) fn with_negotiation(name: &'static str, negotiation: NegotiationResponse) -> Arc<Self> {
        FakeTransport::build(name, false, false, negotiation)
    }

    fn build(
        name: &'static str,
        fail_start: bool,
        fail_send: bool,
        negotiation: NegotiationResponse,
    ) -> Arc<Self> {
        Arc::new(FakeTransport {
            name,
            fail_start,
            fail_send,
            negotiation,
            started: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            aborted: AtomicUsize::new(0),
            lost: AtomicUsize::new(0),
            negotiated_data: Mutex::new(None),
        })
    }

    pub(crate) fn sent_payloads(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientTransport for FakeTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports_keep_alive(&self) -> bool {
        true
    }

    async fn negotiate(
        &self,
        _connection: &Arc<Connection>,
        connection_data: &str,
    ) -> Result<NegotiationResponse, String> {
        *self.negotiated_data.lock().unwrap() = Some(connection_data.to_string());

        Ok(self.negotiation.clone())
    }

    async fn start(&self, _connection: &Arc<Connection>, _connection_data: &str) -> Result<(), String> {
        self.started.fetch_add(1, Ordering::SeqCst);

        if self.fail_start {
            Err(format!("{} refused to start", self.name))
        } else {
            Ok(())
        }
    }

    async fn send(
        &self,
        _connection: &Arc<Connection>,
        data: &str,
        _connection_data: &str,
    ) -> Result<(), String> {
        if self.fail_send {
            return Err(format!("{} refused to send", self.name));
        }

        self.sent.lock().unwrap().push(data.to_string());

        Ok(())
    }

    async fn abort(&self, _connection: &Arc<Connection>, _timeout: Option<Duration>, _connection_data: &str) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }

    fn lost_connection(&self, _connection: &Arc<Connection>) {
        self.lost.fetch_add(1, Ordering::SeqCst);
    }
}
