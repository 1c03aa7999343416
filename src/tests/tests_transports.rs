use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use crate::communication::HttpError;
use crate::connection::{Connection, ConnectionState};
use crate::tests::support::{negotiation, wait_until, FakeHttpClient, FakeTransport};
use crate::transports::{AutoTransport, ClientTransport, LongPollingTransport};

fn negotiate_body(keep_alive: Option<f64>) -> String {
    let mut body = json!({
        "ConnectionId": "c-1",
        "ConnectionToken": "token-1",
        "Url": "/signalr",
        "ProtocolVersion": "1.3",
        "DisconnectTimeout": 30.0,
        "TryWebSockets": false,
        "TransportConnectTimeout": 5.0
    });

    if let Some(keep_alive) = keep_alive {
        body["KeepAliveTimeout"] = json!(keep_alive);
    }

    body.to_string()
}

#[test_log::test(tokio::test)]
async fn auto_transport_falls_back_to_the_next_candidate() {
    let alpha = FakeTransport::failing("alpha");
    let beta = FakeTransport::new("beta");
    let auto: Arc<dyn ClientTransport> =
        Arc::new(AutoTransport::with_transports(vec![alpha.clone(), beta.clone()]));

    let connection = Connection::new("http://example.org/signalr");
    connection.start_with(auto.clone()).await.unwrap();

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(auto.name(), "beta");
    assert_eq!(alpha.started.load(Ordering::SeqCst), 1);
    assert_eq!(beta.started.load(Ordering::SeqCst), 1);

    // The failed candidate is never used again.
    connection.send(&json!("ping")).await.unwrap();
    assert!(alpha.sent_payloads().is_empty());
    assert_eq!(beta.sent_payloads().len(), 1);
}

#[test_log::test(tokio::test)]
async fn auto_transport_reports_a_single_aggregated_failure() {
    let alpha = FakeTransport::failing("alpha");
    let beta = FakeTransport::failing("beta");
    let auto = Arc::new(AutoTransport::with_transports(vec![alpha.clone(), beta.clone()]));

    let connection = Connection::new("http://example.org/signalr");
    let closed = Arc::new(AtomicUsize::new(0));
    let seen = closed.clone();
    connection.set_closed(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let result = connection.start_with(auto).await;

    assert!(result.unwrap_err().contains("no transport could be initialized"));
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test_log::test(tokio::test)]
async fn auto_transport_drops_websockets_when_the_server_cannot_try_them() {
    let mut no_websockets = negotiation(None);
    no_websockets.try_web_sockets = false;

    let web_sockets = FakeTransport::with_negotiation("webSockets", no_websockets);
    let fallback = FakeTransport::new("beta");
    let auto: Arc<dyn ClientTransport> =
        Arc::new(AutoTransport::with_transports(vec![web_sockets.clone(), fallback.clone()]));

    let connection = Connection::new("http://example.org/signalr");
    connection.start_with(auto.clone()).await.unwrap();

    assert_eq!(web_sockets.started.load(Ordering::SeqCst), 0);
    assert_eq!(fallback.started.load(Ordering::SeqCst), 1);
    assert_eq!(auto.name(), "beta");
}

#[test_log::test(tokio::test)]
async fn long_polling_connects_polls_and_honors_the_disconnect_frame() {
    let http = FakeHttpClient::new(vec![
        Ok(negotiate_body(None)),
        Ok(r#"{"C":"s-0,1","S":1,"M":[]}"#.to_string()),
        Ok(r#"{"D":true}"#.to_string()),
    ]);

    let connection = Connection::new("http://example.org/signalr");
    let closed = Arc::new(AtomicUsize::new(0));
    let seen = closed.clone();
    connection.set_closed(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let transport = Arc::new(LongPollingTransport::new(http.clone()));
    connection.start_with(transport).await.unwrap();

    assert!(wait_until(|| connection.state() == ConnectionState::Disconnected).await);
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    let negotiate_url = http.request(0);
    assert!(negotiate_url.contains("negotiate?"));
    assert!(negotiate_url.contains("transport=longPolling"));
    assert!(negotiate_url.contains("clientProtocol=1.3"));

    let connect_url = http.request(1);
    assert!(connect_url.contains("connect?"));
    assert!(connect_url.contains("connectionToken=token-1"));

    let poll_url = http.request(2);
    assert!(poll_url.contains("poll?"));
    assert!(poll_url.contains("messageId=s-0%2C1"));
}

#[test_log::test(tokio::test)]
async fn long_polling_negotiate_failure_closes_the_connection() {
    let http = FakeHttpClient::new(vec![Err(HttpError::Network("connection refused".to_string()))]);

    let connection = Connection::new("http://example.org/signalr");
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = errors.clone();
    connection.set_error(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let transport = Arc::new(LongPollingTransport::new(http));
    let result = connection.start_with(transport).await;

    assert!(result.unwrap_err().contains("negotiate failed"));
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[test_log::test(tokio::test)]
async fn long_polling_start_fails_when_the_first_poll_fails() {
    let http = FakeHttpClient::new(vec![
        Ok(negotiate_body(None)),
        Err(HttpError::Status(503)),
    ]);

    let connection = Connection::new("http://example.org/signalr");
    let transport = Arc::new(LongPollingTransport::new(http));

    let result = connection.start_with(transport).await;

    assert!(result.unwrap_err().contains("503"));
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[test_log::test(tokio::test)]
async fn query_string_parameters_are_forwarded() {
    let http = FakeHttpClient::new(vec![
        Ok(negotiate_body(None)),
        Ok(r#"{"D":true}"#.to_string()),
    ]);

    let mut query = std::collections::HashMap::new();
    query.insert("tenant".to_string(), "blue team".to_string());

    let connection = Connection::with_query_string("http://example.org/signalr", query);
    let transport = Arc::new(LongPollingTransport::new(http.clone()));
    connection.start_with(transport).await.unwrap();

    assert!(wait_until(|| connection.state() == ConnectionState::Disconnected).await);
    assert!(http.request(0).contains("tenant=blue+team"));
    assert!(http.request(1).contains("tenant=blue+team"));
}
