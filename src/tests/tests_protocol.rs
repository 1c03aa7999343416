use std::time::Duration;

use serde_json::json;

use crate::connection::KeepAliveData;
use crate::protocol::{HubInvocation, HubResult, NegotiationResponse, Version};

#[test]
fn version_parses_two_components() {
    let version: Version = "2.1".parse().unwrap();

    assert_eq!(version.major, 2);
    assert_eq!(version.minor, 1);
    assert_eq!(version.build, 0);
    assert_eq!(version.revision, 0);
}

#[test]
fn version_parses_four_components() {
    let version: Version = "1.3.5.7".parse().unwrap();

    assert_eq!(version.major, 1);
    assert_eq!(version.minor, 3);
    assert_eq!(version.build, 5);
    assert_eq!(version.revision, 7);
}

#[test]
fn version_rejects_malformed_input() {
    assert!("".parse::<Version>().is_err());
    assert!("1".parse::<Version>().is_err());
    assert!("1.2.3.4.5".parse::<Version>().is_err());
    assert!("1.x".parse::<Version>().is_err());
}

#[test]
fn version_formats_without_trailing_zero_components() {
    assert_eq!(Version::new(1, 3).to_string(), "1.3");
    assert_eq!(Version::full(1, 3, 5, 0).to_string(), "1.3.5");
    assert_eq!(Version::full(1, 3, 0, 7).to_string(), "1.3.0.7");
}

#[test]
fn negotiation_response_reads_wire_field_names() {
    let body = json!({
        "ConnectionId": "0b35...",
        "ConnectionToken": "AQAA...",
        "Url": "/signalr",
        "ProtocolVersion": "1.3",
        "DisconnectTimeout": 30.0,
        "TryWebSockets": true,
        "KeepAliveTimeout": 20.0,
        "TransportConnectTimeout": 5.0
    });

    let response: NegotiationResponse = serde_json::from_value(body).unwrap();

    assert_eq!(response.connection_token, "AQAA...");
    assert_eq!(response.protocol_version, "1.3");
    assert!(response.try_web_sockets);
    assert_eq!(response.keep_alive_timeout, Some(20.0));
}

#[test]
fn negotiation_response_tolerates_missing_keep_alive() {
    let body = json!({
        "ConnectionId": "id",
        "ConnectionToken": "token",
        "ProtocolVersion": "1.3"
    });

    let response: NegotiationResponse = serde_json::from_value(body).unwrap();

    assert_eq!(response.keep_alive_timeout, None);
    assert!(!response.try_web_sockets);
}

#[test]
fn keep_alive_derives_warning_and_check_interval() {
    let keep_alive = KeepAliveData::new(Duration::from_secs(9));

    assert_eq!(keep_alive.timeout(), Duration::from_secs(9));
    assert_eq!(keep_alive.timeout_warning(), Duration::from_secs(6));
    assert_eq!(keep_alive.check_interval(), Duration::from_secs(1));
}

#[test]
fn hub_invocation_serializes_protocol_keys() {
    let invocation = HubInvocation {
        callback_id: Some("7".to_string()),
        hub: "chat".to_string(),
        method: "Send".to_string(),
        args: vec![json!("hello")],
        state: None,
    };

    let value = serde_json::to_value(&invocation).unwrap();
    let map = value.as_object().unwrap();

    assert_eq!(map["I"], json!("7"));
    assert_eq!(map["H"], json!("chat"));
    assert_eq!(map["M"], json!("Send"));
    assert_eq!(map["A"], json!(["hello"]));
    assert!(!map.contains_key("S"));
}

#[test]
fn hub_result_reads_protocol_keys() {
    let result: HubResult = serde_json::from_value(json!({
        "I": "7",
        "R": {"answer": 42},
        "S": {"counter": 1}
    }))
    .unwrap();

    assert_eq!(result.id.as_deref(), Some("7"));
    assert_eq!(result.result, Some(json!({"answer": 42})));
    assert!(result.error.is_none());
    assert!(!result.hub_exception);
    assert_eq!(result.state.unwrap()["counter"], json!(1));
}

#[test]
fn hub_result_error_frames_leave_result_empty() {
    let result: HubResult = serde_json::from_value(json!({
        "I": "3",
        "E": "something failed",
        "H": true,
        "D": {"detail": 1}
    }))
    .unwrap();

    assert_eq!(result.error.as_deref(), Some("something failed"));
    assert!(result.hub_exception);
    assert!(result.result.is_none());
}
