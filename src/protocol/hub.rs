use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A hub method invocation envelope.
///
/// Outbound (client to server) it carries the callback id of the pending
/// call; inbound (server to client event dispatch) the callback id is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubInvocation {
    #[serde(rename = "I", default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,

    #[serde(rename = "H")]
    pub hub: String,

    #[serde(rename = "M")]
    pub method: String,

    #[serde(rename = "A", default)]
    pub args: Vec<Value>,

    /// Client state blob that round trips with every call.
    #[serde(rename = "S", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<HashMap<String, Value>>,
}

/// Result of a hub call, correlated back through the callback id.
///
/// If `error` is set, `result` is not meaningfully populated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubResult {
    #[serde(rename = "I", default)]
    pub id: Option<String>,

    #[serde(rename = "R", default)]
    pub result: Option<Value>,

    #[serde(rename = "H", default)]
    pub hub_exception: bool,

    #[serde(rename = "E", default)]
    pub error: Option<String>,

    #[serde(rename = "D", default)]
    pub error_data: Option<Value>,

    /// Server state to merge back into the proxy's client state.
    #[serde(rename = "S", default)]
    pub state: Option<HashMap<String, Value>>,
}

impl HubResult {
    /// Synthetic error result used to resolve pending calls that can no
    /// longer complete (reconnect or close).
    pub fn from_error(message: &str) -> Self {
        HubResult {
            error: Some(message.to_string()),
            ..HubResult::default()
        }
    }
}

/// One entry of the `connectionData` registration payload sent during
/// negotiation; a hub connection sends one per registered hub.
#[derive(Debug, Clone, Serialize)]
pub struct HubRegistrationData {
    #[serde(rename = "Name")]
    pub name: String,
}
