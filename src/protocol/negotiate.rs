use serde::Deserialize;

/// Response of the `negotiate` handshake. Field names are part of the wire
/// protocol. Timeouts are fractional seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct NegotiationResponse {
    #[serde(rename = "ConnectionId")]
    pub connection_id: String,

    #[serde(rename = "ConnectionToken")]
    pub connection_token: String,

    /// App relative server url the client should use for subsequent requests.
    #[serde(rename = "Url", default)]
    pub url: String,

    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: String,

    #[serde(rename = "DisconnectTimeout", default)]
    pub disconnect_timeout: f64,

    #[serde(rename = "TryWebSockets", default)]
    pub try_web_sockets: bool,

    /// Absent or non-positive when the server has keep alive disabled.
    #[serde(rename = "KeepAliveTimeout", default)]
    pub keep_alive_timeout: Option<f64>,

    #[serde(rename = "TransportConnectTimeout", default)]
    pub transport_connect_timeout: f64,
}
