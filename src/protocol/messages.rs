use serde_json::Value;

/// Keys of the generic inbound frame envelope.
///
/// A frame that carries `I` is a hub call result and is forwarded without
/// touching the session metadata; on that path `D` means error data, not the
/// disconnect flag, which is why frames are inspected as raw maps here.
pub(crate) const KEY_MESSAGE_ID: &str = "C";
pub(crate) const KEY_GROUPS_TOKEN: &str = "G";
pub(crate) const KEY_MESSAGES: &str = "M";
pub(crate) const KEY_SHOULD_RECONNECT: &str = "T";
pub(crate) const KEY_DISCONNECTED: &str = "D";
pub(crate) const KEY_HUB_RESULT_MARKER: &str = "I";

/// Reads a protocol flag that servers emit either as a boolean or as `0`/`1`.
pub(crate) fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

/// Reads a value that should be textual; numeric message ids are printed.
pub(crate) fn text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
