//! Session-scoped payloads: lifecycle, capabilities, labels and meta events

use serde::{Deserialize, Serialize};

/// Free-form metadata attached to start/end payloads
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Feature flags a participant advertises when a session opens.
///
/// Capabilities are informational. A sender may emit events the receiver
/// declared no capability for and the receiver decides whether to honor them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCapabilities {
    /// Emits async input streams (e.g. microphone audio)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_input_stream_emitter: Option<bool>,
    /// Handles async input streams
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_input_stream_handler: Option<bool>,
    /// Emits async (session-scoped) tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_tool_call_emitter: Option<bool>,
    /// Handles async (session-scoped) tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_tool_call_handler: Option<bool>,
    /// MIME types this participant emits in content parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_types_emitted: Option<Vec<String>>,
    /// MIME types this participant can handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_types_handled: Option<Vec<String>>,
}

impl SessionCapabilities {
    /// Whether `mime_type` appears in the handled list.
    ///
    /// A missing list means "unspecified" and answers `true`; `*/*` and
    /// `type/*` wildcards are honored.
    pub fn handles_mime_type(&self, mime_type: &str) -> bool {
        match &self.mime_types_handled {
            None => true,
            Some(list) => list.iter().any(|m| mime_matches(m, mime_type)),
        }
    }

    /// Whether `mime_type` appears in the emitted list (same rules as
    /// [`handles_mime_type`](Self::handles_mime_type)).
    pub fn emits_mime_type(&self, mime_type: &str) -> bool {
        match &self.mime_types_emitted {
            None => true,
            Some(list) => list.iter().any(|m| mime_matches(m, mime_type)),
        }
    }
}

fn mime_matches(pattern: &str, mime_type: &str) -> bool {
    if pattern == "*/*" || pattern.eq_ignore_ascii_case(mime_type) {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(prefix) => mime_type
            .split('/')
            .next()
            .is_some_and(|major| major.eq_ignore_ascii_case(prefix)),
        None => false,
    }
}

/// Sent by the client to open a session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    /// Capabilities of the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<SessionCapabilities>,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Sent by the service once the session is ready for child events
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    /// Capabilities of the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<SessionCapabilities>,
}

/// Announces that the peer will force-close the transport after a deadline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionEnding {
    /// Milliseconds until the transport may be closed
    #[serde(rename = "timeToLiveMS")]
    pub time_to_live_ms: u64,
}

/// Graceful terminal event of a session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSession {
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// The conversation label changed
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelUpdated {
    /// New label
    pub label: String,
    /// Whether the label was generated rather than set by a user
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub autogenerated: bool,
}

/// Arbitrary application data attached to an entity stream.
///
/// Always a JSON object on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaEvent(pub Metadata);

impl MetaEvent {
    /// Build a meta event from a JSON value; non-objects are wrapped as `{"value": ..}`
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Self(map),
            other => {
                let mut map = Metadata::new();
                map.insert("value".to_string(), other);
                Self(map)
            }
        }
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

impl StartSession {
    /// Start a session advertising `capabilities`
    pub fn with_capabilities(capabilities: SessionCapabilities) -> Self {
        Self {
            capabilities: Some(capabilities),
            metadata: None,
        }
    }
}

impl LabelUpdated {
    /// A user-set label
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            autogenerated: false,
        }
    }
}
