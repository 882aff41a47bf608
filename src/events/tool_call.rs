//! Tool call events (message-scoped and async/session-scoped)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ErrorEvent, MetaEvent, Metadata};
use crate::codec::wire::WireToolCallEvent;

/// A record of the agent invoking an external tool, addressed by `toolCallId`.
///
/// The same shape is used for message-scoped `toolCall` and session-scoped
/// `asyncToolCall` envelopes; only the owner differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireToolCallEvent", into = "WireToolCallEvent")]
pub struct ToolCallEvent {
    /// Tool call identifier
    pub tool_call_id: String,
    /// Payload
    pub kind: ToolCallEventKind,
}

/// Payload variants of a [`ToolCallEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallEventKind {
    /// `startToolCall`
    Start(StartToolCall),
    /// `endToolCall`
    End(EndToolCall),
    /// `metaEvent`
    Meta(MetaEvent),
    /// `toolCallError`
    Error(ErrorEvent),
    /// No recognized payload
    Unknown,
}

/// Invocation of a tool
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartToolCall {
    /// Name of the tool
    pub tool_name: String,
    /// Input arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    /// When the call started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Result of a tool invocation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndToolCall {
    /// Tool output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Whether the output describes a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    /// Whether the call was cancelled before completing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    /// When the call ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl StartToolCall {
    /// Invoke `tool_name` with `input`
    pub fn new(tool_name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            input: Some(input),
            timestamp: None,
            metadata: None,
        }
    }
}

impl EndToolCall {
    /// Successful result
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            output: Some(output),
            is_error: Some(false),
            ..Self::default()
        }
    }

    /// Failed result
    pub fn error(output: serde_json::Value) -> Self {
        Self {
            output: Some(output),
            is_error: Some(true),
            ..Self::default()
        }
    }

    /// Cancelled before a result was produced
    pub fn cancelled() -> Self {
        Self {
            cancelled: Some(true),
            ..Self::default()
        }
    }
}

impl ToolCallEvent {
    /// Wrap a payload for `tool_call_id`
    pub fn new(tool_call_id: impl Into<String>, kind: ToolCallEventKind) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            kind,
        }
    }
}
