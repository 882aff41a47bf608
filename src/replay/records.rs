//! Persisted history shapes, as returned by the conversation history API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::Citation;
use crate::events::{ExternalValue, Metadata, Role};

/// User feedback on an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackRating {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRecord {
    pub exchange_id: String,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_rating: Option<FeedbackRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_sequence: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub message_id: String,
    pub role: Role,
    #[serde(default)]
    pub content_parts: Vec<ContentPartRecord>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default)]
    pub interrupts: Vec<InterruptRecord>,
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
}

/// Content stored inline or behind a URI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPartData {
    Inline { inline: String },
    External(ExternalValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPartRecord {
    pub content_part_id: String,
    pub mime_type: String,
    pub data: ContentPartData,
    #[serde(default)]
    pub citations: Vec<Citation>,
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub tool_call_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    /// Absent while the call never finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolCallResult>,
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptRecord {
    pub interrupt_id: String,
    #[serde(rename = "type")]
    pub interrupt_type: String,
    pub value: serde_json::Value,
    /// The value the interrupt was resolved with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_value: Option<Metadata>,
}
