//! Completion aggregation
//!
//! When an entity ends, its start and end payloads and everything streamed
//! in between are folded into one completed record:
//!
//! - [`ContentAggregator`] turns a content part's chunks into data plus
//!   citation ranges
//! - [`MessageAggregator`] collects a message's completed children
//! - tool calls merge their start and end payloads field by field

mod content;
mod message;

pub use content::{AggregatedContent, ContentAggregator};
pub use message::MessageAggregator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{
    CitationSource, EndAsyncInputStream, EndContentPart, EndExchange, EndInterrupt, EndMessage,
    EndToolCall, Role, StartAsyncInputStream, StartContentPart, StartExchange, StartInterrupt,
    StartMessage, StartToolCall,
};
use crate::replay::FeedbackRating;
use crate::state::Termination;

/// A cited byte range of a content part's data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub citation_id: String,
    /// Byte offset of the first cited byte
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
    pub sources: Vec<CitationSource>,
}

impl Citation {
    /// The cited text, if the range is valid for `data`
    pub fn slice<'a>(&self, data: &'a str) -> Option<&'a str> {
        data.get(self.offset..self.offset.checked_add(self.length)?)
    }
}

/// Data-quality problems found while aggregating citations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CitationErrorType {
    /// Close marker with no matching open
    CitationNotStarted,
    /// Open marker never closed before the part ended
    CitationNotEnded,
    /// Persisted range outside the data or off a character boundary
    CitationOutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationError {
    pub citation_id: String,
    pub error_type: CitationErrorType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedContentPart {
    pub content_part_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<StartContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EndContentPart>,
    pub data: String,
    pub citations: Vec<Citation>,
    pub citation_errors: Vec<CitationError>,
    #[serde(default)]
    pub termination: Termination,
}

impl CompletedContentPart {
    pub fn mime_type(&self) -> Option<&str> {
        self.start.as_ref().map(|s| s.mime_type.as_str())
    }
}

/// Field union of a tool call's start and end payloads
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedToolCall {
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub termination: Termination,
}

impl CompletedToolCall {
    /// Merge a start and an end payload
    pub fn merge(
        tool_call_id: impl Into<String>,
        start: Option<&StartToolCall>,
        end: Option<&EndToolCall>,
        termination: Termination,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: start.map(|s| s.tool_name.clone()),
            input: start.and_then(|s| s.input.clone()),
            output: end.and_then(|e| e.output.clone()),
            is_error: end.and_then(|e| e.is_error),
            cancelled: end.and_then(|e| e.cancelled),
            started_at: start.and_then(|s| s.timestamp),
            ended_at: end.and_then(|e| e.timestamp),
            termination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedInterrupt {
    pub interrupt_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<StartInterrupt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EndInterrupt>,
    #[serde(default)]
    pub termination: Termination,
}

/// A finished message with all of its children, each list in creation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedMessage {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<StartMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EndMessage>,
    pub content_parts: Vec<CompletedContentPart>,
    pub tool_calls: Vec<CompletedToolCall>,
    pub interrupts: Vec<CompletedInterrupt>,
    #[serde(default)]
    pub termination: Termination,
}

impl CompletedMessage {
    /// Concatenated data of every `text/*` part
    pub fn text(&self) -> String {
        self.content_parts
            .iter()
            .filter(|p| p.mime_type().is_some_and(|m| m.starts_with("text/")))
            .map(|p| p.data.as_str())
            .collect()
    }

    pub fn content_part(&self, content_part_id: &str) -> Option<&CompletedContentPart> {
        self.content_parts
            .iter()
            .find(|p| p.content_part_id == content_part_id)
    }

    pub fn tool_call(&self, tool_call_id: &str) -> Option<&CompletedToolCall> {
        self.tool_calls.iter().find(|t| t.tool_call_id == tool_call_id)
    }

    pub fn interrupt(&self, interrupt_id: &str) -> Option<&CompletedInterrupt> {
        self.interrupts.iter().find(|i| i.interrupt_id == interrupt_id)
    }
}

/// Persistence details carried by exchanges rebuilt from history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryInfo {
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_rating: Option<FeedbackRating>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedExchange {
    pub exchange_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<StartExchange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EndExchange>,
    pub messages: Vec<CompletedMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryInfo>,
    #[serde(default)]
    pub termination: Termination,
}

impl CompletedExchange {
    pub fn message(&self, message_id: &str) -> Option<&CompletedMessage> {
        self.messages.iter().find(|m| m.message_id == message_id)
    }
}

/// Totals of a finished input stream; chunks themselves are not retained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedInputStream {
    pub stream_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<StartAsyncInputStream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EndAsyncInputStream>,
    pub chunk_count: usize,
    /// Sum of the encoded chunk lengths
    pub byte_count: usize,
    #[serde(default)]
    pub termination: Termination,
}

/// Any completed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletedRecord {
    ContentPart(CompletedContentPart),
    ToolCall(CompletedToolCall),
    Interrupt(CompletedInterrupt),
    Message(CompletedMessage),
    Exchange(CompletedExchange),
    InputStream(CompletedInputStream),
}

impl CompletedRecord {
    pub fn termination(&self) -> Termination {
        match self {
            Self::ContentPart(r) => r.termination,
            Self::ToolCall(r) => r.termination,
            Self::Interrupt(r) => r.termination,
            Self::Message(r) => r.termination,
            Self::Exchange(r) => r.termination,
            Self::InputStream(r) => r.termination,
        }
    }
}

#[cfg(test)]
mod tests;
