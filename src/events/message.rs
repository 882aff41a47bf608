//! Message-level events, roles and interrupts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentPartEvent, ErrorEvent, MetaEvent, Metadata, ToolCallEvent};
use crate::codec::wire::{WireInterruptEvent, WireMessageEvent};

/// One turn within an exchange, addressed by `messageId`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessageEvent", into = "WireMessageEvent")]
pub struct MessageEvent {
    /// Message identifier, unique within its exchange
    pub message_id: String,
    /// Payload
    pub kind: MessageEventKind,
}

/// Payload variants of a [`MessageEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum MessageEventKind {
    /// `startMessage`
    Start(StartMessage),
    /// `endMessage`
    End(EndMessage),
    /// A nested content part event
    ContentPart(ContentPartEvent),
    /// A nested tool call event
    ToolCall(ToolCallEvent),
    /// A nested interrupt event
    Interrupt(InterruptEvent),
    /// `metaEvent`
    Meta(MetaEvent),
    /// `messageError`
    Error(ErrorEvent),
    /// No recognized payload
    Unknown,
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions
    System,
    /// User input
    User,
    /// Agent response
    Assistant,
}

impl Role {
    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opens a message. The role is fixed here and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMessage {
    /// Author role
    pub role: Role,
    /// When the message started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Closes a message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndMessage {
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl StartMessage {
    /// Start a message with `role`
    pub fn new(role: Role) -> Self {
        Self {
            role,
            timestamp: None,
            metadata: None,
        }
    }

    /// Set the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl MessageEvent {
    /// Wrap a payload for `message_id`
    pub fn new(message_id: impl Into<String>, kind: MessageEventKind) -> Self {
        Self {
            message_id: message_id.into(),
            kind,
        }
    }
}

/// A pause point inside a message that needs an external answer
/// (human-in-the-loop).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireInterruptEvent", into = "WireInterruptEvent")]
pub struct InterruptEvent {
    /// Interrupt identifier, unique within its message
    pub interrupt_id: String,
    /// Payload
    pub kind: InterruptEventKind,
}

/// Payload variants of an [`InterruptEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum InterruptEventKind {
    /// `startInterrupt`: the agent asks for input
    Start(StartInterrupt),
    /// `endInterrupt`: the application answers
    End(EndInterrupt),
    /// No recognized payload
    Unknown,
}

/// The typed question carried by an interrupt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartInterrupt {
    /// Application-defined interrupt type (e.g. `"toolApproval"`)
    #[serde(rename = "type")]
    pub interrupt_type: String,
    /// Interrupt payload
    pub value: serde_json::Value,
}

/// The application-supplied answer resolving an interrupt
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndInterrupt(pub Metadata);

impl StartInterrupt {
    /// Create an interrupt request
    pub fn new(interrupt_type: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            interrupt_type: interrupt_type.into(),
            value,
        }
    }
}

impl EndInterrupt {
    /// Build an answer from a JSON value; non-objects are wrapped as `{"value": ..}`
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
}
