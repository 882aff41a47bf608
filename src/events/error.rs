//! In-band error events

use serde::{Deserialize, Serialize};

use crate::codec::wire::WireErrorEvent;

/// An application-level error the peer reports about one entity.
///
/// Errors open with `startError` and close with `endError`, both keyed by
/// `errorId`. They never change the lifecycle of the entity they concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireErrorEvent", into = "WireErrorEvent")]
pub struct ErrorEvent {
    /// Identifier shared by the start and end of this error
    pub error_id: String,
    /// Which half of the error this envelope carries
    pub kind: ErrorEventKind,
}

/// Payload variants of an [`ErrorEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorEventKind {
    /// The error was raised
    Start(ErrorStart),
    /// The error was cleared
    End(ErrorEnd),
    /// No recognized payload; dispatched as a no-op
    Unknown,
}

/// Body of a raised error
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStart {
    /// Human-readable message
    pub message: String,
    /// Optional structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Body of a cleared error (currently empty)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorEnd {}

impl ErrorEvent {
    /// Create an error start event
    pub fn start(error_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_id: error_id.into(),
            kind: ErrorEventKind::Start(ErrorStart {
                message: message.into(),
                details: None,
            }),
        }
    }

    /// Create an error end event
    pub fn end(error_id: impl Into<String>) -> Self {
        Self {
            error_id: error_id.into(),
            kind: ErrorEventKind::End(ErrorEnd {}),
        }
    }
}

impl ErrorStart {
    /// Create an error body with a message and no details
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
