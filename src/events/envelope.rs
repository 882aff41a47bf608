//! The single wire envelope type

use serde::{Deserialize, Serialize};

use super::traits::EventClass;
use super::{
    AsyncInputStreamEvent, EndSession, ErrorEvent, ExchangeEvent, LabelUpdated, MetaEvent,
    SessionEnding, SessionStarted, StartSession, ToolCallEvent,
};
use crate::codec::wire::WireConversationEvent;

/// Every frame on the wire carries exactly one `ConversationEvent`.
///
/// The envelope is scoped by `conversationId` and populates exactly one of
/// its payload fields; that discipline is expressed here as the
/// [`ConversationEventKind`] sum type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireConversationEvent", into = "WireConversationEvent")]
pub struct ConversationEvent {
    /// Conversation this event belongs to
    pub conversation_id: String,
    /// Payload
    pub kind: ConversationEventKind,
}

/// Payload variants of a [`ConversationEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEventKind {
    /// `startSession` (client → service)
    StartSession(StartSession),
    /// `sessionStarted` (service → client)
    SessionStarted(SessionStarted),
    /// `sessionEnding`
    SessionEnding(SessionEnding),
    /// `endSession`
    EndSession(EndSession),
    /// `exchange`
    Exchange(ExchangeEvent),
    /// `asyncInputStream` (session-scoped)
    AsyncInputStream(AsyncInputStreamEvent),
    /// `asyncToolCall` (session-scoped)
    AsyncToolCall(ToolCallEvent),
    /// `labelUpdated`
    LabelUpdated(LabelUpdated),
    /// `metaEvent`
    Meta(MetaEvent),
    /// `conversationError`
    Error(ErrorEvent),
    /// No recognized payload (forward-compatible additions)
    Unknown,
}

impl ConversationEvent {
    /// Create an envelope
    pub fn new(conversation_id: impl Into<String>, kind: ConversationEventKind) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            kind,
        }
    }

    /// Whether the payload addresses the session itself rather than a child
    /// entity. Child events are not valid before `sessionStarted`.
    pub fn is_session_level(&self) -> bool {
        !matches!(
            self.kind,
            ConversationEventKind::Exchange(_)
                | ConversationEventKind::AsyncInputStream(_)
                | ConversationEventKind::AsyncToolCall(_)
        )
    }

    /// Whether this envelope opens the session (`startSession` or
    /// `sessionStarted`)
    pub fn opens_session(&self) -> bool {
        matches!(
            self.kind,
            ConversationEventKind::StartSession(_) | ConversationEventKind::SessionStarted(_)
        )
    }

    /// Coarse class of the payload
    pub fn class(&self) -> EventClass {
        match &self.kind {
            ConversationEventKind::StartSession(_)
            | ConversationEventKind::SessionStarted(_)
            | ConversationEventKind::SessionEnding(_)
            | ConversationEventKind::EndSession(_)
            | ConversationEventKind::LabelUpdated(_) => EventClass::Session,
            ConversationEventKind::Exchange(_)
            | ConversationEventKind::AsyncInputStream(_)
            | ConversationEventKind::AsyncToolCall(_) => EventClass::Child,
            ConversationEventKind::Meta(_) => EventClass::Meta,
            ConversationEventKind::Error(_) => EventClass::Error,
            ConversationEventKind::Unknown => EventClass::Unknown,
        }
    }
}
