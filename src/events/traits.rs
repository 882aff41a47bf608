//! Event trait definitions

use super::{
    AsyncInputStreamEvent, AsyncInputStreamEventKind, ContentPartEvent, ContentPartEventKind,
    ErrorEvent, ErrorEventKind, ExchangeEvent, ExchangeEventKind, InterruptEvent,
    InterruptEventKind, MessageEvent, MessageEventKind, ToolCallEvent, ToolCallEventKind,
};

/// Coarse classification of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    /// Opens an entity
    Start,
    /// Incremental data
    Chunk,
    /// Closes an entity
    End,
    /// Application meta data
    Meta,
    /// In-band error start or end
    Error,
    /// Addressed to a nested child entity
    Child,
    /// Aggregated record of an ended entity
    Completed,
    /// Session lifecycle or label
    Session,
    /// Protocol-shape violation
    Violation,
    /// Unrecognized payload
    Unknown,
}

impl EventClass {
    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Chunk => "chunk",
            Self::End => "end",
            Self::Meta => "meta",
            Self::Error => "error",
            Self::Child => "child",
            Self::Completed => "completed",
            Self::Session => "session",
            Self::Violation => "violation",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event addressed to one identified entity
pub trait EntityEvent {
    /// Identifier of the addressed entity
    fn entity_id(&self) -> &str;

    /// Class of the payload
    fn class(&self) -> EventClass;
}

impl EntityEvent for ExchangeEvent {
    fn entity_id(&self) -> &str {
        &self.exchange_id
    }

    fn class(&self) -> EventClass {
        match self.kind {
            ExchangeEventKind::Start(_) => EventClass::Start,
            ExchangeEventKind::End(_) => EventClass::End,
            ExchangeEventKind::Message(_) => EventClass::Child,
            ExchangeEventKind::Meta(_) => EventClass::Meta,
            ExchangeEventKind::Error(_) => EventClass::Error,
            ExchangeEventKind::Unknown => EventClass::Unknown,
        }
    }
}

impl EntityEvent for MessageEvent {
    fn entity_id(&self) -> &str {
        &self.message_id
    }

    fn class(&self) -> EventClass {
        match self.kind {
            MessageEventKind::Start(_) => EventClass::Start,
            MessageEventKind::End(_) => EventClass::End,
            MessageEventKind::ContentPart(_)
            | MessageEventKind::ToolCall(_)
            | MessageEventKind::Interrupt(_) => EventClass::Child,
            MessageEventKind::Meta(_) => EventClass::Meta,
            MessageEventKind::Error(_) => EventClass::Error,
            MessageEventKind::Unknown => EventClass::Unknown,
        }
    }
}

impl EntityEvent for ContentPartEvent {
    fn entity_id(&self) -> &str {
        &self.content_part_id
    }

    fn class(&self) -> EventClass {
        match self.kind {
            ContentPartEventKind::Start(_) => EventClass::Start,
            ContentPartEventKind::End(_) => EventClass::End,
            ContentPartEventKind::Chunk(_) => EventClass::Chunk,
            ContentPartEventKind::Meta(_) => EventClass::Meta,
            ContentPartEventKind::Error(_) => EventClass::Error,
            ContentPartEventKind::Unknown => EventClass::Unknown,
        }
    }
}

impl EntityEvent for ToolCallEvent {
    fn entity_id(&self) -> &str {
        &self.tool_call_id
    }

    fn class(&self) -> EventClass {
        match self.kind {
            ToolCallEventKind::Start(_) => EventClass::Start,
            ToolCallEventKind::End(_) => EventClass::End,
            ToolCallEventKind::Meta(_) => EventClass::Meta,
            ToolCallEventKind::Error(_) => EventClass::Error,
            ToolCallEventKind::Unknown => EventClass::Unknown,
        }
    }
}

impl EntityEvent for InterruptEvent {
    fn entity_id(&self) -> &str {
        &self.interrupt_id
    }

    fn class(&self) -> EventClass {
        match self.kind {
            InterruptEventKind::Start(_) => EventClass::Start,
            InterruptEventKind::End(_) => EventClass::End,
            InterruptEventKind::Unknown => EventClass::Unknown,
        }
    }
}

impl EntityEvent for AsyncInputStreamEvent {
    fn entity_id(&self) -> &str {
        &self.stream_id
    }

    fn class(&self) -> EventClass {
        match self.kind {
            AsyncInputStreamEventKind::Start(_) => EventClass::Start,
            AsyncInputStreamEventKind::End(_) => EventClass::End,
            AsyncInputStreamEventKind::Chunk(_) => EventClass::Chunk,
            AsyncInputStreamEventKind::Meta(_) => EventClass::Meta,
            AsyncInputStreamEventKind::Error(_) => EventClass::Error,
            AsyncInputStreamEventKind::Unknown => EventClass::Unknown,
        }
    }
}

impl EntityEvent for ErrorEvent {
    fn entity_id(&self) -> &str {
        &self.error_id
    }

    fn class(&self) -> EventClass {
        match self.kind {
            ErrorEventKind::Unknown => EventClass::Unknown,
            _ => EventClass::Error,
        }
    }
}
