//! Flat wire mirror of the typed envelope
//!
//! On the wire every level is an object with an id field and a set of
//! optional payload fields of which exactly one is populated. Each typed
//! event converts to and from its `Wire*` mirror through serde's
//! `try_from`/`into`, so the "exactly one" rule is checked in one place.
//! Objects with no recognized payload decode to the `Unknown` variant;
//! objects with more than one populated payload are rejected.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::events::*;

/// Picks the single populated payload of a wire object
struct OneOf<K> {
    scope: &'static str,
    found: Option<(&'static str, K)>,
    conflicts: Vec<&'static str>,
}

impl<K> OneOf<K> {
    fn new(scope: &'static str) -> Self {
        Self {
            scope,
            found: None,
            conflicts: Vec::new(),
        }
    }

    fn offer<V>(mut self, field: &'static str, value: Option<V>, wrap: impl FnOnce(V) -> K) -> Self {
        if let Some(value) = value {
            if self.found.is_none() {
                self.found = Some((field, wrap(value)));
            } else {
                self.conflicts.push(field);
            }
        }
        self
    }

    fn finish(self, unknown: K) -> Result<K, CodecError> {
        let Self {
            scope,
            found,
            conflicts,
        } = self;
        match found {
            None => Ok(unknown),
            Some((_, kind)) if conflicts.is_empty() => Ok(kind),
            Some((first, _)) => {
                let mut fields = vec![first];
                fields.extend(conflicts);
                Err(CodecError::AmbiguousVariant { scope, fields })
            }
        }
    }
}

// ============================================================================
// Conversation
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireConversationEvent {
    conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_session: Option<StartSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_started: Option<SessionStarted>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_ending: Option<SessionEnding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_session: Option<EndSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exchange: Option<ExchangeEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    async_input_stream: Option<AsyncInputStreamEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    async_tool_call: Option<ToolCallEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label_updated: Option<LabelUpdated>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta_event: Option<MetaEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conversation_error: Option<ErrorEvent>,
}

impl TryFrom<WireConversationEvent> for ConversationEvent {
    type Error = CodecError;

    fn try_from(wire: WireConversationEvent) -> Result<Self, Self::Error> {
        use ConversationEventKind as K;
        let kind = OneOf::new("conversation")
            .offer("startSession", wire.start_session, K::StartSession)
            .offer("sessionStarted", wire.session_started, K::SessionStarted)
            .offer("sessionEnding", wire.session_ending, K::SessionEnding)
            .offer("endSession", wire.end_session, K::EndSession)
            .offer("exchange", wire.exchange, K::Exchange)
            .offer("asyncInputStream", wire.async_input_stream, K::AsyncInputStream)
            .offer("asyncToolCall", wire.async_tool_call, K::AsyncToolCall)
            .offer("labelUpdated", wire.label_updated, K::LabelUpdated)
            .offer("metaEvent", wire.meta_event, K::Meta)
            .offer("conversationError", wire.conversation_error, K::Error)
            .finish(K::Unknown)?;
        Ok(Self {
            conversation_id: wire.conversation_id,
            kind,
        })
    }
}

impl From<ConversationEvent> for WireConversationEvent {
    fn from(event: ConversationEvent) -> Self {
        let mut wire = Self {
            conversation_id: event.conversation_id,
            ..Self::default()
        };
        match event.kind {
            ConversationEventKind::StartSession(v) => wire.start_session = Some(v),
            ConversationEventKind::SessionStarted(v) => wire.session_started = Some(v),
            ConversationEventKind::SessionEnding(v) => wire.session_ending = Some(v),
            ConversationEventKind::EndSession(v) => wire.end_session = Some(v),
            ConversationEventKind::Exchange(v) => wire.exchange = Some(v),
            ConversationEventKind::AsyncInputStream(v) => wire.async_input_stream = Some(v),
            ConversationEventKind::AsyncToolCall(v) => wire.async_tool_call = Some(v),
            ConversationEventKind::LabelUpdated(v) => wire.label_updated = Some(v),
            ConversationEventKind::Meta(v) => wire.meta_event = Some(v),
            ConversationEventKind::Error(v) => wire.conversation_error = Some(v),
            ConversationEventKind::Unknown => {}
        }
        wire
    }
}

// ============================================================================
// Exchange
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireExchangeEvent {
    exchange_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_exchange: Option<StartExchange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_exchange: Option<EndExchange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<MessageEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta_event: Option<MetaEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exchange_error: Option<ErrorEvent>,
}

impl TryFrom<WireExchangeEvent> for ExchangeEvent {
    type Error = CodecError;

    fn try_from(wire: WireExchangeEvent) -> Result<Self, Self::Error> {
        use ExchangeEventKind as K;
        let kind = OneOf::new("exchange")
            .offer("startExchange", wire.start_exchange, K::Start)
            .offer("endExchange", wire.end_exchange, K::End)
            .offer("message", wire.message, K::Message)
            .offer("metaEvent", wire.meta_event, K::Meta)
            .offer("exchangeError", wire.exchange_error, K::Error)
            .finish(K::Unknown)?;
        Ok(Self {
            exchange_id: wire.exchange_id,
            kind,
        })
    }
}

impl From<ExchangeEvent> for WireExchangeEvent {
    fn from(event: ExchangeEvent) -> Self {
        let mut wire = Self {
            exchange_id: event.exchange_id,
            ..Self::default()
        };
        match event.kind {
            ExchangeEventKind::Start(v) => wire.start_exchange = Some(v),
            ExchangeEventKind::End(v) => wire.end_exchange = Some(v),
            ExchangeEventKind::Message(v) => wire.message = Some(v),
            ExchangeEventKind::Meta(v) => wire.meta_event = Some(v),
            ExchangeEventKind::Error(v) => wire.exchange_error = Some(v),
            ExchangeEventKind::Unknown => {}
        }
        wire
    }
}

// ============================================================================
// Message
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMessageEvent {
    message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_message: Option<StartMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_message: Option<EndMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_part: Option<ContentPartEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call: Option<ToolCallEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interrupt: Option<InterruptEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta_event: Option<MetaEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_error: Option<ErrorEvent>,
}

impl TryFrom<WireMessageEvent> for MessageEvent {
    type Error = CodecError;

    fn try_from(wire: WireMessageEvent) -> Result<Self, Self::Error> {
        use MessageEventKind as K;
        let kind = OneOf::new("message")
            .offer("startMessage", wire.start_message, K::Start)
            .offer("endMessage", wire.end_message, K::End)
            .offer("contentPart", wire.content_part, K::ContentPart)
            .offer("toolCall", wire.tool_call, K::ToolCall)
            .offer("interrupt", wire.interrupt, K::Interrupt)
            .offer("metaEvent", wire.meta_event, K::Meta)
            .offer("messageError", wire.message_error, K::Error)
            .finish(K::Unknown)?;
        Ok(Self {
            message_id: wire.message_id,
            kind,
        })
    }
}

impl From<MessageEvent> for WireMessageEvent {
    fn from(event: MessageEvent) -> Self {
        let mut wire = Self {
            message_id: event.message_id,
            ..Self::default()
        };
        match event.kind {
            MessageEventKind::Start(v) => wire.start_message = Some(v),
            MessageEventKind::End(v) => wire.end_message = Some(v),
            MessageEventKind::ContentPart(v) => wire.content_part = Some(v),
            MessageEventKind::ToolCall(v) => wire.tool_call = Some(v),
            MessageEventKind::Interrupt(v) => wire.interrupt = Some(v),
            MessageEventKind::Meta(v) => wire.meta_event = Some(v),
            MessageEventKind::Error(v) => wire.message_error = Some(v),
            MessageEventKind::Unknown => {}
        }
        wire
    }
}

// ============================================================================
// Content part
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireContentPartEvent {
    content_part_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_content_part: Option<StartContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_content_part: Option<EndContentPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk: Option<ContentPartChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta_event: Option<MetaEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_part_error: Option<ErrorEvent>,
}

impl TryFrom<WireContentPartEvent> for ContentPartEvent {
    type Error = CodecError;

    fn try_from(wire: WireContentPartEvent) -> Result<Self, Self::Error> {
        use ContentPartEventKind as K;
        let kind = OneOf::new("contentPart")
            .offer("startContentPart", wire.start_content_part, K::Start)
            .offer("endContentPart", wire.end_content_part, K::End)
            .offer("chunk", wire.chunk, K::Chunk)
            .offer("metaEvent", wire.meta_event, K::Meta)
            .offer("contentPartError", wire.content_part_error, K::Error)
            .finish(K::Unknown)?;
        Ok(Self {
            content_part_id: wire.content_part_id,
            kind,
        })
    }
}

impl From<ContentPartEvent> for WireContentPartEvent {
    fn from(event: ContentPartEvent) -> Self {
        let mut wire = Self {
            content_part_id: event.content_part_id,
            ..Self::default()
        };
        match event.kind {
            ContentPartEventKind::Start(v) => wire.start_content_part = Some(v),
            ContentPartEventKind::End(v) => wire.end_content_part = Some(v),
            ContentPartEventKind::Chunk(v) => wire.chunk = Some(v),
            ContentPartEventKind::Meta(v) => wire.meta_event = Some(v),
            ContentPartEventKind::Error(v) => wire.content_part_error = Some(v),
            ContentPartEventKind::Unknown => {}
        }
        wire
    }
}

// ============================================================================
// Tool call (message-scoped and async)
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireToolCallEvent {
    tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_tool_call: Option<StartToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_tool_call: Option<EndToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta_event: Option<MetaEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_error: Option<ErrorEvent>,
}

impl TryFrom<WireToolCallEvent> for ToolCallEvent {
    type Error = CodecError;

    fn try_from(wire: WireToolCallEvent) -> Result<Self, Self::Error> {
        use ToolCallEventKind as K;
        let kind = OneOf::new("toolCall")
            .offer("startToolCall", wire.start_tool_call, K::Start)
            .offer("endToolCall", wire.end_tool_call, K::End)
            .offer("metaEvent", wire.meta_event, K::Meta)
            .offer("toolCallError", wire.tool_call_error, K::Error)
            .finish(K::Unknown)?;
        Ok(Self {
            tool_call_id: wire.tool_call_id,
            kind,
        })
    }
}

impl From<ToolCallEvent> for WireToolCallEvent {
    fn from(event: ToolCallEvent) -> Self {
        let mut wire = Self {
            tool_call_id: event.tool_call_id,
            ..Self::default()
        };
        match event.kind {
            ToolCallEventKind::Start(v) => wire.start_tool_call = Some(v),
            ToolCallEventKind::End(v) => wire.end_tool_call = Some(v),
            ToolCallEventKind::Meta(v) => wire.meta_event = Some(v),
            ToolCallEventKind::Error(v) => wire.tool_call_error = Some(v),
            ToolCallEventKind::Unknown => {}
        }
        wire
    }
}

// ============================================================================
// Interrupt
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireInterruptEvent {
    interrupt_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_interrupt: Option<StartInterrupt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_interrupt: Option<EndInterrupt>,
}

impl TryFrom<WireInterruptEvent> for InterruptEvent {
    type Error = CodecError;

    fn try_from(wire: WireInterruptEvent) -> Result<Self, Self::Error> {
        use InterruptEventKind as K;
        let kind = OneOf::new("interrupt")
            .offer("startInterrupt", wire.start_interrupt, K::Start)
            .offer("endInterrupt", wire.end_interrupt, K::End)
            .finish(K::Unknown)?;
        Ok(Self {
            interrupt_id: wire.interrupt_id,
            kind,
        })
    }
}

impl From<InterruptEvent> for WireInterruptEvent {
    fn from(event: InterruptEvent) -> Self {
        let mut wire = Self {
            interrupt_id: event.interrupt_id,
            ..Self::default()
        };
        match event.kind {
            InterruptEventKind::Start(v) => wire.start_interrupt = Some(v),
            InterruptEventKind::End(v) => wire.end_interrupt = Some(v),
            InterruptEventKind::Unknown => {}
        }
        wire
    }
}

// ============================================================================
// Async input stream
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireAsyncInputStreamEvent {
    stream_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_async_input_stream: Option<StartAsyncInputStream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_async_input_stream: Option<EndAsyncInputStream>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk: Option<AsyncInputStreamChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta_event: Option<MetaEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    async_input_stream_error: Option<ErrorEvent>,
}

impl TryFrom<WireAsyncInputStreamEvent> for AsyncInputStreamEvent {
    type Error = CodecError;

    fn try_from(wire: WireAsyncInputStreamEvent) -> Result<Self, Self::Error> {
        use AsyncInputStreamEventKind as K;
        let kind = OneOf::new("asyncInputStream")
            .offer("startAsyncInputStream", wire.start_async_input_stream, K::Start)
            .offer("endAsyncInputStream", wire.end_async_input_stream, K::End)
            .offer("chunk", wire.chunk, K::Chunk)
            .offer("metaEvent", wire.meta_event, K::Meta)
            .offer("asyncInputStreamError", wire.async_input_stream_error, K::Error)
            .finish(K::Unknown)?;
        Ok(Self {
            stream_id: wire.stream_id,
            kind,
        })
    }
}

impl From<AsyncInputStreamEvent> for WireAsyncInputStreamEvent {
    fn from(event: AsyncInputStreamEvent) -> Self {
        let mut wire = Self {
            stream_id: event.stream_id,
            ..Self::default()
        };
        match event.kind {
            AsyncInputStreamEventKind::Start(v) => wire.start_async_input_stream = Some(v),
            AsyncInputStreamEventKind::End(v) => wire.end_async_input_stream = Some(v),
            AsyncInputStreamEventKind::Chunk(v) => wire.chunk = Some(v),
            AsyncInputStreamEventKind::Meta(v) => wire.meta_event = Some(v),
            AsyncInputStreamEventKind::Error(v) => wire.async_input_stream_error = Some(v),
            AsyncInputStreamEventKind::Unknown => {}
        }
        wire
    }
}

// ============================================================================
// Error
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireErrorEvent {
    error_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_error: Option<ErrorStart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_error: Option<ErrorEnd>,
}

impl TryFrom<WireErrorEvent> for ErrorEvent {
    type Error = CodecError;

    fn try_from(wire: WireErrorEvent) -> Result<Self, Self::Error> {
        use ErrorEventKind as K;
        let kind = OneOf::new("error")
            .offer("startError", wire.start_error, K::Start)
            .offer("endError", wire.end_error, K::End)
            .finish(K::Unknown)?;
        Ok(Self {
            error_id: wire.error_id,
            kind,
        })
    }
}

impl From<ErrorEvent> for WireErrorEvent {
    fn from(event: ErrorEvent) -> Self {
        let mut wire = Self {
            error_id: event.error_id,
            ..Self::default()
        };
        match event.kind {
            ErrorEventKind::Start(v) => wire.start_error = Some(v),
            ErrorEventKind::End(v) => wire.end_error = Some(v),
            ErrorEventKind::Unknown => {}
        }
        wire
    }
}
