//! Outbound emitters
//!
//! Each emitter borrows the session and wraps payloads in the envelope
//! chain for its entity. Emitters hold no state of their own; lifecycle
//! checks happen in the session's registry.

use crate::emission::Transport;
use crate::error::Result;
use crate::events::*;

use super::Session;

fn error_start(error_id: String, error: ErrorStart) -> ErrorEvent {
    ErrorEvent {
        error_id,
        kind: ErrorEventKind::Start(error),
    }
}

// ============================================================================
// Exchange
// ============================================================================

pub struct ExchangeEmitter<'s, T: Transport> {
    session: &'s mut Session<T>,
    exchange_id: String,
}

impl<'s, T: Transport> ExchangeEmitter<'s, T> {
    pub(super) fn new(session: &'s mut Session<T>, exchange_id: String) -> Self {
        Self {
            session,
            exchange_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.exchange_id
    }

    fn send(&mut self, kind: ExchangeEventKind) -> Result<()> {
        let event = ExchangeEvent::new(self.exchange_id.clone(), kind);
        self.session.emit(ConversationEventKind::Exchange(event))
    }

    pub fn start(&mut self, start: StartExchange) -> Result<()> {
        self.send(ExchangeEventKind::Start(start))
    }

    /// End the exchange; open messages are settled by the abandon policy
    pub fn end(&mut self, end: EndExchange) -> Result<()> {
        self.send(ExchangeEventKind::End(end))
    }

    pub fn meta(&mut self, meta: MetaEvent) -> Result<()> {
        self.send(ExchangeEventKind::Meta(meta))
    }

    pub fn start_error(&mut self, error_id: impl Into<String>, error: ErrorStart) -> Result<()> {
        self.send(ExchangeEventKind::Error(error_start(error_id.into(), error)))
    }

    pub fn end_error(&mut self, error_id: impl Into<String>) -> Result<()> {
        self.send(ExchangeEventKind::Error(ErrorEvent::end(error_id)))
    }

    pub fn message(&mut self, message_id: impl Into<String>) -> MessageEmitter<'_, T> {
        MessageEmitter {
            session: &mut *self.session,
            exchange_id: self.exchange_id.clone(),
            message_id: message_id.into(),
        }
    }
}

// ============================================================================
// Message
// ============================================================================

pub struct MessageEmitter<'s, T: Transport> {
    session: &'s mut Session<T>,
    exchange_id: String,
    message_id: String,
}

impl<'s, T: Transport> MessageEmitter<'s, T> {
    pub fn id(&self) -> &str {
        &self.message_id
    }

    fn send(&mut self, kind: MessageEventKind) -> Result<()> {
        send_message(self.session, &self.exchange_id, &self.message_id, kind)
    }

    pub fn start(&mut self, start: StartMessage) -> Result<()> {
        self.send(MessageEventKind::Start(start))
    }

    /// End the message; open children are settled by the abandon policy
    pub fn end(&mut self, end: EndMessage) -> Result<()> {
        self.send(MessageEventKind::End(end))
    }

    pub fn meta(&mut self, meta: MetaEvent) -> Result<()> {
        self.send(MessageEventKind::Meta(meta))
    }

    pub fn start_error(&mut self, error_id: impl Into<String>, error: ErrorStart) -> Result<()> {
        self.send(MessageEventKind::Error(error_start(error_id.into(), error)))
    }

    pub fn end_error(&mut self, error_id: impl Into<String>) -> Result<()> {
        self.send(MessageEventKind::Error(ErrorEvent::end(error_id)))
    }

    pub fn content_part(&mut self, content_part_id: impl Into<String>) -> ContentPartEmitter<'_, T> {
        ContentPartEmitter {
            session: &mut *self.session,
            exchange_id: self.exchange_id.clone(),
            message_id: self.message_id.clone(),
            content_part_id: content_part_id.into(),
        }
    }

    pub fn tool_call(&mut self, tool_call_id: impl Into<String>) -> ToolCallEmitter<'_, T> {
        ToolCallEmitter {
            session: &mut *self.session,
            scope: ToolCallScope::Message {
                exchange_id: self.exchange_id.clone(),
                message_id: self.message_id.clone(),
            },
            tool_call_id: tool_call_id.into(),
        }
    }

    pub fn interrupt(&mut self, interrupt_id: impl Into<String>) -> InterruptEmitter<'_, T> {
        InterruptEmitter {
            session: &mut *self.session,
            exchange_id: self.exchange_id.clone(),
            message_id: self.message_id.clone(),
            interrupt_id: interrupt_id.into(),
        }
    }
}

fn send_message<T: Transport>(
    session: &mut Session<T>,
    exchange_id: &str,
    message_id: &str,
    kind: MessageEventKind,
) -> Result<()> {
    let message = MessageEvent::new(message_id, kind);
    let exchange = ExchangeEvent::new(exchange_id, ExchangeEventKind::Message(message));
    session.emit(ConversationEventKind::Exchange(exchange))
}

// ============================================================================
// Content part
// ============================================================================

pub struct ContentPartEmitter<'s, T: Transport> {
    session: &'s mut Session<T>,
    exchange_id: String,
    message_id: String,
    content_part_id: String,
}

impl<'s, T: Transport> ContentPartEmitter<'s, T> {
    pub fn id(&self) -> &str {
        &self.content_part_id
    }

    fn send(&mut self, kind: ContentPartEventKind) -> Result<()> {
        let part = ContentPartEvent::new(self.content_part_id.clone(), kind);
        send_message(
            self.session,
            &self.exchange_id,
            &self.message_id,
            MessageEventKind::ContentPart(part),
        )
    }

    pub fn start(&mut self, start: StartContentPart) -> Result<()> {
        self.send(ContentPartEventKind::Start(start))
    }

    pub fn chunk(&mut self, chunk: ContentPartChunk) -> Result<()> {
        self.send(ContentPartEventKind::Chunk(chunk))
    }

    /// Send a data-only chunk
    pub fn text(&mut self, data: impl Into<String>) -> Result<()> {
        self.chunk(ContentPartChunk::text(data))
    }

    /// Open a citation at the current end of the data
    pub fn open_citation(&mut self, citation_id: impl Into<String>) -> Result<()> {
        self.chunk(ContentPartChunk::marker(CitationMarker::open(citation_id)))
    }

    /// Close a citation over everything sent since it was opened
    pub fn close_citation(
        &mut self,
        citation_id: impl Into<String>,
        sources: Vec<CitationSource>,
    ) -> Result<()> {
        self.chunk(ContentPartChunk::marker(CitationMarker::close(citation_id, sources)))
    }

    /// Send `data` cited as a whole in one chunk
    pub fn cite(
        &mut self,
        data: impl Into<String>,
        citation_id: impl Into<String>,
        sources: Vec<CitationSource>,
    ) -> Result<()> {
        self.chunk(
            ContentPartChunk::text(data).with_citation(CitationMarker::atomic(citation_id, sources)),
        )
    }

    pub fn meta(&mut self, meta: MetaEvent) -> Result<()> {
        self.send(ContentPartEventKind::Meta(meta))
    }

    pub fn start_error(&mut self, error_id: impl Into<String>, error: ErrorStart) -> Result<()> {
        self.send(ContentPartEventKind::Error(error_start(error_id.into(), error)))
    }

    pub fn end_error(&mut self, error_id: impl Into<String>) -> Result<()> {
        self.send(ContentPartEventKind::Error(ErrorEvent::end(error_id)))
    }

    pub fn end(&mut self, end: EndContentPart) -> Result<()> {
        self.send(ContentPartEventKind::End(end))
    }
}

// ============================================================================
// Tool call
// ============================================================================

enum ToolCallScope {
    Message {
        exchange_id: String,
        message_id: String,
    },
    Session,
}

/// Emitter for a message-scoped or async tool call
pub struct ToolCallEmitter<'s, T: Transport> {
    session: &'s mut Session<T>,
    scope: ToolCallScope,
    tool_call_id: String,
}

impl<'s, T: Transport> ToolCallEmitter<'s, T> {
    pub(super) fn session_scoped(session: &'s mut Session<T>, tool_call_id: String) -> Self {
        Self {
            session,
            scope: ToolCallScope::Session,
            tool_call_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.tool_call_id
    }

    fn send(&mut self, kind: ToolCallEventKind) -> Result<()> {
        let call = ToolCallEvent::new(self.tool_call_id.clone(), kind);
        match &self.scope {
            ToolCallScope::Message {
                exchange_id,
                message_id,
            } => send_message(
                self.session,
                exchange_id,
                message_id,
                MessageEventKind::ToolCall(call),
            ),
            ToolCallScope::Session => self.session.emit(ConversationEventKind::AsyncToolCall(call)),
        }
    }

    pub fn start(&mut self, start: StartToolCall) -> Result<()> {
        self.send(ToolCallEventKind::Start(start))
    }

    pub fn end(&mut self, end: EndToolCall) -> Result<()> {
        self.send(ToolCallEventKind::End(end))
    }

    pub fn meta(&mut self, meta: MetaEvent) -> Result<()> {
        self.send(ToolCallEventKind::Meta(meta))
    }

    pub fn start_error(&mut self, error_id: impl Into<String>, error: ErrorStart) -> Result<()> {
        self.send(ToolCallEventKind::Error(error_start(error_id.into(), error)))
    }

    pub fn end_error(&mut self, error_id: impl Into<String>) -> Result<()> {
        self.send(ToolCallEventKind::Error(ErrorEvent::end(error_id)))
    }
}

// ============================================================================
// Interrupt
// ============================================================================

pub struct InterruptEmitter<'s, T: Transport> {
    session: &'s mut Session<T>,
    exchange_id: String,
    message_id: String,
    interrupt_id: String,
}

impl<'s, T: Transport> InterruptEmitter<'s, T> {
    pub fn id(&self) -> &str {
        &self.interrupt_id
    }

    fn send(&mut self, kind: InterruptEventKind) -> Result<()> {
        let interrupt = InterruptEvent {
            interrupt_id: self.interrupt_id.clone(),
            kind,
        };
        send_message(
            self.session,
            &self.exchange_id,
            &self.message_id,
            MessageEventKind::Interrupt(interrupt),
        )
    }

    /// Pause the message for external input
    pub fn start(&mut self, start: StartInterrupt) -> Result<()> {
        self.send(InterruptEventKind::Start(start))
    }

    /// Resolve the interrupt with the application's answer
    pub fn end(&mut self, end: EndInterrupt) -> Result<()> {
        self.send(InterruptEventKind::End(end))
    }
}

// ============================================================================
// Async input stream
// ============================================================================

pub struct InputStreamEmitter<'s, T: Transport> {
    session: &'s mut Session<T>,
    stream_id: String,
}

impl<'s, T: Transport> InputStreamEmitter<'s, T> {
    pub(super) fn new(session: &'s mut Session<T>, stream_id: String) -> Self {
        Self { session, stream_id }
    }

    pub fn id(&self) -> &str {
        &self.stream_id
    }

    fn send(&mut self, kind: AsyncInputStreamEventKind) -> Result<()> {
        let stream = AsyncInputStreamEvent::new(self.stream_id.clone(), kind);
        self.session.emit(ConversationEventKind::AsyncInputStream(stream))
    }

    pub fn start(&mut self, start: StartAsyncInputStream) -> Result<()> {
        self.send(AsyncInputStreamEventKind::Start(start))
    }

    /// Send one chunk of encoded data (e.g. base64 audio)
    pub fn chunk(&mut self, data: impl Into<String>) -> Result<()> {
        self.send(AsyncInputStreamEventKind::Chunk(AsyncInputStreamChunk {
            data: data.into(),
        }))
    }

    pub fn meta(&mut self, meta: MetaEvent) -> Result<()> {
        self.send(AsyncInputStreamEventKind::Meta(meta))
    }

    pub fn start_error(&mut self, error_id: impl Into<String>, error: ErrorStart) -> Result<()> {
        self.send(AsyncInputStreamEventKind::Error(error_start(error_id.into(), error)))
    }

    pub fn end_error(&mut self, error_id: impl Into<String>) -> Result<()> {
        self.send(AsyncInputStreamEventKind::Error(ErrorEvent::end(error_id)))
    }

    pub fn end(&mut self, end: EndAsyncInputStream) -> Result<()> {
        self.send(AsyncInputStreamEventKind::End(end))
    }
}
