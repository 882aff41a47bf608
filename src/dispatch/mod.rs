//! Envelope dispatcher
//!
//! Routes one envelope down the entity tree and applies it to the
//! registry:
//!
//! - session-level payloads go to the session entry
//! - `exchange` routes by `exchangeId`, then into the exchange's message,
//!   then into the message's content part, tool call or interrupt
//! - `asyncToolCall` and `asyncInputStream` route against session-owned
//!   maps, so they can outlive any exchange
//!
//! Error events are delivered in any phase and never touch lifecycles.
//! Unknown payloads are inert. Every applied change is recorded in a
//! [`Sink`] as [`SessionEvent`]s for the session to deliver.
//!
//! Local events are checked before anything is mutated, so a rejected
//! local event leaves the registry untouched. Remote events are applied
//! leniently: a premature end still ends the entity and reports the
//! violation afterwards.

use std::collections::HashMap;

use chrono::Duration;
use tracing::{debug, trace};

use crate::aggregate::{CompletedExchange, CompletedMessage, CompletedRecord, CompletedToolCall};
use crate::config::AbandonPolicy;
use crate::error::{ProtocolViolation, ViolationKind};
use crate::events::*;
use crate::ids;
use crate::observer::{Origin, SessionEvent, SessionEventKind};
use crate::registry::{
    ContentPartEntry, EntityRef, EntityRegistry, ErrorLedger, ExchangeEntry, InputStreamEntry,
    InterruptEntry, MessageEntry, ToolCallEntry,
};
use crate::state::Lifecycle;

type Outcome = Result<(), ProtocolViolation>;

/// Notifications produced while applying one envelope
#[derive(Debug)]
pub(crate) struct Sink {
    origin: Origin,
    policy: AbandonPolicy,
    pub(crate) events: Vec<SessionEvent>,
}

impl Sink {
    pub(crate) fn new(origin: Origin, policy: AbandonPolicy) -> Self {
        Self {
            origin,
            policy,
            events: Vec::new(),
        }
    }

    fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }

    fn push(&mut self, entity: EntityRef, kind: SessionEventKind) {
        self.events.push(SessionEvent {
            entity,
            kind,
            origin: self.origin,
        });
    }

    fn completed(&mut self, entity: EntityRef, record: CompletedRecord) {
        self.push(entity, SessionEventKind::Completed(record));
    }
}

fn violation(entity: &EntityRef, kind: ViolationKind) -> ProtocolViolation {
    ProtocolViolation::new(entity.clone(), kind)
}

/// The entity an envelope addresses and the class of its innermost payload
#[derive(Debug, Clone, PartialEq)]
pub struct Located<'a> {
    pub entity: EntityRef,
    pub class: EventClass,
    /// The innermost payload, when it is an error event
    pub error: Option<&'a ErrorEvent>,
}

impl<'a> Located<'a> {
    fn leaf(entity: EntityRef, class: EventClass, error: Option<&'a ErrorEvent>) -> Self {
        let class = match error {
            Some(error) if error.class() == EventClass::Unknown => EventClass::Unknown,
            _ => class,
        };
        Self {
            entity,
            class,
            error,
        }
    }
}

/// Walk an envelope down to its innermost payload
pub fn locate(event: &ConversationEvent) -> Located<'_> {
    match &event.kind {
        ConversationEventKind::Exchange(exchange) => locate_exchange(exchange),
        ConversationEventKind::AsyncToolCall(call) => Located::leaf(
            EntityRef::async_tool_call(&call.tool_call_id),
            call.class(),
            match &call.kind {
                ToolCallEventKind::Error(e) => Some(e),
                _ => None,
            },
        ),
        ConversationEventKind::AsyncInputStream(stream) => Located::leaf(
            EntityRef::async_input_stream(&stream.stream_id),
            stream.class(),
            match &stream.kind {
                AsyncInputStreamEventKind::Error(e) => Some(e),
                _ => None,
            },
        ),
        ConversationEventKind::Error(e) => Located::leaf(EntityRef::Session, EventClass::Error, Some(e)),
        _ => Located::leaf(EntityRef::Session, event.class(), None),
    }
}

fn locate_exchange(exchange: &ExchangeEvent) -> Located<'_> {
    let exchange_id = &exchange.exchange_id;
    let ExchangeEventKind::Message(message) = &exchange.kind else {
        let error = match &exchange.kind {
            ExchangeEventKind::Error(e) => Some(e),
            _ => None,
        };
        return Located::leaf(EntityRef::exchange(exchange_id), exchange.class(), error);
    };
    let message_id = &message.message_id;
    match &message.kind {
        MessageEventKind::ContentPart(part) => Located::leaf(
            EntityRef::content_part(exchange_id, message_id, &part.content_part_id),
            part.class(),
            match &part.kind {
                ContentPartEventKind::Error(e) => Some(e),
                _ => None,
            },
        ),
        MessageEventKind::ToolCall(call) => Located::leaf(
            EntityRef::tool_call(exchange_id, message_id, &call.tool_call_id),
            call.class(),
            match &call.kind {
                ToolCallEventKind::Error(e) => Some(e),
                _ => None,
            },
        ),
        MessageEventKind::Interrupt(interrupt) => Located::leaf(
            EntityRef::interrupt(exchange_id, message_id, &interrupt.interrupt_id),
            interrupt.class(),
            None,
        ),
        MessageEventKind::Error(e) => Located::leaf(
            EntityRef::message(exchange_id, message_id),
            EventClass::Error,
            Some(e),
        ),
        _ => Located::leaf(
            EntityRef::message(exchange_id, message_id),
            message.class(),
            None,
        ),
    }
}

/// Apply one envelope to the registry
pub(crate) fn dispatch(
    registry: &mut EntityRegistry,
    event: &ConversationEvent,
    sink: &mut Sink,
) -> Outcome {
    let located = locate(event);
    if located.class == EventClass::Unknown {
        trace!(entity = %located.entity, "ignoring unrecognized payload");
        return Ok(());
    }
    if let Some(error) = located.error {
        record_error(&mut registry.errors, located.entity, error, sink);
        return Ok(());
    }

    match &event.kind {
        ConversationEventKind::StartSession(start) => session_requested(registry, start, sink),
        ConversationEventKind::SessionStarted(started) => session_started(registry, started, sink),
        ConversationEventKind::SessionEnding(ending) => {
            let ttl = i64::try_from(ending.time_to_live_ms).unwrap_or(i64::MAX);
            debug!(ttl_ms = ending.time_to_live_ms, "session ending announced");
            registry.session.ending = Some(ending.clone());
            registry.session.ending_deadline =
                ids::now().checked_add_signed(Duration::milliseconds(ttl));
            sink.push(EntityRef::Session, SessionEventKind::SessionEnding(ending.clone()));
            Ok(())
        }
        ConversationEventKind::EndSession(end) => end_session(registry, end, sink),
        ConversationEventKind::LabelUpdated(label) => {
            registry.session.label = Some(label.clone());
            sink.push(EntityRef::Session, SessionEventKind::LabelUpdated(label.clone()));
            Ok(())
        }
        ConversationEventKind::Meta(meta) => {
            sink.push(EntityRef::Session, SessionEventKind::Meta(meta.clone()));
            Ok(())
        }
        ConversationEventKind::Exchange(exchange) => route_exchange(registry, exchange, sink),
        ConversationEventKind::AsyncToolCall(call) => {
            let entity = EntityRef::async_tool_call(&call.tool_call_id);
            let ended = registry
                .completed_async_tool_calls
                .contains_key(&call.tool_call_id);
            let seq = registry.next_seq();
            let completed = &mut registry.completed_async_tool_calls;
            route_tool_call(
                &mut registry.async_tool_calls,
                ended,
                entity,
                seq,
                call,
                sink,
                |_, record| {
                    completed.insert(record.tool_call_id.clone(), record);
                },
            )
        }
        ConversationEventKind::AsyncInputStream(stream) => route_input_stream(registry, stream, sink),
        // Located above
        ConversationEventKind::Error(_) | ConversationEventKind::Unknown => Ok(()),
    }
}

fn record_error(ledger: &mut ErrorLedger, entity: EntityRef, error: &ErrorEvent, sink: &mut Sink) {
    let error_id = error.error_id.clone();
    match &error.kind {
        ErrorEventKind::Start(start) => {
            debug!(entity = %entity, error_id = %error_id, message = %start.message, "error raised");
            ledger.raise(&entity, &error_id, start.clone());
            sink.push(
                entity,
                SessionEventKind::ErrorStarted {
                    error_id,
                    error: start.clone(),
                },
            );
        }
        ErrorEventKind::End(_) => {
            let error = ledger.clear(&entity, &error_id);
            if error.is_none() {
                debug!(entity = %entity, error_id = %error_id, "error cleared without a start");
            }
            sink.push(entity, SessionEventKind::ErrorEnded { error_id, error });
        }
        ErrorEventKind::Unknown => {}
    }
}

// ============================================================================
// Session
// ============================================================================

fn session_requested(registry: &mut EntityRegistry, start: &StartSession, sink: &mut Sink) -> Outcome {
    let session = &mut registry.session;
    if session.requested.is_some() {
        return Err(violation(&EntityRef::Session, ViolationKind::DuplicateStart));
    }
    session.requested = Some(start.clone());
    match sink.origin {
        Origin::Local => session.local_capabilities = start.capabilities.clone(),
        _ => session.peer_capabilities = start.capabilities.clone(),
    }
    debug!("session start requested");
    sink.push(EntityRef::Session, SessionEventKind::SessionStartRequested(start.clone()));
    Ok(())
}

fn session_started(registry: &mut EntityRegistry, started: &SessionStarted, sink: &mut Sink) -> Outcome {
    let session = &mut registry.session;
    session
        .lifecycle
        .start(started.clone())
        .map_err(|kind| violation(&EntityRef::Session, kind))?;
    match sink.origin {
        Origin::Local => session.local_capabilities = started.capabilities.clone(),
        _ => session.peer_capabilities = started.capabilities.clone(),
    }
    debug!("session started");
    sink.push(EntityRef::Session, SessionEventKind::SessionStarted(started.clone()));
    Ok(())
}

fn end_session(registry: &mut EntityRegistry, end: &EndSession, sink: &mut Sink) -> Outcome {
    let entity = EntityRef::Session;
    if sink.is_local() {
        registry
            .session
            .lifecycle
            .check_end()
            .map_err(|kind| violation(&entity, kind))?;
    }
    let outcome = registry.session.lifecycle.end(end.clone());
    if outcome == Err(ViolationKind::EventAfterEnd) {
        return Err(violation(&entity, ViolationKind::EventAfterEnd));
    }

    for exchange in drain_in_creation_order(&mut registry.exchanges, |e| e.seq) {
        let exchange_id = exchange.lifecycle.entity().id().to_string();
        match abandon_exchange(exchange, sink) {
            Some(record) => registry.retain_exchange(record),
            None => {
                registry.ended_exchanges.insert(exchange_id);
            }
        }
    }
    for mut call in drain_in_creation_order(&mut registry.async_tool_calls, |c| c.seq) {
        if abandon(&mut call.lifecycle, sink) {
            let entity = call.lifecycle.entity().clone();
            let record = call.into_record();
            sink.completed(entity, CompletedRecord::ToolCall(record.clone()));
            registry
                .completed_async_tool_calls
                .insert(record.tool_call_id.clone(), record);
        }
    }
    for mut stream in drain_in_creation_order(&mut registry.input_streams, |s| s.seq) {
        if abandon(&mut stream.lifecycle, sink) {
            let entity = stream.lifecycle.entity().clone();
            let record = stream.into_record();
            sink.completed(entity, CompletedRecord::InputStream(record.clone()));
            registry
                .completed_input_streams
                .insert(record.stream_id.clone(), record);
        }
    }

    debug!("session ended");
    sink.push(entity.clone(), SessionEventKind::SessionEnded(end.clone()));
    outcome.map_err(|kind| violation(&entity, kind))
}

// ============================================================================
// Exchange
// ============================================================================

fn route_exchange(registry: &mut EntityRegistry, event: &ExchangeEvent, sink: &mut Sink) -> Outcome {
    let id = &event.exchange_id;
    let entity = EntityRef::exchange(id);
    let ended = registry.ended_exchanges.contains(id);

    match &event.kind {
        ExchangeEventKind::Start(start) => {
            if ended || registry.exchanges.contains_key(id) {
                return Err(violation(&entity, ViolationKind::DuplicateStart));
            }
            let mut entry = ExchangeEntry::new(entity.clone(), registry.next_seq());
            entry
                .lifecycle
                .start(start.clone())
                .map_err(|kind| violation(&entity, kind))?;
            registry.exchanges.insert(id.clone(), entry);
            debug!(entity = %entity, "exchange started");
            sink.push(entity, SessionEventKind::ExchangeStarted(start.clone()));
            Ok(())
        }
        ExchangeEventKind::End(end) => {
            let mut entry = match registry.exchanges.remove(id) {
                Some(entry) => entry,
                None if ended => return Err(violation(&entity, ViolationKind::EventAfterEnd)),
                None if sink.is_local() => {
                    return Err(violation(&entity, ViolationKind::PrematureEnd))
                }
                None => ExchangeEntry::new(entity.clone(), registry.next_seq()),
            };
            let outcome = entry.lifecycle.end(end.clone());
            debug!(entity = %entity, "exchange ended");
            sink.push(entity.clone(), SessionEventKind::ExchangeEnded(end.clone()));
            settle_exchange_children(&mut entry, sink);
            let record = entry.into_record();
            sink.completed(entity.clone(), CompletedRecord::Exchange(record.clone()));
            registry.retain_exchange(record);
            outcome.map_err(|kind| violation(&entity, kind))
        }
        ExchangeEventKind::Message(message) => {
            let exchange = active(registry.exchanges.get_mut(id), ended, &entity)?;
            route_message(exchange, id, message, sink)
        }
        ExchangeEventKind::Meta(meta) => {
            active(registry.exchanges.get_mut(id), ended, &entity)?;
            sink.push(entity, SessionEventKind::Meta(meta.clone()));
            Ok(())
        }
        // Located before routing
        ExchangeEventKind::Error(_) | ExchangeEventKind::Unknown => Ok(()),
    }
}

/// Entities that hold a lifecycle
trait Live {
    fn ensure_active(&self) -> Result<(), ViolationKind>;
}

macro_rules! impl_live {
    ($($entry:ty),*) => {
        $(impl Live for $entry {
            fn ensure_active(&self) -> Result<(), ViolationKind> {
                self.lifecycle.ensure_active()
            }
        })*
    };
}

impl_live!(
    ExchangeEntry,
    MessageEntry,
    ContentPartEntry,
    ToolCallEntry,
    InterruptEntry,
    InputStreamEntry
);

/// The live entry, if it accepts chunk, meta and child events
fn active<'a, T: Live>(
    entry: Option<&'a mut T>,
    ended: bool,
    entity: &EntityRef,
) -> Result<&'a mut T, ProtocolViolation> {
    match entry {
        Some(entry) => {
            entry
                .ensure_active()
                .map_err(|kind| violation(entity, kind))?;
            Ok(entry)
        }
        None if ended => Err(violation(entity, ViolationKind::EventAfterEnd)),
        None => Err(violation(entity, ViolationKind::NotActive)),
    }
}

// ============================================================================
// Message
// ============================================================================

fn route_message(
    exchange: &mut ExchangeEntry,
    exchange_id: &str,
    event: &MessageEvent,
    sink: &mut Sink,
) -> Outcome {
    let id = &event.message_id;
    let entity = EntityRef::message(exchange_id, id);
    let ended = exchange.completed_message(id).is_some();

    match &event.kind {
        MessageEventKind::Start(start) => {
            if ended || exchange.messages.contains_key(id) {
                return Err(violation(&entity, ViolationKind::DuplicateStart));
            }
            let mut entry = MessageEntry::new(entity.clone(), exchange.next_seq());
            entry
                .lifecycle
                .start(start.clone())
                .map_err(|kind| violation(&entity, kind))?;
            exchange.messages.insert(id.clone(), entry);
            debug!(entity = %entity, role = %start.role, "message started");
            sink.push(entity, SessionEventKind::MessageStarted(start.clone()));
            Ok(())
        }
        MessageEventKind::End(end) => {
            let mut entry = match exchange.messages.remove(id) {
                Some(entry) => entry,
                None if ended => return Err(violation(&entity, ViolationKind::EventAfterEnd)),
                None if sink.is_local() => {
                    return Err(violation(&entity, ViolationKind::PrematureEnd))
                }
                None => MessageEntry::new(entity.clone(), exchange.next_seq()),
            };
            let outcome = entry.lifecycle.end(end.clone());
            debug!(entity = %entity, "message ended");
            sink.push(entity.clone(), SessionEventKind::MessageEnded(end.clone()));
            settle_message_children(&mut entry, sink);
            let seq = entry.seq;
            let record = entry.into_record();
            sink.completed(entity.clone(), CompletedRecord::Message(record.clone()));
            exchange.completed_messages.push((seq, record));
            outcome.map_err(|kind| violation(&entity, kind))
        }
        MessageEventKind::ContentPart(part) => {
            let message = active(exchange.messages.get_mut(id), ended, &entity)?;
            route_content_part(message, exchange_id, id, part, sink)
        }
        MessageEventKind::ToolCall(call) => {
            let message = active(exchange.messages.get_mut(id), ended, &entity)?;
            let entity = EntityRef::tool_call(exchange_id, id, &call.tool_call_id);
            let ended = message.completed.tool_call(&call.tool_call_id).is_some();
            let seq = message.next_seq();
            let completed = &mut message.completed;
            route_tool_call(
                &mut message.tool_calls,
                ended,
                entity,
                seq,
                call,
                sink,
                |seq, record| completed.add_tool_call(seq, record),
            )
        }
        MessageEventKind::Interrupt(interrupt) => {
            let message = active(exchange.messages.get_mut(id), ended, &entity)?;
            route_interrupt(message, exchange_id, id, interrupt, sink)
        }
        MessageEventKind::Meta(meta) => {
            active(exchange.messages.get_mut(id), ended, &entity)?;
            sink.push(entity, SessionEventKind::Meta(meta.clone()));
            Ok(())
        }
        // Located before routing
        MessageEventKind::Error(_) | MessageEventKind::Unknown => Ok(()),
    }
}

// ============================================================================
// Message children
// ============================================================================

fn route_content_part(
    message: &mut MessageEntry,
    exchange_id: &str,
    message_id: &str,
    event: &ContentPartEvent,
    sink: &mut Sink,
) -> Outcome {
    let id = &event.content_part_id;
    let entity = EntityRef::content_part(exchange_id, message_id, id);
    let ended = message.completed.content_part(id).is_some();

    match &event.kind {
        ContentPartEventKind::Start(start) => {
            if ended || message.content_parts.contains_key(id) {
                return Err(violation(&entity, ViolationKind::DuplicateStart));
            }
            let mut entry = ContentPartEntry::new(entity.clone(), message.next_seq());
            entry
                .lifecycle
                .start(start.clone())
                .map_err(|kind| violation(&entity, kind))?;
            message.content_parts.insert(id.clone(), entry);
            debug!(entity = %entity, mime_type = %start.mime_type, "content part started");
            sink.push(entity, SessionEventKind::ContentPartStarted(start.clone()));
            Ok(())
        }
        ContentPartEventKind::Chunk(chunk) => {
            let part = active(message.content_parts.get_mut(id), ended, &entity)?;
            part.aggregator.process_chunk(chunk);
            sink.push(entity, SessionEventKind::ContentPartChunk(chunk.clone()));
            Ok(())
        }
        ContentPartEventKind::Meta(meta) => {
            active(message.content_parts.get_mut(id), ended, &entity)?;
            sink.push(entity, SessionEventKind::Meta(meta.clone()));
            Ok(())
        }
        ContentPartEventKind::End(end) => {
            let mut entry = match message.content_parts.remove(id) {
                Some(entry) => entry,
                None if ended => return Err(violation(&entity, ViolationKind::EventAfterEnd)),
                None if sink.is_local() => {
                    return Err(violation(&entity, ViolationKind::PrematureEnd))
                }
                None => ContentPartEntry::new(entity.clone(), message.next_seq()),
            };
            let outcome = entry.lifecycle.end(end.clone());
            debug!(entity = %entity, "content part ended");
            sink.push(entity.clone(), SessionEventKind::ContentPartEnded(end.clone()));
            let seq = entry.seq;
            let record = entry.into_record();
            sink.completed(entity.clone(), CompletedRecord::ContentPart(record.clone()));
            message.completed.add_content_part(seq, record);
            outcome.map_err(|kind| violation(&entity, kind))
        }
        // Located before routing
        ContentPartEventKind::Error(_) | ContentPartEventKind::Unknown => Ok(()),
    }
}

/// Shared by message-scoped and async tool calls; `store` keeps the
/// completed record with the owner.
fn route_tool_call(
    calls: &mut HashMap<String, ToolCallEntry>,
    ended: bool,
    entity: EntityRef,
    seq: u64,
    event: &ToolCallEvent,
    sink: &mut Sink,
    store: impl FnOnce(u64, CompletedToolCall),
) -> Outcome {
    let id = &event.tool_call_id;
    match &event.kind {
        ToolCallEventKind::Start(start) => {
            if ended || calls.contains_key(id) {
                return Err(violation(&entity, ViolationKind::DuplicateStart));
            }
            let mut entry = ToolCallEntry::new(entity.clone(), seq);
            entry
                .lifecycle
                .start(start.clone())
                .map_err(|kind| violation(&entity, kind))?;
            calls.insert(id.clone(), entry);
            debug!(entity = %entity, tool_name = %start.tool_name, "tool call started");
            sink.push(entity, SessionEventKind::ToolCallStarted(start.clone()));
            Ok(())
        }
        ToolCallEventKind::Meta(meta) => {
            active(calls.get_mut(id), ended, &entity)?;
            sink.push(entity, SessionEventKind::Meta(meta.clone()));
            Ok(())
        }
        ToolCallEventKind::End(end) => {
            let mut entry = match calls.remove(id) {
                Some(entry) => entry,
                None if ended => return Err(violation(&entity, ViolationKind::EventAfterEnd)),
                None if sink.is_local() => {
                    return Err(violation(&entity, ViolationKind::PrematureEnd))
                }
                None => ToolCallEntry::new(entity.clone(), seq),
            };
            let outcome = entry.lifecycle.end(end.clone());
            debug!(entity = %entity, "tool call ended");
            sink.push(entity.clone(), SessionEventKind::ToolCallEnded(end.clone()));
            let seq = entry.seq;
            let record = entry.into_record();
            sink.completed(entity.clone(), CompletedRecord::ToolCall(record.clone()));
            store(seq, record);
            outcome.map_err(|kind| violation(&entity, kind))
        }
        // Located before routing
        ToolCallEventKind::Error(_) | ToolCallEventKind::Unknown => Ok(()),
    }
}

fn route_interrupt(
    message: &mut MessageEntry,
    exchange_id: &str,
    message_id: &str,
    event: &InterruptEvent,
    sink: &mut Sink,
) -> Outcome {
    let id = &event.interrupt_id;
    let entity = EntityRef::interrupt(exchange_id, message_id, id);
    let ended = message.completed.interrupt(id).is_some();

    match &event.kind {
        InterruptEventKind::Start(start) => {
            if ended || message.interrupts.contains_key(id) {
                return Err(violation(&entity, ViolationKind::DuplicateStart));
            }
            let mut entry = InterruptEntry::new(entity.clone(), message.next_seq());
            entry
                .lifecycle
                .start(start.clone())
                .map_err(|kind| violation(&entity, kind))?;
            message.interrupts.insert(id.clone(), entry);
            debug!(entity = %entity, interrupt_type = %start.interrupt_type, "interrupt started");
            sink.push(entity, SessionEventKind::InterruptStarted(start.clone()));
            Ok(())
        }
        InterruptEventKind::End(end) => {
            let mut entry = match message.interrupts.remove(id) {
                Some(entry) => entry,
                None if ended => return Err(violation(&entity, ViolationKind::EventAfterEnd)),
                None if sink.is_local() => {
                    return Err(violation(&entity, ViolationKind::PrematureEnd))
                }
                None => InterruptEntry::new(entity.clone(), message.next_seq()),
            };
            let outcome = entry.lifecycle.end(end.clone());
            debug!(entity = %entity, "interrupt resolved");
            sink.push(entity.clone(), SessionEventKind::InterruptEnded(end.clone()));
            let seq = entry.seq;
            let record = entry.into_record();
            sink.completed(entity.clone(), CompletedRecord::Interrupt(record.clone()));
            message.completed.add_interrupt(seq, record);
            outcome.map_err(|kind| violation(&entity, kind))
        }
        InterruptEventKind::Unknown => Ok(()),
    }
}

// ============================================================================
// Async input stream
// ============================================================================

fn route_input_stream(
    registry: &mut EntityRegistry,
    event: &AsyncInputStreamEvent,
    sink: &mut Sink,
) -> Outcome {
    let id = &event.stream_id;
    let entity = EntityRef::async_input_stream(id);
    let ended = registry.completed_input_streams.contains_key(id);

    match &event.kind {
        AsyncInputStreamEventKind::Start(start) => {
            if ended || registry.input_streams.contains_key(id) {
                return Err(violation(&entity, ViolationKind::DuplicateStart));
            }
            let mut entry = InputStreamEntry::new(entity.clone(), registry.next_seq());
            entry
                .lifecycle
                .start(start.clone())
                .map_err(|kind| violation(&entity, kind))?;
            registry.input_streams.insert(id.clone(), entry);
            debug!(entity = %entity, mime_type = %start.mime_type, "input stream started");
            sink.push(entity, SessionEventKind::InputStreamStarted(start.clone()));
            Ok(())
        }
        AsyncInputStreamEventKind::Chunk(chunk) => {
            let stream = active(registry.input_streams.get_mut(id), ended, &entity)?;
            stream.chunk_count += 1;
            stream.byte_count += chunk.data.len();
            trace!(entity = %entity, bytes = chunk.data.len(), "input stream chunk");
            sink.push(entity, SessionEventKind::InputStreamChunk(chunk.clone()));
            Ok(())
        }
        AsyncInputStreamEventKind::Meta(meta) => {
            active(registry.input_streams.get_mut(id), ended, &entity)?;
            sink.push(entity, SessionEventKind::Meta(meta.clone()));
            Ok(())
        }
        AsyncInputStreamEventKind::End(end) => {
            let mut entry = match registry.input_streams.remove(id) {
                Some(entry) => entry,
                None if ended => return Err(violation(&entity, ViolationKind::EventAfterEnd)),
                None if sink.is_local() => {
                    return Err(violation(&entity, ViolationKind::PrematureEnd))
                }
                None => InputStreamEntry::new(entity.clone(), registry.next_seq()),
            };
            let outcome = entry.lifecycle.end(end.clone());
            debug!(entity = %entity, chunks = entry.chunk_count, "input stream ended");
            sink.push(entity.clone(), SessionEventKind::InputStreamEnded(end.clone()));
            let record = entry.into_record();
            sink.completed(entity.clone(), CompletedRecord::InputStream(record.clone()));
            registry
                .completed_input_streams
                .insert(record.stream_id.clone(), record);
            outcome.map_err(|kind| violation(&entity, kind))
        }
        // Located before routing
        AsyncInputStreamEventKind::Error(_) | AsyncInputStreamEventKind::Unknown => Ok(()),
    }
}

// ============================================================================
// Abandoned descendants
// ============================================================================

/// Apply the abandon policy to one lifecycle. Returns true if the entity
/// should still be completed.
fn abandon<S, E>(lifecycle: &mut Lifecycle<S, E>, sink: &Sink) -> bool {
    match sink.policy {
        AbandonPolicy::SyntheticEnd => {
            lifecycle.abandon();
            debug!(entity = %lifecycle.entity(), "abandoned, completing abnormally");
            true
        }
        AbandonPolicy::Drop => {
            debug!(entity = %lifecycle.entity(), "abandoned, dropping");
            false
        }
    }
}

fn drain_in_creation_order<T>(map: &mut HashMap<String, T>, seq: impl Fn(&T) -> u64) -> Vec<T> {
    let mut entries: Vec<T> = map.drain().map(|(_, entry)| entry).collect();
    entries.sort_by_key(|entry| seq(entry));
    entries
}

/// Complete or drop every child still open when a message ends
fn settle_message_children(message: &mut MessageEntry, sink: &mut Sink) {
    for mut part in drain_in_creation_order(&mut message.content_parts, |p| p.seq) {
        if abandon(&mut part.lifecycle, sink) {
            let entity = part.lifecycle.entity().clone();
            let seq = part.seq;
            let record = part.into_record();
            sink.completed(entity, CompletedRecord::ContentPart(record.clone()));
            message.completed.add_content_part(seq, record);
        }
    }
    for mut call in drain_in_creation_order(&mut message.tool_calls, |c| c.seq) {
        if abandon(&mut call.lifecycle, sink) {
            let entity = call.lifecycle.entity().clone();
            let seq = call.seq;
            let record = call.into_record();
            sink.completed(entity, CompletedRecord::ToolCall(record.clone()));
            message.completed.add_tool_call(seq, record);
        }
    }
    for mut interrupt in drain_in_creation_order(&mut message.interrupts, |i| i.seq) {
        if abandon(&mut interrupt.lifecycle, sink) {
            let entity = interrupt.lifecycle.entity().clone();
            let seq = interrupt.seq;
            let record = interrupt.into_record();
            sink.completed(entity, CompletedRecord::Interrupt(record.clone()));
            message.completed.add_interrupt(seq, record);
        }
    }
}

fn abandon_message(mut message: MessageEntry, sink: &mut Sink) -> Option<(u64, CompletedMessage)> {
    if !abandon(&mut message.lifecycle, sink) {
        return None;
    }
    settle_message_children(&mut message, sink);
    let entity = message.lifecycle.entity().clone();
    let seq = message.seq;
    let record = message.into_record();
    sink.completed(entity, CompletedRecord::Message(record.clone()));
    Some((seq, record))
}

fn settle_exchange_children(exchange: &mut ExchangeEntry, sink: &mut Sink) {
    for message in drain_in_creation_order(&mut exchange.messages, |m| m.seq) {
        if let Some(completed) = abandon_message(message, sink) {
            exchange.completed_messages.push(completed);
        }
    }
}

fn abandon_exchange(mut exchange: ExchangeEntry, sink: &mut Sink) -> Option<CompletedExchange> {
    if !abandon(&mut exchange.lifecycle, sink) {
        return None;
    }
    settle_exchange_children(&mut exchange, sink);
    let entity = exchange.lifecycle.entity().clone();
    let record = exchange.into_record();
    sink.completed(entity, CompletedRecord::Exchange(record.clone()));
    Some(record)
}
