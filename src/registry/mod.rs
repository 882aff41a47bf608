//! Entity registry
//!
//! Per-session maps from entity id to live state. Entities are created on
//! their first start (or, inbound, on a premature end) and removed from the
//! live maps when they end; their completed records are kept so late
//! lookups and `on_complete` registrations still see them. Exchange records
//! can be capped with `maxRetainedExchanges`; ended exchange ids are always
//! remembered so stray events for them are reported as `EventAfterEnd`.

mod entity;

pub use entity::{EntityKind, EntityRef};

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::aggregate::{
    CompletedContentPart, CompletedExchange, CompletedInputStream, CompletedInterrupt,
    CompletedMessage, CompletedRecord, CompletedToolCall, ContentAggregator, MessageAggregator,
};
use crate::events::{
    EndAsyncInputStream, EndContentPart, EndExchange, EndInterrupt, EndMessage, EndSession,
    EndToolCall, ErrorStart, LabelUpdated, SessionCapabilities, SessionEnding, SessionStarted,
    StartAsyncInputStream, StartContentPart, StartExchange, StartInterrupt, StartMessage,
    StartSession, StartToolCall,
};
use crate::state::{Lifecycle, Phase};

// ============================================================================
// Entries
// ============================================================================

/// Session-level state
#[derive(Debug)]
pub struct SessionEntry {
    pub(crate) lifecycle: Lifecycle<SessionStarted, EndSession>,
    pub(crate) requested: Option<StartSession>,
    pub(crate) local_capabilities: Option<SessionCapabilities>,
    pub(crate) peer_capabilities: Option<SessionCapabilities>,
    pub(crate) label: Option<LabelUpdated>,
    pub(crate) ending: Option<SessionEnding>,
    pub(crate) ending_deadline: Option<DateTime<Utc>>,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(EntityRef::Session),
            requested: None,
            local_capabilities: None,
            peer_capabilities: None,
            label: None,
            ending: None,
            ending_deadline: None,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle<SessionStarted, EndSession> {
        &self.lifecycle
    }

    /// The `startSession` that opened the session, from either side
    pub fn requested(&self) -> Option<&StartSession> {
        self.requested.as_ref()
    }

    pub fn label(&self) -> Option<&LabelUpdated> {
        self.label.as_ref()
    }

    pub fn local_capabilities(&self) -> Option<&SessionCapabilities> {
        self.local_capabilities.as_ref()
    }

    pub fn peer_capabilities(&self) -> Option<&SessionCapabilities> {
        self.peer_capabilities.as_ref()
    }

    /// Last `sessionEnding` announcement
    pub fn ending(&self) -> Option<&SessionEnding> {
        self.ending.as_ref()
    }

    /// When the transport may be force-closed, from the last announcement
    pub fn ending_deadline(&self) -> Option<DateTime<Utc>> {
        self.ending_deadline
    }
}

#[derive(Debug)]
pub struct ExchangeEntry {
    pub(crate) seq: u64,
    pub(crate) lifecycle: Lifecycle<StartExchange, EndExchange>,
    next_seq: u64,
    pub(crate) messages: HashMap<String, MessageEntry>,
    pub(crate) completed_messages: Vec<(u64, CompletedMessage)>,
}

impl ExchangeEntry {
    pub(crate) fn new(entity: EntityRef, seq: u64) -> Self {
        Self {
            seq,
            lifecycle: Lifecycle::new(entity),
            next_seq: 0,
            messages: HashMap::new(),
            completed_messages: Vec::new(),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle<StartExchange, EndExchange> {
        &self.lifecycle
    }

    /// Live message
    pub fn message(&self, message_id: &str) -> Option<&MessageEntry> {
        self.messages.get(message_id)
    }

    pub fn completed_message(&self, message_id: &str) -> Option<&CompletedMessage> {
        self.completed_messages
            .iter()
            .map(|(_, m)| m)
            .find(|m| m.message_id == message_id)
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Fold into a completed record. Live messages must already be settled.
    pub(crate) fn into_record(mut self) -> CompletedExchange {
        self.completed_messages.sort_by_key(|(seq, _)| *seq);
        CompletedExchange {
            exchange_id: self.lifecycle.entity().id().to_string(),
            start: self.lifecycle.start_event_maybe().cloned(),
            end: self.lifecycle.end_event().cloned(),
            messages: self.completed_messages.into_iter().map(|(_, m)| m).collect(),
            history: None,
            termination: self.lifecycle.termination(),
        }
    }
}

#[derive(Debug)]
pub struct MessageEntry {
    pub(crate) seq: u64,
    pub(crate) lifecycle: Lifecycle<StartMessage, EndMessage>,
    next_seq: u64,
    pub(crate) content_parts: HashMap<String, ContentPartEntry>,
    pub(crate) tool_calls: HashMap<String, ToolCallEntry>,
    pub(crate) interrupts: HashMap<String, InterruptEntry>,
    pub(crate) completed: MessageAggregator,
}

impl MessageEntry {
    pub(crate) fn new(entity: EntityRef, seq: u64) -> Self {
        Self {
            seq,
            lifecycle: Lifecycle::new(entity),
            next_seq: 0,
            content_parts: HashMap::new(),
            tool_calls: HashMap::new(),
            interrupts: HashMap::new(),
            completed: MessageAggregator::new(),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle<StartMessage, EndMessage> {
        &self.lifecycle
    }

    pub fn content_part(&self, content_part_id: &str) -> Option<&ContentPartEntry> {
        self.content_parts.get(content_part_id)
    }

    pub fn tool_call(&self, tool_call_id: &str) -> Option<&ToolCallEntry> {
        self.tool_calls.get(tool_call_id)
    }

    pub fn interrupt(&self, interrupt_id: &str) -> Option<&InterruptEntry> {
        self.interrupts.get(interrupt_id)
    }

    /// Completed children collected so far
    pub fn completed(&self) -> &MessageAggregator {
        &self.completed
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Fold into a completed record. Live children must already be settled.
    pub(crate) fn into_record(self) -> CompletedMessage {
        let termination = self.lifecycle.termination();
        let message_id = self.lifecycle.entity().id().to_string();
        let start = self.lifecycle.start_event_maybe().cloned();
        let end = self.lifecycle.end_event().cloned();
        self.completed.finish(message_id, start, end, termination)
    }
}

#[derive(Debug)]
pub struct ContentPartEntry {
    pub(crate) seq: u64,
    pub(crate) lifecycle: Lifecycle<StartContentPart, EndContentPart>,
    pub(crate) aggregator: ContentAggregator,
}

impl ContentPartEntry {
    pub(crate) fn new(entity: EntityRef, seq: u64) -> Self {
        Self {
            seq,
            lifecycle: Lifecycle::new(entity),
            aggregator: ContentAggregator::new(),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle<StartContentPart, EndContentPart> {
        &self.lifecycle
    }

    /// Data received so far
    pub fn data(&self) -> &str {
        self.aggregator.data()
    }

    pub(crate) fn into_record(self) -> CompletedContentPart {
        let aggregated = self.aggregator.finish();
        CompletedContentPart {
            content_part_id: self.lifecycle.entity().id().to_string(),
            start: self.lifecycle.start_event_maybe().cloned(),
            end: self.lifecycle.end_event().cloned(),
            data: aggregated.data,
            citations: aggregated.citations,
            citation_errors: aggregated.citation_errors,
            termination: self.lifecycle.termination(),
        }
    }
}

/// A message-scoped or async tool call
#[derive(Debug)]
pub struct ToolCallEntry {
    pub(crate) seq: u64,
    pub(crate) lifecycle: Lifecycle<StartToolCall, EndToolCall>,
}

impl ToolCallEntry {
    pub(crate) fn new(entity: EntityRef, seq: u64) -> Self {
        Self {
            seq,
            lifecycle: Lifecycle::new(entity),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle<StartToolCall, EndToolCall> {
        &self.lifecycle
    }

    pub(crate) fn into_record(self) -> CompletedToolCall {
        CompletedToolCall::merge(
            self.lifecycle.entity().id(),
            self.lifecycle.start_event_maybe(),
            self.lifecycle.end_event(),
            self.lifecycle.termination(),
        )
    }
}

#[derive(Debug)]
pub struct InterruptEntry {
    pub(crate) seq: u64,
    pub(crate) lifecycle: Lifecycle<StartInterrupt, EndInterrupt>,
}

impl InterruptEntry {
    pub(crate) fn new(entity: EntityRef, seq: u64) -> Self {
        Self {
            seq,
            lifecycle: Lifecycle::new(entity),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle<StartInterrupt, EndInterrupt> {
        &self.lifecycle
    }

    pub(crate) fn into_record(self) -> CompletedInterrupt {
        CompletedInterrupt {
            interrupt_id: self.lifecycle.entity().id().to_string(),
            start: self.lifecycle.start_event_maybe().cloned(),
            end: self.lifecycle.end_event().cloned(),
            termination: self.lifecycle.termination(),
        }
    }
}

#[derive(Debug)]
pub struct InputStreamEntry {
    pub(crate) seq: u64,
    pub(crate) lifecycle: Lifecycle<StartAsyncInputStream, EndAsyncInputStream>,
    pub(crate) chunk_count: usize,
    pub(crate) byte_count: usize,
}

impl InputStreamEntry {
    pub(crate) fn new(entity: EntityRef, seq: u64) -> Self {
        Self {
            seq,
            lifecycle: Lifecycle::new(entity),
            chunk_count: 0,
            byte_count: 0,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle<StartAsyncInputStream, EndAsyncInputStream> {
        &self.lifecycle
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub(crate) fn into_record(self) -> CompletedInputStream {
        CompletedInputStream {
            stream_id: self.lifecycle.entity().id().to_string(),
            start: self.lifecycle.start_event_maybe().cloned(),
            end: self.lifecycle.end_event().cloned(),
            chunk_count: self.chunk_count,
            byte_count: self.byte_count,
            termination: self.lifecycle.termination(),
        }
    }
}

// ============================================================================
// Error ledger
// ============================================================================

/// Errors raised with `startError` and not yet cleared with `endError`,
/// keyed by the entity they concern. Independent of entity lifecycles.
#[derive(Debug, Default)]
pub struct ErrorLedger {
    open: HashMap<EntityRef, Vec<(String, ErrorStart)>>,
}

impl ErrorLedger {
    /// Record a raised error. A repeated `errorId` replaces the earlier body.
    pub(crate) fn raise(&mut self, entity: &EntityRef, error_id: &str, error: ErrorStart) {
        let errors = self.open.entry(entity.clone()).or_default();
        match errors.iter_mut().find(|(id, _)| id == error_id) {
            Some(slot) => slot.1 = error,
            None => errors.push((error_id.to_string(), error)),
        }
    }

    /// Clear an error, returning its body if it was open
    pub(crate) fn clear(&mut self, entity: &EntityRef, error_id: &str) -> Option<ErrorStart> {
        let errors = self.open.get_mut(entity)?;
        let index = errors.iter().position(|(id, _)| id == error_id)?;
        let (_, error) = errors.remove(index);
        if errors.is_empty() {
            self.open.remove(entity);
        }
        Some(error)
    }

    /// Open errors of one entity, oldest first
    pub fn open_errors(&self, entity: &EntityRef) -> &[(String, ErrorStart)] {
        self.open.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Forget open errors of `scope` and its descendants, returning how many
    /// were dropped
    pub(crate) fn release_within(&mut self, scope: &EntityRef) -> usize {
        let mut released = 0;
        self.open.retain(|entity, errors| {
            let keep = !entity.is_within(scope);
            if !keep {
                released += errors.len();
            }
            keep
        });
        released
    }

    pub fn len(&self) -> usize {
        self.open.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// All entity state of one session.
///
/// `maxRetainedExchanges` bounds the completed exchange trees and the open
/// errors inside them. The set of ended exchange ids and the completed async
/// tool call and input stream records are kept for the life of the session.
#[derive(Debug)]
pub struct EntityRegistry {
    pub(crate) session: SessionEntry,
    pub(crate) exchanges: HashMap<String, ExchangeEntry>,
    pub(crate) ended_exchanges: HashSet<String>,
    completed_exchanges: HashMap<String, CompletedExchange>,
    retained_order: VecDeque<String>,
    max_retained_exchanges: Option<usize>,
    pub(crate) async_tool_calls: HashMap<String, ToolCallEntry>,
    pub(crate) completed_async_tool_calls: HashMap<String, CompletedToolCall>,
    pub(crate) input_streams: HashMap<String, InputStreamEntry>,
    pub(crate) completed_input_streams: HashMap<String, CompletedInputStream>,
    pub(crate) errors: ErrorLedger,
    next_seq: u64,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl EntityRegistry {
    pub fn new(max_retained_exchanges: Option<usize>) -> Self {
        Self {
            session: SessionEntry::new(),
            exchanges: HashMap::new(),
            ended_exchanges: HashSet::new(),
            completed_exchanges: HashMap::new(),
            retained_order: VecDeque::new(),
            max_retained_exchanges,
            async_tool_calls: HashMap::new(),
            completed_async_tool_calls: HashMap::new(),
            input_streams: HashMap::new(),
            completed_input_streams: HashMap::new(),
            errors: ErrorLedger::default(),
            next_seq: 0,
        }
    }

    pub fn session(&self) -> &SessionEntry {
        &self.session
    }

    /// Live exchange
    pub fn exchange(&self, exchange_id: &str) -> Option<&ExchangeEntry> {
        self.exchanges.get(exchange_id)
    }

    /// Live async tool call
    pub fn async_tool_call(&self, tool_call_id: &str) -> Option<&ToolCallEntry> {
        self.async_tool_calls.get(tool_call_id)
    }

    /// Live input stream
    pub fn input_stream(&self, stream_id: &str) -> Option<&InputStreamEntry> {
        self.input_streams.get(stream_id)
    }

    pub fn errors(&self) -> &ErrorLedger {
        &self.errors
    }

    /// Ids of live exchanges
    pub fn live_exchange_ids(&self) -> impl Iterator<Item = &str> {
        self.exchanges.keys().map(String::as_str)
    }

    /// Retained completed exchanges, oldest first
    pub fn completed_exchanges(&self) -> impl Iterator<Item = &CompletedExchange> {
        self.retained_order
            .iter()
            .filter_map(|id| self.completed_exchanges.get(id))
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Keep a completed exchange, evicting the oldest beyond the cap
    pub(crate) fn retain_exchange(&mut self, record: CompletedExchange) {
        let id = record.exchange_id.clone();
        self.ended_exchanges.insert(id.clone());
        if self.completed_exchanges.insert(id.clone(), record).is_none() {
            self.retained_order.push_back(id);
        }
        if let Some(cap) = self.max_retained_exchanges {
            while self.retained_order.len() > cap {
                if let Some(evicted) = self.retained_order.pop_front() {
                    self.completed_exchanges.remove(&evicted);
                    let scope = EntityRef::exchange(evicted.as_str());
                    let released = self.errors.release_within(&scope);
                    if released > 0 {
                        debug!(entity = %scope, released, "released open errors of evicted exchange");
                    }
                }
            }
        }
    }

    /// Current phase of any entity, `None` if it was never seen (or its
    /// record has been evicted)
    pub fn phase(&self, entity: &EntityRef) -> Option<Phase> {
        match entity {
            EntityRef::Session => Some(self.session.lifecycle.phase()),
            EntityRef::Exchange { exchange_id } => match self.exchanges.get(exchange_id) {
                Some(entry) => Some(entry.lifecycle.phase()),
                None => self.ended_exchanges.contains(exchange_id).then_some(Phase::Ended),
            },
            EntityRef::Message {
                exchange_id,
                message_id,
            } => {
                let live = self
                    .exchanges
                    .get(exchange_id)
                    .and_then(|ex| ex.messages.get(message_id));
                match live {
                    Some(entry) => Some(entry.lifecycle.phase()),
                    None => self.completed(entity).map(|_| Phase::Ended),
                }
            }
            EntityRef::ContentPart {
                exchange_id,
                message_id,
                content_part_id,
            } => match self.live_message(exchange_id, message_id) {
                Some(msg) => match msg.content_parts.get(content_part_id) {
                    Some(part) => Some(part.lifecycle.phase()),
                    None => msg
                        .completed
                        .content_part(content_part_id)
                        .map(|_| Phase::Ended),
                },
                None => self.completed(entity).map(|_| Phase::Ended),
            },
            EntityRef::ToolCall {
                exchange_id,
                message_id,
                tool_call_id,
            } => match self.live_message(exchange_id, message_id) {
                Some(msg) => match msg.tool_calls.get(tool_call_id) {
                    Some(call) => Some(call.lifecycle.phase()),
                    None => msg.completed.tool_call(tool_call_id).map(|_| Phase::Ended),
                },
                None => self.completed(entity).map(|_| Phase::Ended),
            },
            EntityRef::Interrupt {
                exchange_id,
                message_id,
                interrupt_id,
            } => match self.live_message(exchange_id, message_id) {
                Some(msg) => match msg.interrupts.get(interrupt_id) {
                    Some(interrupt) => Some(interrupt.lifecycle.phase()),
                    None => msg.completed.interrupt(interrupt_id).map(|_| Phase::Ended),
                },
                None => self.completed(entity).map(|_| Phase::Ended),
            },
            EntityRef::AsyncToolCall { tool_call_id } => {
                match self.async_tool_calls.get(tool_call_id) {
                    Some(entry) => Some(entry.lifecycle.phase()),
                    None => self
                        .completed_async_tool_calls
                        .contains_key(tool_call_id)
                        .then_some(Phase::Ended),
                }
            }
            EntityRef::AsyncInputStream { stream_id } => match self.input_streams.get(stream_id) {
                Some(entry) => Some(entry.lifecycle.phase()),
                None => self
                    .completed_input_streams
                    .contains_key(stream_id)
                    .then_some(Phase::Ended),
            },
        }
    }

    /// Completed record of an ended entity
    pub fn completed(&self, entity: &EntityRef) -> Option<CompletedRecord> {
        match entity {
            EntityRef::Session => None,
            EntityRef::Exchange { exchange_id } => self
                .completed_exchanges
                .get(exchange_id)
                .cloned()
                .map(CompletedRecord::Exchange),
            EntityRef::Message {
                exchange_id,
                message_id,
            } => self
                .completed_message(exchange_id, message_id)
                .cloned()
                .map(CompletedRecord::Message),
            EntityRef::ContentPart {
                exchange_id,
                message_id,
                content_part_id,
            } => {
                let record = match self.live_message(exchange_id, message_id) {
                    Some(msg) => msg.completed.content_part(content_part_id).cloned(),
                    None => self
                        .completed_message(exchange_id, message_id)
                        .and_then(|m| m.content_part(content_part_id).cloned()),
                };
                record.map(CompletedRecord::ContentPart)
            }
            EntityRef::ToolCall {
                exchange_id,
                message_id,
                tool_call_id,
            } => {
                let record = match self.live_message(exchange_id, message_id) {
                    Some(msg) => msg.completed.tool_call(tool_call_id).cloned(),
                    None => self
                        .completed_message(exchange_id, message_id)
                        .and_then(|m| m.tool_call(tool_call_id).cloned()),
                };
                record.map(CompletedRecord::ToolCall)
            }
            EntityRef::Interrupt {
                exchange_id,
                message_id,
                interrupt_id,
            } => {
                let record = match self.live_message(exchange_id, message_id) {
                    Some(msg) => msg.completed.interrupt(interrupt_id).cloned(),
                    None => self
                        .completed_message(exchange_id, message_id)
                        .and_then(|m| m.interrupt(interrupt_id).cloned()),
                };
                record.map(CompletedRecord::Interrupt)
            }
            EntityRef::AsyncToolCall { tool_call_id } => self
                .completed_async_tool_calls
                .get(tool_call_id)
                .cloned()
                .map(CompletedRecord::ToolCall),
            EntityRef::AsyncInputStream { stream_id } => self
                .completed_input_streams
                .get(stream_id)
                .cloned()
                .map(CompletedRecord::InputStream),
        }
    }

    fn live_message(&self, exchange_id: &str, message_id: &str) -> Option<&MessageEntry> {
        self.exchanges
            .get(exchange_id)
            .and_then(|ex| ex.messages.get(message_id))
    }

    fn completed_message(&self, exchange_id: &str, message_id: &str) -> Option<&CompletedMessage> {
        match self.exchanges.get(exchange_id) {
            Some(ex) => ex.completed_message(message_id),
            None => self
                .completed_exchanges
                .get(exchange_id)
                .and_then(|ex| ex.message(message_id)),
        }
    }

    /// Install a completed exchange rebuilt from history. Skipped when an
    /// exchange with the same id is live.
    pub(crate) fn restore_exchange(&mut self, record: CompletedExchange) -> bool {
        if self.exchanges.contains_key(&record.exchange_id) {
            return false;
        }
        self.retain_exchange(record);
        true
    }
}

#[cfg(test)]
mod tests;
