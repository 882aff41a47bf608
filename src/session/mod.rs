//! Session facade
//!
//! A [`Session`] owns everything that belongs to one conversation:
//!
//! - the [`EntityRegistry`] holding every entity's state
//! - the [`Observers`] subscribed to its events
//! - the [`EmissionQueue`] in front of the transport
//!
//! Inbound envelopes enter through [`Session::receive`] and outbound ones are
//! built by the emitters returned from [`Session::exchange`],
//! [`Session::async_tool_call`] and [`Session::async_input_stream`]. Both
//! directions drive the same registry, so a session can act as either the
//! client or the service side of a connection.
//!
//! # Ordering around `sessionStarted`
//!
//! Child events received before `sessionStarted` are buffered (up to
//! `maxPreStartBuffer`) and applied in arrival order once the session starts.
//! Child events emitted locally before that point are applied immediately
//! but only transmitted once the session is Active. `startSession` and
//! `sessionStarted` themselves are always sent right away.
//!
//! # Example
//!
//! ```rust
//! use convostream::prelude::*;
//!
//! # fn main() -> convostream::Result<()> {
//! let bootstrap = SessionBootstrap::new("conv_1");
//! let mut session = Session::new(bootstrap, MemoryTransport::new(), SessionConfig::default());
//! session.start_session()?;
//! session.receive(ConversationEvent::new(
//!     "conv_1",
//!     ConversationEventKind::SessionStarted(SessionStarted::default()),
//! ))?;
//!
//! let mut exchange = session.exchange("ex_1");
//! exchange.start(StartExchange::default())?;
//! let mut message = exchange.message("msg_1");
//! message.start(StartMessage::new(Role::User))?;
//! let mut part = message.content_part("part_1");
//! part.start(StartContentPart::text())?;
//! part.text("What is the capital of France?")?;
//! part.end(EndContentPart::default())?;
//! message.end(EndMessage::default())?;
//!
//! assert_eq!(session.transport().frames().len(), 7);
//! # Ok(())
//! # }
//! ```

mod emitter;

pub use emitter::{
    ContentPartEmitter, ExchangeEmitter, InputStreamEmitter, InterruptEmitter, MessageEmitter,
    ToolCallEmitter,
};

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::aggregate::CompletedRecord;
use crate::codec::{decode_frame, Frame};
use crate::config::SessionConfig;
use crate::dispatch::{dispatch, locate, Sink};
use crate::emission::{EmissionQueue, Transport};
use crate::error::{ProtocolError, ProtocolViolation, Result, ViolationKind};
use crate::events::{
    ConversationEvent, ConversationEventKind, EndSession, ErrorEvent, ErrorEventKind, ErrorStart,
    EventClass, LabelUpdated, MetaEvent, Metadata, SessionCapabilities, SessionEnding, SessionStarted,
    StartSession,
};
use crate::observer::{Observers, Origin, SessionEvent, SessionEventKind, SubscriptionId, Topic};
use crate::registry::{EntityRef, EntityRegistry};
use crate::replay::{self, ExchangeRecord};
use crate::state::Phase;

/// What the embedding application supplies when a connection opens
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionBootstrap {
    pub conversation_id: String,
    /// Advertised in `startSession` / `sessionStarted`
    pub capabilities: Option<SessionCapabilities>,
}

impl SessionBootstrap {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            capabilities: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: SessionCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }
}

/// One live conversation over one transport
#[derive(Debug)]
pub struct Session<T: Transport> {
    conversation_id: String,
    config: SessionConfig,
    capabilities: Option<SessionCapabilities>,
    registry: EntityRegistry,
    observers: Observers,
    queue: EmissionQueue<T>,
    /// Inbound child events waiting for `sessionStarted`
    pre_start: VecDeque<ConversationEvent>,
    /// Outbound child events waiting for `sessionStarted`
    held: VecDeque<ConversationEvent>,
}

impl<T: Transport> Session<T> {
    pub fn new(bootstrap: SessionBootstrap, transport: T, config: SessionConfig) -> Self {
        let queue = EmissionQueue::new(transport, config.frame_format);
        Self {
            conversation_id: bootstrap.conversation_id,
            capabilities: bootstrap.capabilities,
            registry: EntityRegistry::new(config.max_retained_exchanges),
            observers: Observers::new(),
            queue,
            pre_start: VecDeque::new(),
            held: VecDeque::new(),
            config,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ========================================================================
    // Session lifecycle (outbound)
    // ========================================================================

    /// Client side: request a session, advertising the bootstrap capabilities
    pub fn start_session(&mut self) -> Result<()> {
        let start = StartSession {
            capabilities: self.capabilities.clone(),
            metadata: None,
        };
        self.emit(ConversationEventKind::StartSession(start))
    }

    /// Service side: accept the session. Held outbound events and buffered
    /// inbound events are released afterwards.
    pub fn accept_session(&mut self) -> Result<()> {
        let started = SessionStarted {
            capabilities: self.capabilities.clone(),
        };
        self.emit(ConversationEventKind::SessionStarted(started))
    }

    /// Announce that the transport will be closed in `time_to_live_ms`
    pub fn announce_ending(&mut self, time_to_live_ms: u64) -> Result<()> {
        self.emit(ConversationEventKind::SessionEnding(SessionEnding {
            time_to_live_ms,
        }))
    }

    /// End the session. Open descendants are settled by the abandon policy.
    pub fn end_session(&mut self, metadata: Option<Metadata>) -> Result<()> {
        self.emit(ConversationEventKind::EndSession(EndSession { metadata }))
    }

    pub fn update_label(&mut self, label: LabelUpdated) -> Result<()> {
        self.emit(ConversationEventKind::LabelUpdated(label))
    }

    /// Session-scoped meta event
    pub fn send_meta(&mut self, meta: MetaEvent) -> Result<()> {
        self.emit(ConversationEventKind::Meta(meta))
    }

    /// Raise a conversation-level error
    pub fn start_error(&mut self, error_id: impl Into<String>, error: ErrorStart) -> Result<()> {
        self.emit(ConversationEventKind::Error(ErrorEvent {
            error_id: error_id.into(),
            kind: ErrorEventKind::Start(error),
        }))
    }

    /// Clear a conversation-level error
    pub fn end_error(&mut self, error_id: impl Into<String>) -> Result<()> {
        self.emit(ConversationEventKind::Error(ErrorEvent::end(error_id)))
    }

    // ========================================================================
    // Outbound entities
    // ========================================================================

    pub fn exchange(&mut self, exchange_id: impl Into<String>) -> ExchangeEmitter<'_, T> {
        ExchangeEmitter::new(self, exchange_id.into())
    }

    /// A tool call owned by the session rather than a message
    pub fn async_tool_call(&mut self, tool_call_id: impl Into<String>) -> ToolCallEmitter<'_, T> {
        ToolCallEmitter::session_scoped(self, tool_call_id.into())
    }

    pub fn async_input_stream(&mut self, stream_id: impl Into<String>) -> InputStreamEmitter<'_, T> {
        InputStreamEmitter::new(self, stream_id.into())
    }

    /// Buffer outbound envelopes until [`resume_emits`](Self::resume_emits)
    pub fn pause_emits(&mut self) {
        self.queue.pause();
    }

    /// Flush envelopes buffered while paused, returning how many were sent
    pub fn resume_emits(&mut self) -> Result<usize> {
        self.queue.resume()
    }

    pub fn emits_paused(&self) -> bool {
        self.queue.is_paused()
    }

    /// Envelopes not yet handed to the transport, paused or held
    pub fn pending_emits(&self) -> usize {
        self.queue.pending_len() + self.held.len()
    }

    pub(crate) fn emit(&mut self, kind: ConversationEventKind) -> Result<()> {
        self.emit_local(ConversationEvent::new(self.conversation_id.clone(), kind))
    }

    /// Apply a locally built envelope, then send (or hold) it.
    ///
    /// A violation is returned before anything is applied or sent.
    fn emit_local(&mut self, event: ConversationEvent) -> Result<()> {
        if self.registry.session().lifecycle().ended() {
            return Err(ProtocolError::SessionEnded);
        }
        let was_active = self.is_active();
        let mut sink = Sink::new(Origin::Local, self.config.abandon_policy);
        dispatch(&mut self.registry, &event, &mut sink)?;
        self.deliver(sink.events);

        if self.registry.session().lifecycle().phase() == Phase::Pending && !event.opens_session()
        {
            trace!(conversation_id = %self.conversation_id, "holding outbound event until session starts");
            self.held.push_back(event);
            return Ok(());
        }
        self.queue.emit(event)?;
        self.after_transition(was_active)
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Decode and apply one inbound frame
    pub fn receive_frame(&mut self, frame: &Frame) -> Result<()> {
        let event = decode_frame(frame)?;
        self.receive(event)
    }

    /// Apply one inbound envelope.
    ///
    /// Protocol violations are logged (and surfaced when configured), never
    /// returned. An error means the transport failed while releasing held
    /// outbound events; they stay queued in order for `resume_emits`.
    pub fn receive(&mut self, event: ConversationEvent) -> Result<()> {
        if event.conversation_id != self.conversation_id {
            warn!(
                conversation_id = %self.conversation_id,
                received = %event.conversation_id,
                "dropping event for another conversation"
            );
            return Ok(());
        }
        let located = locate(&event);
        if located.class == EventClass::Unknown {
            trace!(entity = %located.entity, "ignoring unrecognized event");
            return Ok(());
        }
        let entity = located.entity;

        match self.registry.session().lifecycle().phase() {
            Phase::Ended => {
                self.report_violation(ProtocolViolation::new(entity, ViolationKind::SessionEnded));
                Ok(())
            }
            Phase::Pending if !event.is_session_level() => {
                self.hold_inbound(entity, event);
                Ok(())
            }
            _ => {
                let was_active = self.is_active();
                self.apply_remote(&event);
                self.after_transition(was_active)
            }
        }
    }

    fn hold_inbound(&mut self, entity: EntityRef, event: ConversationEvent) {
        if !self.config.buffer_before_started {
            self.report_violation(ProtocolViolation::new(entity, ViolationKind::SessionNotStarted));
            return;
        }
        if self.pre_start.len() >= self.config.max_pre_start_buffer {
            self.report_violation(ProtocolViolation::new(entity, ViolationKind::BufferFull));
            return;
        }
        trace!(entity = %entity, buffered = self.pre_start.len() + 1, "buffering event until session starts");
        self.pre_start.push_back(event);
    }

    fn apply_remote(&mut self, event: &ConversationEvent) {
        let mut sink = Sink::new(Origin::Remote, self.config.abandon_policy);
        let outcome = dispatch(&mut self.registry, event, &mut sink);
        self.deliver(sink.events);
        if let Err(violation) = outcome {
            self.report_violation(violation);
        }
    }

    fn is_active(&self) -> bool {
        self.registry.session().lifecycle().is_active()
    }

    /// Release everything waiting on `sessionStarted`, or discard it once
    /// the session has ended
    fn after_transition(&mut self, was_active: bool) -> Result<()> {
        let phase = self.registry.session().lifecycle().phase();
        if phase == Phase::Ended {
            if !self.pre_start.is_empty() || !self.held.is_empty() {
                debug!(
                    inbound = self.pre_start.len(),
                    outbound = self.held.len(),
                    "session ended before start, discarding buffered events"
                );
                self.pre_start.clear();
                self.held.clear();
            }
            return Ok(());
        }
        if was_active || phase != Phase::Active {
            return Ok(());
        }

        debug!(
            conversation_id = %self.conversation_id,
            inbound = self.pre_start.len(),
            outbound = self.held.len(),
            "session started"
        );
        while let Some(event) = self.pre_start.pop_front() {
            self.apply_remote(&event);
        }
        // A failed write pauses the queue, so the rest of the backlog is
        // buffered behind it in order.
        let mut failure = None;
        while let Some(event) = self.held.pop_front() {
            if let Err(e) = self.queue.emit(event) {
                failure.get_or_insert(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    fn report_violation(&mut self, violation: ProtocolViolation) {
        warn!(
            conversation_id = %self.conversation_id,
            entity = %violation.entity,
            kind = ?violation.kind,
            "protocol violation"
        );
        if self.config.surface_violations {
            self.observers.notify(&SessionEvent {
                entity: violation.entity,
                kind: SessionEventKind::Violation(violation.kind),
                origin: Origin::Remote,
            });
        }
    }

    fn deliver(&mut self, events: Vec<SessionEvent>) {
        for event in &events {
            if event.origin != Origin::Local || self.config.echo {
                self.observers.notify(event);
            } else {
                self.observers.settle(event);
            }
        }
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub fn subscribe<F>(&mut self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.observers.subscribe(topic, handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Every error raised in the session, tagged with its entity
    pub fn on_any_error<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.observers.subscribe(Topic::errors(), handler)
    }

    /// Receive `entity`'s completed record.
    ///
    /// If the record is already available the handler runs immediately with
    /// [`Origin::Retained`] and no subscription is kept (`None`).
    pub fn on_complete<F>(&mut self, entity: EntityRef, mut handler: F) -> Option<SubscriptionId>
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        if let Some(record) = self.registry.completed(&entity) {
            handler(&SessionEvent {
                entity,
                kind: SessionEventKind::Completed(record),
                origin: Origin::Retained,
            });
            return None;
        }
        let topic = Topic::entity(entity).class(EventClass::Completed);
        Some(self.observers.subscribe(topic, handler))
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Phase of any entity, `None` if it was never seen
    pub fn phase(&self, entity: &EntityRef) -> Option<Phase> {
        self.registry.phase(entity)
    }

    pub fn completed(&self, entity: &EntityRef) -> Option<CompletedRecord> {
        self.registry.completed(entity)
    }

    /// Errors raised against `entity` and not yet cleared
    pub fn open_errors(&self, entity: &EntityRef) -> &[(String, ErrorStart)] {
        self.registry.errors().open_errors(entity)
    }

    pub fn label(&self) -> Option<&LabelUpdated> {
        self.registry.session().label()
    }

    pub fn peer_capabilities(&self) -> Option<&SessionCapabilities> {
        self.registry.session().peer_capabilities()
    }

    /// Whether the peer advertised handling `mime_type` (unspecified counts as yes)
    pub fn peer_handles_mime_type(&self, mime_type: &str) -> bool {
        self.peer_capabilities()
            .map_or(true, |caps| caps.handles_mime_type(mime_type))
    }

    pub fn ending_deadline(&self) -> Option<DateTime<Utc>> {
        self.registry.session().ending_deadline()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        self.queue.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.queue.transport_mut()
    }

    // ========================================================================
    // Replay
    // ========================================================================

    /// Install persisted exchanges as Ended entities.
    ///
    /// Replaces earlier replays of the same ids and skips ids that are live.
    /// Observers are not notified and nothing is sent. Returns the number of
    /// exchanges installed.
    pub fn replay(&mut self, records: &[ExchangeRecord]) -> usize {
        let mut installed = 0;
        for exchange in replay::restore(records) {
            let exchange_id = exchange.exchange_id.clone();
            if self.registry.restore_exchange(exchange) {
                installed += 1;
            } else {
                debug!(exchange_id = %exchange_id, "skipping replay of live exchange");
            }
        }
        debug!(conversation_id = %self.conversation_id, installed, "replayed history");
        installed
    }
}

#[cfg(test)]
mod tests;
