//! Observer registry
//!
//! Consumers subscribe to a [`Topic`] and receive every matching
//! [`SessionEvent`]. A subscription returns a [`SubscriptionId`] that is
//! released with [`Observers::unsubscribe`]. Subscriptions scoped to an
//! entity are retired once that entity's completion has been delivered, and
//! all subscriptions are retired when the session ends.

use std::fmt;

use crate::aggregate::CompletedRecord;
use crate::error::ViolationKind;
use crate::events::{
    AsyncInputStreamChunk, ContentPartChunk, EndAsyncInputStream, EndContentPart, EndExchange,
    EndInterrupt, EndMessage, EndSession, EndToolCall, ErrorStart, EventClass, LabelUpdated,
    MetaEvent, SessionEnding, SessionStarted, StartAsyncInputStream, StartContentPart,
    StartExchange, StartInterrupt, StartMessage, StartSession, StartToolCall,
};
use crate::registry::{EntityKind, EntityRef};

/// Where an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Received from the peer
    Remote,
    /// Emitted locally (delivered only in echo mode)
    Local,
    /// Read back from retained state, e.g. a late `on_complete`
    Retained,
}

/// One notification delivered to observers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    /// Entity the event concerns
    pub entity: EntityRef,
    pub kind: SessionEventKind,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    SessionStartRequested(StartSession),
    SessionStarted(SessionStarted),
    SessionEnding(SessionEnding),
    SessionEnded(EndSession),
    LabelUpdated(LabelUpdated),
    ExchangeStarted(StartExchange),
    ExchangeEnded(EndExchange),
    MessageStarted(StartMessage),
    MessageEnded(EndMessage),
    ContentPartStarted(StartContentPart),
    ContentPartChunk(ContentPartChunk),
    ContentPartEnded(EndContentPart),
    /// Message-scoped or async tool call start
    ToolCallStarted(StartToolCall),
    ToolCallEnded(EndToolCall),
    InterruptStarted(StartInterrupt),
    InterruptEnded(EndInterrupt),
    InputStreamStarted(StartAsyncInputStream),
    InputStreamChunk(AsyncInputStreamChunk),
    InputStreamEnded(EndAsyncInputStream),
    Meta(MetaEvent),
    ErrorStarted {
        error_id: String,
        error: ErrorStart,
    },
    /// `error` is the body of the matching start, if it was seen
    ErrorEnded {
        error_id: String,
        error: Option<ErrorStart>,
    },
    Completed(CompletedRecord),
    /// Inbound protocol violation (only with `surfaceViolations`)
    Violation(ViolationKind),
}

impl SessionEventKind {
    pub fn class(&self) -> EventClass {
        match self {
            Self::SessionStartRequested(_)
            | Self::SessionStarted(_)
            | Self::SessionEnding(_)
            | Self::SessionEnded(_)
            | Self::LabelUpdated(_) => EventClass::Session,
            Self::ExchangeStarted(_)
            | Self::MessageStarted(_)
            | Self::ContentPartStarted(_)
            | Self::ToolCallStarted(_)
            | Self::InterruptStarted(_)
            | Self::InputStreamStarted(_) => EventClass::Start,
            Self::ContentPartChunk(_) | Self::InputStreamChunk(_) => EventClass::Chunk,
            Self::ExchangeEnded(_)
            | Self::MessageEnded(_)
            | Self::ContentPartEnded(_)
            | Self::ToolCallEnded(_)
            | Self::InterruptEnded(_)
            | Self::InputStreamEnded(_) => EventClass::End,
            Self::Meta(_) => EventClass::Meta,
            Self::ErrorStarted { .. } | Self::ErrorEnded { .. } => EventClass::Error,
            Self::Completed(_) => EventClass::Completed,
            Self::Violation(_) => EventClass::Violation,
        }
    }
}

impl SessionEvent {
    pub fn class(&self) -> EventClass {
        self.kind.class()
    }
}

/// Which events a subscription receives
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    scope: EntityRef,
    exact: bool,
    kind: Option<EntityKind>,
    class: Option<EventClass>,
}

impl Topic {
    /// Every event of the session
    pub fn all() -> Self {
        Self::within(EntityRef::Session)
    }

    /// Events of `scope` and its descendants
    pub fn within(scope: EntityRef) -> Self {
        Self {
            scope,
            exact: false,
            kind: None,
            class: None,
        }
    }

    /// Events of `entity` only
    pub fn entity(entity: EntityRef) -> Self {
        Self {
            exact: true,
            ..Self::within(entity)
        }
    }

    /// Every error in the session, tagged with its originating entity
    pub fn errors() -> Self {
        Self::all().class(EventClass::Error)
    }

    /// Restrict to entities of `kind`
    pub fn of_kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Restrict to events of `class`
    pub fn class(mut self, class: EventClass) -> Self {
        self.class = Some(class);
        self
    }

    pub fn scope(&self) -> &EntityRef {
        &self.scope
    }

    pub fn matches(&self, event: &SessionEvent) -> bool {
        let in_scope = if self.exact {
            event.entity == self.scope
        } else {
            event.entity.is_within(&self.scope)
        };
        in_scope
            && self.kind.map_or(true, |k| event.entity.kind() == k)
            && self.class.map_or(true, |c| event.class() == c)
    }
}

/// Handle returned by [`Observers::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Observer callback. Handlers cannot re-enter the session.
pub type Handler = Box<dyn FnMut(&SessionEvent) + Send + 'static>;

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    handler: Handler,
}

/// Subscriptions of one session
#[derive(Default)]
pub struct Observers {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscriptions.push(Subscription {
            id,
            topic,
            handler: Box::new(handler),
        });
        id
    }

    /// Release a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Deliver `event` to every matching subscription, in subscription order
    pub fn notify(&mut self, event: &SessionEvent) {
        for subscription in &mut self.subscriptions {
            if subscription.topic.matches(event) {
                (subscription.handler)(event);
            }
        }
        self.settle(event);
    }

    /// Apply the retirement rules for `event` without delivering it
    pub fn settle(&mut self, event: &SessionEvent) {
        match event.kind {
            SessionEventKind::Completed(_) => self.retire_within(&event.entity),
            SessionEventKind::SessionEnded(_) => self.subscriptions.clear(),
            _ => {}
        }
    }

    /// Drop every subscription scoped to `entity` or one of its descendants
    pub fn retire_within(&mut self, entity: &EntityRef) {
        self.subscriptions
            .retain(|s| !s.topic.scope.is_within(entity));
    }
}

#[cfg(test)]
mod tests;
