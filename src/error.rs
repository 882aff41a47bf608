//! Error types for the protocol core

use thiserror::Error;

use crate::registry::EntityRef;

/// Boxed error returned by a [`Transport`](crate::emission::Transport)
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Crate-level error
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Encoding or decoding an envelope failed
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport refused a frame
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// A locally emitted event broke the entity lifecycle
    #[error(transparent)]
    Violation(#[from] ProtocolViolation),

    /// A start event was read before the entity started
    #[error(transparent)]
    NotStarted(#[from] NotStartedError),

    /// The session has already ended
    #[error("session has ended")]
    SessionEnded,

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Envelope codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed JSON or a payload of the wrong shape
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a line-delimited stream failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// More than one payload field populated at one level
    #[error("{scope} event populates more than one variant: {}", fields.join(", "))]
    AmbiguousVariant {
        scope: &'static str,
        fields: Vec<&'static str>,
    },
}

/// The start event of an entity was requested before it started
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} has not started")]
pub struct NotStartedError {
    /// Entity whose start event was requested
    pub entity: EntityRef,
}

/// A lifecycle rule broken by one event
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} on {entity}")]
pub struct ProtocolViolation {
    /// Entity the event addressed
    pub entity: EntityRef,
    /// Which rule was broken
    pub kind: ViolationKind,
}

impl ProtocolViolation {
    pub fn new(entity: EntityRef, kind: ViolationKind) -> Self {
        Self { entity, kind }
    }
}

/// Protocol-shape violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Start received while Active or Ended; the first start is kept
    DuplicateStart,
    /// End received while Pending
    PrematureEnd,
    /// Any event received after the entity ended
    EventAfterEnd,
    /// Chunk, meta or child event for an entity that has not started
    NotActive,
    /// Child event before the session started
    SessionNotStarted,
    /// Event after the session ended
    SessionEnded,
    /// The pre-start buffer is full
    BufferFull,
}

impl ViolationKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateStart => "duplicate start",
            Self::PrematureEnd => "premature end",
            Self::EventAfterEnd => "event after end",
            Self::NotActive => "entity not active",
            Self::SessionNotStarted => "session not started",
            Self::SessionEnded => "session ended",
            Self::BufferFull => "pre-start buffer full",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProtocolError {
    /// Wrap a transport failure
    pub fn transport(source: impl Into<TransportError>) -> Self {
        Self::Transport(source.into())
    }

    /// Violation kind, when this error is a violation
    pub fn violation_kind(&self) -> Option<ViolationKind> {
        match self {
            Self::Violation(v) => Some(v.kind),
            _ => None,
        }
    }
}
