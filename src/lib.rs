//! Conversational event-streaming protocol core
//!
//! This crate implements the session/exchange/message/content hierarchy that
//! carries a live conversation between a client and an agent over one
//! persistent connection. It defines the wire envelope, the entity state
//! machines, chunk aggregation with citations, and buffered emission. It does
//! not open connections: the embedding application supplies a
//! [`Transport`](emission::Transport) and feeds inbound frames to the session.
//!
//! ## Usage
//!
//! ```rust
//! use convostream::prelude::*;
//!
//! # fn main() -> convostream::Result<()> {
//! let mut session = Session::new(
//!     SessionBootstrap::new("conv_1"),
//!     MemoryTransport::new(),
//!     SessionConfig::default(),
//! );
//! session.on_complete(EntityRef::message("ex_1", "msg_1"), |event| {
//!     if let SessionEventKind::Completed(CompletedRecord::Message(message)) = &event.kind {
//!         println!("assistant said: {}", message.text());
//!     }
//! });
//!
//! for line in [
//!     r#"{"conversationId":"conv_1","sessionStarted":{}}"#,
//!     r#"{"conversationId":"conv_1","exchange":{"exchangeId":"ex_1","startExchange":{}}}"#,
//! ] {
//!     session.receive(ConversationEvent::from_json_line(line)?)?;
//! }
//! assert_eq!(session.phase(&EntityRef::exchange("ex_1")), Some(Phase::Active));
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Principles
//!
//! 1. **One envelope**: all traffic is a [`ConversationEvent`](events::ConversationEvent);
//!    each nesting level is a sum type with exactly one payload
//! 2. **Lenient inbound, strict outbound**: peer violations are logged and
//!    recovered from, local ones are returned as errors before anything is sent
//! 3. **Total aggregation**: every entity that ends yields a completed record,
//!    including entities abandoned by their owner
//! 4. **Single-threaded sessions**: a session is driven by one caller; separate
//!    sessions share nothing

// ============================================================================
// Wire model and codec
// ============================================================================

pub mod codec;
pub mod events;

pub use codec::{decode_frame, decode_lines, encode_frame, Frame, FrameFormat};

// ============================================================================
// Protocol engine
// ============================================================================

pub mod aggregate;
pub mod dispatch;
pub mod emission;
pub mod observer;
pub mod registry;
pub mod replay;
pub mod session;
pub mod state;

pub use session::{Session, SessionBootstrap};

// ============================================================================
// Ambient
// ============================================================================

pub mod config;
pub mod error;
pub mod ids;

pub use config::{AbandonPolicy, SessionConfig};
pub use error::{CodecError, ProtocolError, ProtocolViolation, Result, ViolationKind};

// ============================================================================
// Streaming Support (optional feature)
// ============================================================================

#[cfg(feature = "streaming")]
pub mod streaming;

/// Everything needed to run a session
pub mod prelude {
    pub use crate::aggregate::{
        Citation, CompletedContentPart, CompletedExchange, CompletedMessage, CompletedRecord,
        CompletedToolCall,
    };
    pub use crate::codec::{Frame, FrameFormat};
    pub use crate::config::{AbandonPolicy, SessionConfig};
    pub use crate::emission::{MemoryTransport, Transport};
    pub use crate::error::{ProtocolError, Result, ViolationKind};
    pub use crate::events::*;
    pub use crate::observer::{Origin, SessionEvent, SessionEventKind, SubscriptionId, Topic};
    pub use crate::registry::{EntityKind, EntityRef};
    pub use crate::session::{Session, SessionBootstrap};
    pub use crate::state::{Phase, Termination};
}
