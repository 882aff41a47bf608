//! Wire data model for the conversational event stream
//!
//! All wire data is a single recursive envelope, [`ConversationEvent`], scoped
//! by `conversationId`. Each level of nesting is a sum type: exactly one
//! payload is populated per envelope.
//!
//! ## Nesting
//!
//! - [`ConversationEvent`]: session lifecycle, label, meta, conversation error,
//!   plus [`ExchangeEvent`], [`ToolCallEvent`] (async) and [`AsyncInputStreamEvent`]
//! - [`ExchangeEvent`] → [`MessageEvent`]
//! - [`MessageEvent`] → [`ContentPartEvent`], [`ToolCallEvent`], [`InterruptEvent`]
//! - Every level can carry a [`MetaEvent`] and an [`ErrorEvent`]
//!
//! ## Usage
//!
//! ```rust
//! use convostream::events::*;
//!
//! let chunk = ConversationEvent::new(
//!     "conv_1",
//!     ConversationEventKind::Exchange(ExchangeEvent::new(
//!         "ex_1",
//!         ExchangeEventKind::Message(MessageEvent::new(
//!             "msg_1",
//!             MessageEventKind::ContentPart(ContentPartEvent::new(
//!                 "part_1",
//!                 ContentPartEventKind::Chunk(ContentPartChunk::text("Hello")),
//!             )),
//!         )),
//!     )),
//! );
//! let json_line = chunk.to_json_line().unwrap();
//! assert!(json_line.contains("\"contentPartId\":\"part_1\""));
//! ```

mod content_part;
mod envelope;
mod error;
mod exchange;
mod input_stream;
mod message;
mod session;
mod tool_call;
mod traits;

pub use content_part::{
    CitationBoundary, CitationEnd, CitationMarker, CitationSource, CitationStart,
    ContentPartChunk, ContentPartEvent, ContentPartEventKind, EndContentPart, ExternalValue,
    StartContentPart,
};
pub use envelope::{ConversationEvent, ConversationEventKind};
pub use error::{ErrorEnd, ErrorEvent, ErrorEventKind, ErrorStart};
pub use exchange::{EndExchange, ExchangeEvent, ExchangeEventKind, StartExchange};
pub use input_stream::{
    AsyncInputStreamChunk, AsyncInputStreamEvent, AsyncInputStreamEventKind, EndAsyncInputStream,
    StartAsyncInputStream,
};
pub use message::{
    EndInterrupt, EndMessage, InterruptEvent, InterruptEventKind, MessageEvent, MessageEventKind,
    Role, StartInterrupt, StartMessage,
};
pub use session::{
    EndSession, LabelUpdated, MetaEvent, Metadata, SessionCapabilities, SessionEnding,
    SessionStarted, StartSession,
};
pub use tool_call::{EndToolCall, StartToolCall, ToolCallEvent, ToolCallEventKind};
pub use traits::{EntityEvent, EventClass};

#[cfg(test)]
mod tests;
