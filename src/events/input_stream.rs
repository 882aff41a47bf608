//! Async input stream events (session-scoped raw input such as audio)

use serde::{Deserialize, Serialize};

use super::{ErrorEvent, MetaEvent, Metadata};
use crate::codec::wire::WireAsyncInputStreamEvent;

/// A session-scoped raw input stream, addressed by `streamId`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireAsyncInputStreamEvent", into = "WireAsyncInputStreamEvent")]
pub struct AsyncInputStreamEvent {
    /// Stream identifier, unique within the session
    pub stream_id: String,
    /// Payload
    pub kind: AsyncInputStreamEventKind,
}

/// Payload variants of an [`AsyncInputStreamEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncInputStreamEventKind {
    /// `startAsyncInputStream`
    Start(StartAsyncInputStream),
    /// `endAsyncInputStream`
    End(EndAsyncInputStream),
    /// `chunk`
    Chunk(AsyncInputStreamChunk),
    /// `metaEvent`
    Meta(MetaEvent),
    /// `asyncInputStreamError`
    Error(ErrorEvent),
    /// No recognized payload
    Unknown,
}

/// Opens an input stream
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAsyncInputStream {
    /// MIME type of the raw data (e.g. `audio/pcm;rate=24000`)
    pub mime_type: String,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Closes an input stream
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndAsyncInputStream {
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Raw data fragment (typically base64-encoded audio)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AsyncInputStreamChunk {
    /// Encoded data
    pub data: String,
}

impl StartAsyncInputStream {
    /// Open a stream of `mime_type`
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            metadata: None,
        }
    }
}

impl AsyncInputStreamEvent {
    /// Wrap a payload for `stream_id`
    pub fn new(stream_id: impl Into<String>, kind: AsyncInputStreamEventKind) -> Self {
        Self {
            stream_id: stream_id.into(),
            kind,
        }
    }
}
