//! Envelope codec
//!
//! Converts [`ConversationEvent`] envelopes to and from transport frames.
//! Text frames carry one JSON object per frame; binary frames carry the same
//! JSON as UTF-8 bytes. [`decode_lines`] reads a JSON Lines stream.

pub(crate) mod wire;

use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::events::ConversationEvent;

/// How envelopes are framed for the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameFormat {
    /// JSON text frames
    #[default]
    Text,
    /// JSON bytes
    Binary,
}

/// One transport frame carrying exactly one envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
}

impl Frame {
    /// Raw bytes of the frame
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }

    /// Format of the frame
    pub fn format(&self) -> FrameFormat {
        match self {
            Self::Text(_) => FrameFormat::Text,
            Self::Binary(_) => FrameFormat::Binary,
        }
    }
}

impl ConversationEvent {
    /// Serialize to a single line of JSON (no trailing newline)
    pub fn to_json_line(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one JSON object
    pub fn from_json_line(line: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

/// Encode an envelope as a frame
pub fn encode_frame(event: &ConversationEvent, format: FrameFormat) -> Result<Frame, CodecError> {
    Ok(match format {
        FrameFormat::Text => Frame::Text(serde_json::to_string(event)?),
        FrameFormat::Binary => Frame::Binary(serde_json::to_vec(event)?),
    })
}

/// Decode a frame into an envelope
pub fn decode_frame(frame: &Frame) -> Result<ConversationEvent, CodecError> {
    Ok(match frame {
        Frame::Text(text) => serde_json::from_str(text)?,
        Frame::Binary(bytes) => serde_json::from_slice(bytes)?,
    })
}

/// Iterate over the envelopes of a JSON Lines stream. Blank lines are skipped.
pub fn decode_lines<R: BufRead>(
    reader: R,
) -> impl Iterator<Item = Result<ConversationEvent, CodecError>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(ConversationEvent::from_json_line(&line)),
        Err(e) => Some(Err(CodecError::Io(e))),
    })
}

#[cfg(test)]
mod tests;
