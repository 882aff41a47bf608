//! Content part events, chunks and citation markers

use serde::{Deserialize, Serialize};

use super::{ErrorEvent, MetaEvent, Metadata};
use crate::codec::wire::WireContentPartEvent;

/// One streamed unit of message content, addressed by `contentPartId`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireContentPartEvent", into = "WireContentPartEvent")]
pub struct ContentPartEvent {
    /// Content part identifier, unique within its message
    pub content_part_id: String,
    /// Payload
    pub kind: ContentPartEventKind,
}

/// Payload variants of a [`ContentPartEvent`]
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPartEventKind {
    /// `startContentPart`
    Start(StartContentPart),
    /// `endContentPart`
    End(EndContentPart),
    /// `chunk`
    Chunk(ContentPartChunk),
    /// `metaEvent`
    Meta(MetaEvent),
    /// `contentPartError`
    Error(ErrorEvent),
    /// No recognized payload
    Unknown,
}

/// Reference to content stored outside the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalValue {
    /// Location of the content
    pub uri: String,
    /// Size in bytes, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_count: Option<u64>,
}

/// Opens a content part; the MIME type is fixed here
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartContentPart {
    /// MIME type of the concatenated chunk data
    pub mime_type: String,
    /// Out-of-band content reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_value: Option<ExternalValue>,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Closes a content part
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndContentPart {
    /// Index of the final chunk as counted by the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_chunk_index: Option<u64>,
    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// One incremental fragment of a content part
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPartChunk {
    /// Data appended to the part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Citation boundary carried by this chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<CitationMarker>,
}

/// Opens and/or closes a citation range.
///
/// A marker with only `startCitation` (or neither half) opens the range, one
/// with only `endCitation` closes it, and one carrying both is an atomic
/// citation covering exactly this chunk's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationMarker {
    /// Citation identifier shared by the open and close markers
    pub citation_id: String,
    /// Present when this chunk opens the citation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_citation: Option<CitationStart>,
    /// Present when this chunk closes the citation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_citation: Option<CitationEnd>,
}

/// Open half of a citation marker
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CitationStart {}

/// Close half of a citation marker
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CitationEnd {
    /// Sources backing the cited range
    pub sources: Vec<CitationSource>,
}

/// An external source backing a citation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationSource {
    /// Display title
    pub title: String,
    /// Footnote number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    /// Web URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Download link for document sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Page within a document source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

/// How a chunk's citation marker should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationBoundary<'a> {
    /// Opens `citation_id`
    Open,
    /// Closes `citation_id` with these sources
    Close(&'a [CitationSource]),
    /// Opens and closes in the same chunk
    Atomic(&'a [CitationSource]),
}

impl CitationMarker {
    /// Open marker for `citation_id`
    pub fn open(citation_id: impl Into<String>) -> Self {
        Self {
            citation_id: citation_id.into(),
            start_citation: Some(CitationStart {}),
            end_citation: None,
        }
    }

    /// Close marker for `citation_id`
    pub fn close(citation_id: impl Into<String>, sources: Vec<CitationSource>) -> Self {
        Self {
            citation_id: citation_id.into(),
            start_citation: None,
            end_citation: Some(CitationEnd { sources }),
        }
    }

    /// Marker that opens and closes `citation_id` in one chunk
    pub fn atomic(citation_id: impl Into<String>, sources: Vec<CitationSource>) -> Self {
        Self {
            citation_id: citation_id.into(),
            start_citation: Some(CitationStart {}),
            end_citation: Some(CitationEnd { sources }),
        }
    }

    /// Classify this marker
    pub fn boundary(&self) -> CitationBoundary<'_> {
        match (&self.start_citation, &self.end_citation) {
            (Some(_), Some(end)) => CitationBoundary::Atomic(&end.sources),
            (None, Some(end)) => CitationBoundary::Close(&end.sources),
            _ => CitationBoundary::Open,
        }
    }
}

impl CitationSource {
    /// A source with a title and URL
    pub fn url(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

impl ContentPartChunk {
    /// A plain data chunk
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            citation: None,
        }
    }

    /// A chunk carrying only a citation marker
    pub fn marker(citation: CitationMarker) -> Self {
        Self {
            data: None,
            citation: Some(citation),
        }
    }

    /// Attach a citation marker
    pub fn with_citation(mut self, citation: CitationMarker) -> Self {
        self.citation = Some(citation);
        self
    }
}

impl StartContentPart {
    /// Start a part with `mime_type`
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            external_value: None,
            metadata: None,
        }
    }

    /// Plain text part
    pub fn text() -> Self {
        Self::new("text/plain")
    }

    /// Markdown part
    pub fn markdown() -> Self {
        Self::new("text/markdown")
    }
}

impl ContentPartEvent {
    /// Wrap a payload for `content_part_id`
    pub fn new(content_part_id: impl Into<String>, kind: ContentPartEventKind) -> Self {
        Self {
            content_part_id: content_part_id.into(),
            kind,
        }
    }
}
