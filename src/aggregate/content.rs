//! Content part chunk accumulator

use tracing::{debug, trace};

use super::{Citation, CitationError, CitationErrorType};
use crate::events::{CitationBoundary, ContentPartChunk};

/// Accumulates a content part's chunks into its data and citation ranges.
///
/// Offsets are UTF-8 byte positions into the concatenated data. A citation
/// opened by one chunk covers that chunk's data and everything up to and
/// including the chunk that closes it. Distinct citation ids may overlap.
#[derive(Debug, Default, Clone)]
pub struct ContentAggregator {
    data: String,
    chunk_count: usize,
    // Open citations in the order they were opened
    open: Vec<(String, usize)>,
    citations: Vec<Citation>,
    errors: Vec<CitationError>,
}

/// Finished aggregation of one content part
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregatedContent {
    pub data: String,
    pub citations: Vec<Citation>,
    pub citation_errors: Vec<CitationError>,
}

impl ContentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one chunk
    pub fn process_chunk(&mut self, chunk: &ContentPartChunk) {
        let prior_len = self.data.len();
        if let Some(data) = &chunk.data {
            self.data.push_str(data);
        }
        self.chunk_count += 1;
        let new_len = self.data.len();
        trace!(prior_len, new_len, "content chunk");

        let Some(marker) = &chunk.citation else {
            return;
        };
        let citation_id = &marker.citation_id;
        match marker.boundary() {
            CitationBoundary::Open => {
                if self.open.iter().any(|(id, _)| id == citation_id) {
                    debug!(citation_id = %citation_id, "citation already open, keeping first");
                } else {
                    self.open.push((citation_id.clone(), prior_len));
                }
            }
            CitationBoundary::Close(sources) => {
                match self.open.iter().position(|(id, _)| id == citation_id) {
                    Some(index) => {
                        let (citation_id, offset) = self.open.remove(index);
                        self.citations.push(Citation {
                            citation_id,
                            offset,
                            length: new_len - offset,
                            sources: sources.to_vec(),
                        });
                    }
                    None => self.errors.push(CitationError {
                        citation_id: citation_id.clone(),
                        error_type: CitationErrorType::CitationNotStarted,
                    }),
                }
            }
            CitationBoundary::Atomic(sources) => self.citations.push(Citation {
                citation_id: citation_id.clone(),
                offset: prior_len,
                length: new_len - prior_len,
                sources: sources.to_vec(),
            }),
        }
    }

    /// Data accumulated so far
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Ids of citations currently open
    pub fn open_citations(&self) -> impl Iterator<Item = &str> {
        self.open.iter().map(|(id, _)| id.as_str())
    }

    /// Finish aggregation. Citations still open become `CitationNotEnded` errors.
    pub fn finish(mut self) -> AggregatedContent {
        for (citation_id, _) in self.open.drain(..) {
            self.errors.push(CitationError {
                citation_id,
                error_type: CitationErrorType::CitationNotEnded,
            });
        }
        AggregatedContent {
            data: self.data,
            citations: self.citations,
            citation_errors: self.errors,
        }
    }
}
