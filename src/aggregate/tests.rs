//! Tests for completion aggregation

use super::*;
use crate::events::{CitationMarker, ContentPartChunk};
use serde_json::json;

fn source() -> CitationSource {
    CitationSource::url("Atlas", "https://example.org/atlas")
}

fn aggregate(chunks: &[ContentPartChunk]) -> AggregatedContent {
    let mut aggregator = ContentAggregator::new();
    for chunk in chunks {
        aggregator.process_chunk(chunk);
    }
    aggregator.finish()
}

#[test]
fn test_paris_citation() {
    let result = aggregate(&[
        ContentPartChunk::text("Paris is "),
        ContentPartChunk::marker(CitationMarker::open("c1")),
        ContentPartChunk::text("the capital"),
        ContentPartChunk::marker(CitationMarker::close("c1", vec![source()])),
        ContentPartChunk::text(" of France."),
    ]);

    assert_eq!(result.data, "Paris is the capital of France.");
    assert_eq!(
        result.citations,
        vec![Citation {
            citation_id: "c1".to_string(),
            offset: 9,
            length: 11,
            sources: vec![source()],
        }]
    );
    assert!(result.citation_errors.is_empty());
    assert_eq!(result.citations[0].slice(&result.data), Some("the capital"));
}

#[test]
fn test_unterminated_citation() {
    let result = aggregate(&[
        ContentPartChunk::text("a "),
        ContentPartChunk::text("b").with_citation(CitationMarker::open("c9")),
    ]);
    assert!(result.citations.is_empty());
    assert_eq!(
        result.citation_errors,
        vec![CitationError {
            citation_id: "c9".to_string(),
            error_type: CitationErrorType::CitationNotEnded,
        }]
    );
}

#[test]
fn test_close_without_open() {
    let result = aggregate(&[
        ContentPartChunk::text("text"),
        ContentPartChunk::marker(CitationMarker::close("ghost", vec![source()])),
        ContentPartChunk::text(" continues"),
    ]);
    assert_eq!(result.data, "text continues");
    assert!(result.citations.is_empty());
    assert_eq!(
        result.citation_errors[0].error_type,
        CitationErrorType::CitationNotStarted
    );
}

#[test]
fn test_atomic_citation_covers_its_chunk() {
    let result = aggregate(&[
        ContentPartChunk::text("See "),
        ContentPartChunk::text("the atlas").with_citation(CitationMarker::atomic("a", vec![source()])),
        ContentPartChunk::text("."),
    ]);
    assert_eq!(result.citations[0].offset, 4);
    assert_eq!(result.citations[0].length, 9);
}

#[test]
fn test_overlapping_citations() {
    let result = aggregate(&[
        ContentPartChunk::text("one ").with_citation(CitationMarker::open("outer")),
        ContentPartChunk::text("two ").with_citation(CitationMarker::open("inner")),
        ContentPartChunk::text("three").with_citation(CitationMarker::close("outer", vec![])),
        ContentPartChunk::text(" four").with_citation(CitationMarker::close("inner", vec![])),
    ]);
    let outer = &result.citations[0];
    let inner = &result.citations[1];
    assert_eq!(outer.slice(&result.data), Some("one two three"));
    assert_eq!(inner.slice(&result.data), Some("two three four"));
}

#[test]
fn test_duplicate_open_keeps_first() {
    let result = aggregate(&[
        ContentPartChunk::text("ab").with_citation(CitationMarker::open("c")),
        ContentPartChunk::text("cd").with_citation(CitationMarker::open("c")),
        ContentPartChunk::text("ef").with_citation(CitationMarker::close("c", vec![])),
    ]);
    assert_eq!(result.citations.len(), 1);
    assert_eq!(result.citations[0].offset, 0);
    assert_eq!(result.citations[0].length, 6);
}

#[test]
fn test_offsets_are_utf8_bytes() {
    let result = aggregate(&[
        ContentPartChunk::text("café "),
        ContentPartChunk::text("über").with_citation(CitationMarker::atomic("u", vec![])),
    ]);
    assert_eq!(result.citations[0].offset, "café ".len());
    assert_eq!(result.citations[0].slice(&result.data), Some("über"));
}

#[test]
fn test_tool_call_merge() {
    let start = StartToolCall::new("search", json!({"q": "rust"}));
    let end = EndToolCall::success(json!(["result"]));
    let merged = CompletedToolCall::merge("t1", Some(&start), Some(&end), Termination::Normal);
    assert_eq!(merged.tool_name.as_deref(), Some("search"));
    assert_eq!(merged.input, Some(json!({"q": "rust"})));
    assert_eq!(merged.output, Some(json!(["result"])));
    assert_eq!(merged.is_error, Some(false));
    assert_eq!(merged.cancelled, None);
}

#[test]
fn test_message_children_in_creation_order() {
    let part = |id: &str| CompletedContentPart {
        content_part_id: id.to_string(),
        start: Some(StartContentPart::text()),
        end: None,
        data: id.to_string(),
        citations: vec![],
        citation_errors: vec![],
        termination: Termination::Normal,
    };
    let mut aggregator = MessageAggregator::new();
    aggregator.add_content_part(2, part("second"));
    aggregator.add_content_part(1, part("first"));

    let message = aggregator.finish(
        "m1",
        Some(StartMessage::new(Role::Assistant)),
        None,
        Termination::Normal,
    );
    assert_eq!(message.role, Some(Role::Assistant));
    assert_eq!(message.content_parts[0].content_part_id, "first");
    assert_eq!(message.text(), "firstsecond");
}

#[test]
fn test_completed_record_wire_names() {
    let error = CitationError {
        citation_id: "c1".to_string(),
        error_type: CitationErrorType::CitationNotEnded,
    };
    assert_eq!(
        serde_json::to_value(&error).unwrap(),
        json!({"citationId": "c1", "errorType": "CitationNotEnded"})
    );
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Marker {
        None,
        Open(u8),
        Close(u8),
        Atomic(u8),
    }

    fn chunk() -> impl Strategy<Value = (Option<String>, Marker)> {
        let marker = prop_oneof![
            Just(Marker::None),
            (0u8..3).prop_map(Marker::Open),
            (0u8..3).prop_map(Marker::Close),
            (0u8..3).prop_map(Marker::Atomic),
        ];
        (proptest::option::of(".{0,6}"), marker)
    }

    proptest! {
        #[test]
        fn citations_always_slice_data(chunks in proptest::collection::vec(chunk(), 0..24)) {
            let mut aggregator = ContentAggregator::new();
            let mut expected = String::new();
            for (data, marker) in &chunks {
                let mut c = ContentPartChunk { data: data.clone(), citation: None };
                c.citation = match marker {
                    Marker::None => None,
                    Marker::Open(id) => Some(CitationMarker::open(id.to_string())),
                    Marker::Close(id) => Some(CitationMarker::close(id.to_string(), vec![])),
                    Marker::Atomic(id) => Some(CitationMarker::atomic(id.to_string(), vec![])),
                };
                if let Some(d) = data {
                    expected.push_str(d);
                }
                aggregator.process_chunk(&c);
            }
            let result = aggregator.finish();
            prop_assert_eq!(&result.data, &expected);
            for citation in &result.citations {
                prop_assert!(citation.slice(&result.data).is_some());
            }
        }
    }
}
