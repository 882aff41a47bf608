//! Tests for the events module

use super::*;
use serde_json::json;

#[test]
fn test_citation_boundaries() {
    let sources = vec![CitationSource::url("Atlas", "https://example.org")];

    assert_eq!(CitationMarker::open("c1").boundary(), CitationBoundary::Open);
    assert_eq!(
        CitationMarker::close("c1", sources.clone()).boundary(),
        CitationBoundary::Close(&sources)
    );
    assert_eq!(
        CitationMarker::atomic("c1", sources.clone()).boundary(),
        CitationBoundary::Atomic(&sources)
    );

    // An id with neither marker opens
    let bare = CitationMarker {
        citation_id: "c2".to_string(),
        start_citation: None,
        end_citation: None,
    };
    assert_eq!(bare.boundary(), CitationBoundary::Open);
}

#[test]
fn test_citation_sources_compare_by_value() {
    fn total_eq<T: Eq>(a: &T, b: &T) -> bool {
        a == b
    }

    let atlas = CitationSource::url("Atlas", "https://example.org");
    let mut paged = atlas.clone();
    paged.page_number = Some(12);
    assert!(total_eq(&atlas, &atlas.clone()));
    assert!(!total_eq(&atlas, &paged));

    let marker = CitationMarker::close("c1", vec![paged.clone()]);
    assert!(total_eq(
        &marker.boundary(),
        &CitationBoundary::Close(std::slice::from_ref(&paged))
    ));
}

#[test]
fn test_capability_mime_matching() {
    let caps = SessionCapabilities {
        mime_types_handled: Some(vec!["text/*".to_string(), "image/PNG".to_string()]),
        ..Default::default()
    };
    assert!(caps.handles_mime_type("text/plain"));
    assert!(caps.handles_mime_type("image/png"));
    assert!(!caps.handles_mime_type("audio/wav"));
    // Unspecified lists accept everything
    assert!(caps.emits_mime_type("audio/wav"));

    let any = SessionCapabilities {
        mime_types_emitted: Some(vec!["*/*".to_string()]),
        ..Default::default()
    };
    assert!(any.emits_mime_type("application/json"));
}

#[test]
fn test_meta_from_non_object() {
    let meta = MetaEvent::from_value(json!(42));
    assert_eq!(meta.get("value"), Some(&json!(42)));

    let meta = MetaEvent::from_value(json!({"progress": 0.5}));
    assert_eq!(meta.get("progress"), Some(&json!(0.5)));

    let answer = EndInterrupt::from_value(json!("approved"));
    assert_eq!(answer.0.get("value"), Some(&json!("approved")));
}

#[test]
fn test_entity_event_class() {
    let part = ContentPartEvent::new(
        "p1",
        ContentPartEventKind::Chunk(ContentPartChunk::text("x")),
    );
    assert_eq!(part.entity_id(), "p1");
    assert_eq!(part.class(), EventClass::Chunk);

    let message = MessageEvent::new("m1", MessageEventKind::ContentPart(part));
    assert_eq!(message.class(), EventClass::Child);

    let error = ErrorEvent::end("e1");
    assert_eq!(error.class(), EventClass::Error);
    let unknown = ErrorEvent {
        error_id: "e2".to_string(),
        kind: ErrorEventKind::Unknown,
    };
    assert_eq!(unknown.class(), EventClass::Unknown);
}

#[test]
fn test_session_level_classification() {
    let started = ConversationEvent::new(
        "c",
        ConversationEventKind::SessionStarted(SessionStarted::default()),
    );
    assert!(started.is_session_level());
    assert!(started.opens_session());

    let label = ConversationEvent::new(
        "c",
        ConversationEventKind::LabelUpdated(LabelUpdated::new("Trip planning")),
    );
    assert!(label.is_session_level());
    assert!(!label.opens_session());
    assert_eq!(label.class(), EventClass::Session);

    let stream = ConversationEvent::new(
        "c",
        ConversationEventKind::AsyncInputStream(AsyncInputStreamEvent::new(
            "mic",
            AsyncInputStreamEventKind::Chunk(AsyncInputStreamChunk {
                data: "AAAA".to_string(),
            }),
        )),
    );
    assert!(!stream.is_session_level());
    assert_eq!(stream.class(), EventClass::Child);
}

#[test]
fn test_tool_call_end_helpers() {
    let ok = EndToolCall::success(json!({"rows": 3}));
    assert_eq!(ok.is_error, Some(false));
    let failed = EndToolCall::error(json!("timeout"));
    assert_eq!(failed.is_error, Some(true));
    let cancelled = EndToolCall::cancelled();
    assert_eq!(cancelled.cancelled, Some(true));
    assert!(cancelled.output.is_none());
}

#[test]
fn test_payload_wire_names() {
    let start = StartInterrupt::new("toolApproval", json!({"tool": "rm"}));
    assert_eq!(
        serde_json::to_value(&start).unwrap(),
        json!({"type": "toolApproval", "value": {"tool": "rm"}})
    );

    let label = LabelUpdated::new("Trip");
    assert_eq!(serde_json::to_value(&label).unwrap(), json!({"label": "Trip"}));

    let ending = SessionEnding {
        time_to_live_ms: 250,
    };
    assert_eq!(
        serde_json::to_value(&ending).unwrap(),
        json!({"timeToLiveMS": 250})
    );
}
