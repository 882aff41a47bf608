//! Tests for the envelope codec

use super::*;
use crate::events::*;
use serde_json::json;

fn chunk_event(text: &str) -> ConversationEvent {
    ConversationEvent::new(
        "conv_1",
        ConversationEventKind::Exchange(ExchangeEvent::new(
            "ex_1",
            ExchangeEventKind::Message(MessageEvent::new(
                "msg_1",
                MessageEventKind::ContentPart(ContentPartEvent::new(
                    "part_1",
                    ContentPartEventKind::Chunk(ContentPartChunk::text(text)),
                )),
            )),
        )),
    )
}

#[test]
fn test_nested_chunk_wire_shape() {
    let value = serde_json::to_value(chunk_event("Hello")).unwrap();
    assert_eq!(
        value,
        json!({
            "conversationId": "conv_1",
            "exchange": {
                "exchangeId": "ex_1",
                "message": {
                    "messageId": "msg_1",
                    "contentPart": {
                        "contentPartId": "part_1",
                        "chunk": { "data": "Hello" }
                    }
                }
            }
        })
    );
}

#[test]
fn test_session_ending_uses_ttl_key() {
    let event = ConversationEvent::new(
        "conv_1",
        ConversationEventKind::SessionEnding(SessionEnding {
            time_to_live_ms: 5000,
        }),
    );
    let line = event.to_json_line().unwrap();
    assert!(line.contains("\"sessionEnding\":{\"timeToLiveMS\":5000}"));
}

#[test]
fn test_decode_start_message_role() {
    let line = r#"{"conversationId":"c","exchange":{"exchangeId":"e","message":{"messageId":"m","startMessage":{"role":"assistant"}}}}"#;
    let event = ConversationEvent::from_json_line(line).unwrap();
    let ConversationEventKind::Exchange(exchange) = event.kind else {
        panic!("expected exchange");
    };
    let ExchangeEventKind::Message(message) = exchange.kind else {
        panic!("expected message");
    };
    match message.kind {
        MessageEventKind::Start(start) => assert_eq!(start.role, Role::Assistant),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_decode_citation_marker_halves() {
    let line = r#"{"conversationId":"c","exchange":{"exchangeId":"e","message":{"messageId":"m","contentPart":{"contentPartId":"p","chunk":{"citation":{"citationId":"c1","endCitation":{"sources":[{"title":"Atlas","url":"https://example.org"}]}}}}}}}"#;
    let event = ConversationEvent::from_json_line(line).unwrap();
    let json = serde_json::to_string(&event).unwrap();
    assert_eq!(json, line);
}

#[test]
fn test_unknown_payload_decodes_to_unknown() {
    let event =
        ConversationEvent::from_json_line(r#"{"conversationId":"c","futureThing":{"x":1}}"#)
            .unwrap();
    assert_eq!(event.kind, ConversationEventKind::Unknown);

    let nested = ConversationEvent::from_json_line(
        r#"{"conversationId":"c","exchange":{"exchangeId":"e","reaction":{}}}"#,
    )
    .unwrap();
    match nested.kind {
        ConversationEventKind::Exchange(ex) => assert_eq!(ex.kind, ExchangeEventKind::Unknown),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_unknown_round_trips_to_bare_envelope() {
    let event = ConversationEvent::new("c", ConversationEventKind::Unknown);
    assert_eq!(event.to_json_line().unwrap(), r#"{"conversationId":"c"}"#);
}

#[test]
fn test_two_variants_is_ambiguous() {
    let err = ConversationEvent::from_json_line(
        r#"{"conversationId":"c","startSession":{},"endSession":{}}"#,
    )
    .unwrap_err();
    // serde wraps the try_from error message in its own Json error
    assert!(err.to_string().contains("startSession, endSession"));

    let nested = ConversationEvent::from_json_line(
        r#"{"conversationId":"c","exchange":{"exchangeId":"e","startExchange":{},"endExchange":{}}}"#,
    );
    assert!(nested.is_err());
}

#[test]
fn test_missing_conversation_id_fails() {
    assert!(ConversationEvent::from_json_line(r#"{"endSession":{}}"#).is_err());
}

#[test]
fn test_frames() {
    let event = chunk_event("hi");
    let text = encode_frame(&event, FrameFormat::Text).unwrap();
    let binary = encode_frame(&event, FrameFormat::Binary).unwrap();
    assert_eq!(text.format(), FrameFormat::Text);
    assert_eq!(text.as_bytes(), binary.as_bytes());
    assert_eq!(decode_frame(&binary).unwrap(), event);
}

#[test]
fn test_decode_lines_skips_blank() {
    let input = format!(
        "{}\n\n   \n{}\n",
        chunk_event("a").to_json_line().unwrap(),
        chunk_event("b").to_json_line().unwrap()
    );
    let events: Vec<_> = decode_lines(input.as_bytes())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(events, vec![chunk_event("a"), chunk_event("b")]);
}

#[test]
fn test_decode_lines_reports_bad_line() {
    let input = "{\"conversationId\":\"c\"}\nnot json\n";
    let results: Vec<_> = decode_lines(input.as_bytes()).collect();
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(CodecError::Json(_))));
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn id() -> impl Strategy<Value = String> {
        "[a-z0-9_]{1,12}"
    }

    fn envelope() -> impl Strategy<Value = ConversationEvent> {
        let chunk = (id(), id(), id(), ".{0,24}").prop_map(|(ex, msg, part, data)| {
            ConversationEvent::new(
                "conv",
                ConversationEventKind::Exchange(ExchangeEvent::new(
                    ex,
                    ExchangeEventKind::Message(MessageEvent::new(
                        msg,
                        MessageEventKind::ContentPart(ContentPartEvent::new(
                            part,
                            ContentPartEventKind::Chunk(ContentPartChunk::text(data)),
                        )),
                    )),
                )),
            )
        });
        let tool = (id(), id(), any::<bool>()).prop_map(|(call, name, failed)| {
            let kind = if failed {
                ToolCallEventKind::End(EndToolCall::error(json!({"tool": name})))
            } else {
                ToolCallEventKind::Start(StartToolCall::new(name, json!({"n": 1})))
            };
            ConversationEvent::new(
                "conv",
                ConversationEventKind::AsyncToolCall(ToolCallEvent::new(call, kind)),
            )
        });
        let error = (id(), ".{0,16}").prop_map(|(err, msg)| {
            ConversationEvent::new(
                "conv",
                ConversationEventKind::Error(ErrorEvent::start(err, msg)),
            )
        });
        let ending = any::<u32>().prop_map(|ttl| {
            ConversationEvent::new(
                "conv",
                ConversationEventKind::SessionEnding(SessionEnding {
                    time_to_live_ms: u64::from(ttl),
                }),
            )
        });
        let stream = (id(), "[A-Za-z0-9+/]{0,32}").prop_map(|(sid, data)| {
            ConversationEvent::new(
                "conv",
                ConversationEventKind::AsyncInputStream(AsyncInputStreamEvent::new(
                    sid,
                    AsyncInputStreamEventKind::Chunk(AsyncInputStreamChunk { data }),
                )),
            )
        });
        prop_oneof![chunk, tool, error, ending, stream]
    }

    proptest! {
        #[test]
        fn codec_round_trip(event in envelope(), binary in any::<bool>()) {
            let format = if binary { FrameFormat::Binary } else { FrameFormat::Text };
            let frame = encode_frame(&event, format).unwrap();
            prop_assert_eq!(decode_frame(&frame).unwrap(), event);
        }
    }
}
