//! Tests for the session facade

use std::sync::{Arc, Mutex};

use serde_json::json;

use super::*;
use crate::codec::{encode_frame, FrameFormat};
use crate::config::AbandonPolicy;
use crate::emission::MemoryTransport;
use crate::events::*;
use crate::state::Termination;

const CONV: &str = "conv_1";

type Recorded = Arc<Mutex<Vec<SessionEvent>>>;

fn new_session(config: SessionConfig) -> Session<MemoryTransport> {
    Session::new(SessionBootstrap::new(CONV), MemoryTransport::new(), config)
}

/// Client session that has already seen `sessionStarted`
fn started_session(config: SessionConfig) -> Session<MemoryTransport> {
    let mut session = new_session(config);
    session.start_session().unwrap();
    session.receive(session_started()).unwrap();
    session.transport_mut().take();
    session
}

fn record(session: &mut Session<MemoryTransport>, topic: Topic) -> Recorded {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.subscribe(topic, move |e| sink.lock().unwrap().push(e.clone()));
    seen
}

fn session_started() -> ConversationEvent {
    ConversationEvent::new(
        CONV,
        ConversationEventKind::SessionStarted(SessionStarted::default()),
    )
}

fn inbound_exchange(exchange_id: &str, kind: ExchangeEventKind) -> ConversationEvent {
    ConversationEvent::new(
        CONV,
        ConversationEventKind::Exchange(ExchangeEvent::new(exchange_id, kind)),
    )
}

fn inbound_message(kind: MessageEventKind) -> ConversationEvent {
    inbound_exchange(
        "ex_1",
        ExchangeEventKind::Message(MessageEvent::new("msg_1", kind)),
    )
}

fn inbound_part(kind: ContentPartEventKind) -> ConversationEvent {
    inbound_message(MessageEventKind::ContentPart(ContentPartEvent::new("p1", kind)))
}

fn classes(seen: &Recorded) -> Vec<EventClass> {
    seen.lock().unwrap().iter().map(|e| e.class()).collect()
}

#[test]
fn test_pre_start_events_applied_in_order() {
    let mut session = new_session(SessionConfig::default());
    let seen = record(&mut session, Topic::all());
    session.start_session().unwrap();

    session
        .receive(inbound_exchange("ex_1", ExchangeEventKind::Start(StartExchange::default())))
        .unwrap();
    session
        .receive(inbound_message(MessageEventKind::Start(StartMessage::new(Role::Assistant))))
        .unwrap();
    assert_eq!(session.phase(&EntityRef::exchange("ex_1")), None);
    assert!(seen.lock().unwrap().is_empty());

    session.receive(session_started()).unwrap();

    assert_eq!(
        session.phase(&EntityRef::message("ex_1", "msg_1")),
        Some(Phase::Active)
    );
    let kinds: Vec<_> = seen
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.entity.kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            crate::registry::EntityKind::Session,
            crate::registry::EntityKind::Exchange,
            crate::registry::EntityKind::Message,
        ]
    );
}

#[test]
fn test_pre_start_without_buffering_is_violation() {
    let config = SessionConfig {
        buffer_before_started: false,
        surface_violations: true,
        ..Default::default()
    };
    let mut session = new_session(config);
    let seen = record(&mut session, Topic::all().class(EventClass::Violation));

    session
        .receive(inbound_exchange("ex_1", ExchangeEventKind::Start(StartExchange::default())))
        .unwrap();
    session.receive(session_started()).unwrap();

    assert_eq!(session.phase(&EntityRef::exchange("ex_1")), None);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].kind,
        SessionEventKind::Violation(ViolationKind::SessionNotStarted)
    );
}

#[test]
fn test_pre_start_buffer_full() {
    let config = SessionConfig {
        max_pre_start_buffer: 1,
        surface_violations: true,
        ..Default::default()
    };
    let mut session = new_session(config);
    let seen = record(&mut session, Topic::all().class(EventClass::Violation));

    session
        .receive(inbound_exchange("ex_1", ExchangeEventKind::Start(StartExchange::default())))
        .unwrap();
    session
        .receive(inbound_exchange("ex_2", ExchangeEventKind::Start(StartExchange::default())))
        .unwrap();
    session.receive(session_started()).unwrap();

    assert_eq!(session.phase(&EntityRef::exchange("ex_1")), Some(Phase::Active));
    assert_eq!(session.phase(&EntityRef::exchange("ex_2")), None);
    assert_eq!(
        seen.lock().unwrap()[0].kind,
        SessionEventKind::Violation(ViolationKind::BufferFull)
    );
}

#[test]
fn test_outbound_held_until_started() {
    let mut session = new_session(SessionConfig::default());
    session.start_session().unwrap();
    session.exchange("ex_1").start(StartExchange::default()).unwrap();

    assert_eq!(session.transport().frames().len(), 1);
    assert_eq!(session.pending_emits(), 1);
    assert_eq!(session.phase(&EntityRef::exchange("ex_1")), Some(Phase::Active));

    session.receive(session_started()).unwrap();
    let sent = session.transport().decoded();
    assert_eq!(sent.len(), 2);
    assert!(matches!(sent[1].kind, ConversationEventKind::Exchange(_)));
    assert_eq!(session.pending_emits(), 0);
}

#[test]
fn test_service_accepts_session() {
    let mut session = new_session(SessionConfig::default());
    session
        .receive(ConversationEvent::new(
            CONV,
            ConversationEventKind::StartSession(StartSession::with_capabilities(
                SessionCapabilities {
                    mime_types_handled: Some(vec!["text/*".to_string()]),
                    ..Default::default()
                },
            )),
        ))
        .unwrap();
    assert_eq!(session.phase(&EntityRef::Session), Some(Phase::Pending));
    assert!(session.peer_handles_mime_type("text/markdown"));
    assert!(!session.peer_handles_mime_type("audio/wav"));

    session.accept_session().unwrap();
    assert_eq!(session.phase(&EntityRef::Session), Some(Phase::Active));
    assert!(matches!(
        session.transport().decoded()[0].kind,
        ConversationEventKind::SessionStarted(_)
    ));
}

#[test]
fn test_duplicate_inbound_start_keeps_first() {
    let mut session = started_session(SessionConfig::default());
    let call = |name: &str| {
        inbound_message(MessageEventKind::ToolCall(ToolCallEvent::new(
            "t1",
            ToolCallEventKind::Start(StartToolCall::new(name, json!({}))),
        )))
    };
    session
        .receive(inbound_exchange("ex_1", ExchangeEventKind::Start(StartExchange::default())))
        .unwrap();
    session
        .receive(inbound_message(MessageEventKind::Start(StartMessage::new(Role::Assistant))))
        .unwrap();
    session.receive(call("search")).unwrap();
    session.receive(call("fetch")).unwrap();

    let message = session
        .registry()
        .exchange("ex_1")
        .and_then(|e| e.message("msg_1"))
        .unwrap();
    let start = message.tool_call("t1").unwrap().lifecycle().start_event().unwrap();
    assert_eq!(start.tool_name, "search");
}

#[test]
fn test_outbound_premature_end_is_rejected() {
    let mut session = started_session(SessionConfig::default());
    let mut exchange = session.exchange("ex_1");
    let err = exchange.end(EndExchange::default()).unwrap_err();

    assert_eq!(err.violation_kind(), Some(ViolationKind::PrematureEnd));
    assert!(session.transport().frames().is_empty());
    assert_eq!(session.phase(&EntityRef::exchange("ex_1")), None);
}

#[test]
fn test_inbound_premature_end_completes_empty() {
    let mut session = started_session(SessionConfig::default());
    session
        .receive(inbound_exchange("ex_9", ExchangeEventKind::End(EndExchange::default())))
        .unwrap();

    let Some(CompletedRecord::Exchange(record)) = session.completed(&EntityRef::exchange("ex_9"))
    else {
        panic!("exchange not completed");
    };
    assert!(record.start.is_none());
    assert!(record.messages.is_empty());
}

#[test]
fn test_synthetic_end_inside_completed_message() {
    let mut session = started_session(SessionConfig::default());
    let mut exchange = session.exchange("ex_1");
    exchange.start(StartExchange::default()).unwrap();
    let mut message = exchange.message("msg_1");
    message.start(StartMessage::new(Role::Assistant)).unwrap();
    let mut part = message.content_part("p1");
    part.start(StartContentPart::text()).unwrap();
    part.text("half a sent").unwrap();
    message.end(EndMessage::default()).unwrap();

    let Some(CompletedRecord::Message(record)) =
        session.completed(&EntityRef::message("ex_1", "msg_1"))
    else {
        panic!("message not completed");
    };
    assert_eq!(record.content_parts.len(), 1);
    assert_eq!(record.content_parts[0].data, "half a sent");
    assert_eq!(record.content_parts[0].termination, Termination::Abnormal);
    assert_eq!(record.termination, Termination::Normal);
}

#[test]
fn test_async_tool_call_spans_exchanges() {
    let mut session = started_session(SessionConfig::default());
    session.exchange("ex_a").start(StartExchange::default()).unwrap();
    session
        .async_tool_call("bg_1")
        .start(StartToolCall::new("index_repo", json!({"path": "/src"})))
        .unwrap();
    session.exchange("ex_a").end(EndExchange::default()).unwrap();
    session.exchange("ex_b").start(StartExchange::default()).unwrap();

    session
        .receive(ConversationEvent::new(
            CONV,
            ConversationEventKind::AsyncToolCall(ToolCallEvent::new(
                "bg_1",
                ToolCallEventKind::End(EndToolCall::success(json!({"files": 12}))),
            )),
        ))
        .unwrap();

    let Some(CompletedRecord::ToolCall(record)) =
        session.completed(&EntityRef::async_tool_call("bg_1"))
    else {
        panic!("async tool call not completed");
    };
    assert_eq!(record.tool_name.as_deref(), Some("index_repo"));
    assert_eq!(record.output, Some(json!({"files": 12})));
    assert_eq!(session.phase(&EntityRef::exchange("ex_a")), Some(Phase::Ended));
    assert_eq!(session.phase(&EntityRef::exchange("ex_b")), Some(Phase::Active));
}

#[test]
fn test_on_complete_late_fires_once() {
    let mut session = started_session(SessionConfig::default());
    let mut exchange = session.exchange("ex_1");
    exchange.start(StartExchange::default()).unwrap();
    exchange.end(EndExchange::default()).unwrap();

    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    let id = session.on_complete(EntityRef::exchange("ex_1"), move |e| {
        sink.lock().unwrap().push(e.origin)
    });

    assert!(id.is_none());
    assert_eq!(*fired.lock().unwrap(), vec![Origin::Retained]);
    assert_eq!(session.observer_count(), 0);
}

#[test]
fn test_on_complete_before_end() {
    let mut session = started_session(SessionConfig::default());
    let fired = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&fired);
    let id = session.on_complete(EntityRef::exchange("ex_1"), move |_| {
        *sink.lock().unwrap() += 1
    });
    assert!(id.is_some());

    session
        .receive(inbound_exchange("ex_1", ExchangeEventKind::Start(StartExchange::default())))
        .unwrap();
    session
        .receive(inbound_exchange("ex_1", ExchangeEventKind::End(EndExchange::default())))
        .unwrap();
    assert_eq!(*fired.lock().unwrap(), 1);
    assert_eq!(session.observer_count(), 0);
}

#[test]
fn test_scoped_subscription_retired_on_completion() {
    let mut session = started_session(SessionConfig::default());
    let seen = record(&mut session, Topic::within(EntityRef::message("ex_1", "msg_1")));
    session
        .receive(inbound_exchange("ex_1", ExchangeEventKind::Start(StartExchange::default())))
        .unwrap();
    session
        .receive(inbound_message(MessageEventKind::Start(StartMessage::new(Role::Assistant))))
        .unwrap();
    session
        .receive(inbound_part(ContentPartEventKind::Start(StartContentPart::text())))
        .unwrap();
    session
        .receive(inbound_part(ContentPartEventKind::Chunk(ContentPartChunk::text("hi"))))
        .unwrap();
    session
        .receive(inbound_message(MessageEventKind::End(EndMessage::default())))
        .unwrap();
    let before = seen.lock().unwrap().len();

    session
        .receive(inbound_message(MessageEventKind::Meta(MetaEvent::default())))
        .unwrap();
    assert_eq!(seen.lock().unwrap().len(), before);
    assert_eq!(
        classes(&seen).last(),
        Some(&EventClass::Completed)
    );
}

#[test]
fn test_any_error_observer() {
    let mut session = started_session(SessionConfig::default());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    session.on_any_error(move |e| sink.lock().unwrap().push(e.entity.clone()));

    session
        .receive(inbound_exchange(
            "ex_1",
            ExchangeEventKind::Error(ErrorEvent::start("e1", "rate limited")),
        ))
        .unwrap();
    session
        .receive(ConversationEvent::new(
            CONV,
            ConversationEventKind::Error(ErrorEvent::start("e2", "degraded")),
        ))
        .unwrap();

    assert_eq!(
        *errors.lock().unwrap(),
        vec![EntityRef::exchange("ex_1"), EntityRef::Session]
    );
    assert_eq!(session.open_errors(&EntityRef::exchange("ex_1")).len(), 1);
}

#[test]
fn test_failed_write_stays_buffered() {
    let mut session = started_session(SessionConfig::default());
    session.transport_mut().set_offline(true);
    let err = session
        .exchange("ex_1")
        .start(StartExchange::default())
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Transport(_)));
    assert_eq!(session.phase(&EntityRef::exchange("ex_1")), Some(Phase::Active));
    assert!(session.emits_paused());
    assert_eq!(session.pending_emits(), 1);

    session.transport_mut().set_offline(false);
    assert_eq!(session.resume_emits().unwrap(), 1);
    let sent = session.transport().decoded();
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].kind, ConversationEventKind::Exchange(_)));
}

#[test]
fn test_failed_release_keeps_held_order() {
    let mut session = new_session(SessionConfig::default());
    session.start_session().unwrap();
    session.transport_mut().take();
    {
        let mut exchange = session.exchange("ex_1");
        exchange.start(StartExchange::default()).unwrap();
        exchange.meta(MetaEvent::from_value(json!({"step": 1}))).unwrap();
    }

    session.transport_mut().set_offline(true);
    let err = session.receive(session_started()).unwrap_err();
    assert!(matches!(err, ProtocolError::Transport(_)));
    assert_eq!(session.phase(&EntityRef::Session), Some(Phase::Active));
    assert_eq!(session.pending_emits(), 2);

    session.transport_mut().set_offline(false);
    session
        .exchange("ex_1")
        .message("msg_1")
        .start(StartMessage::new(Role::Assistant))
        .unwrap();
    assert!(session.transport().frames().is_empty());

    assert_eq!(session.resume_emits().unwrap(), 3);
    let kinds: Vec<_> = session
        .transport()
        .decoded()
        .into_iter()
        .map(|e| match e.kind {
            ConversationEventKind::Exchange(exchange) => match exchange.kind {
                ExchangeEventKind::Start(_) => "start",
                ExchangeEventKind::Meta(_) => "meta",
                ExchangeEventKind::Message(_) => "message",
                _ => "other",
            },
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["start", "meta", "message"]);
}

#[test]
fn test_pause_resume_three_emits() {
    let mut session = started_session(SessionConfig::default());
    session.pause_emits();
    session.update_label(LabelUpdated::new("one")).unwrap();
    session.update_label(LabelUpdated::new("two")).unwrap();
    session.update_label(LabelUpdated::new("three")).unwrap();
    assert!(session.transport().frames().is_empty());
    assert_eq!(session.label().map(|l| l.label.as_str()), Some("three"));

    assert_eq!(session.resume_emits().unwrap(), 3);
    let labels: Vec<_> = session
        .transport()
        .decoded()
        .into_iter()
        .filter_map(|e| match e.kind {
            ConversationEventKind::LabelUpdated(l) => Some(l.label),
            _ => None,
        })
        .collect();
    assert_eq!(labels, vec!["one", "two", "three"]);
}

#[test]
fn test_echo_mode() {
    let mut quiet = started_session(SessionConfig::default());
    let quiet_seen = record(&mut quiet, Topic::all());
    quiet.exchange("ex_1").start(StartExchange::default()).unwrap();
    assert!(quiet_seen.lock().unwrap().is_empty());
    assert_eq!(quiet.phase(&EntityRef::exchange("ex_1")), Some(Phase::Active));

    let mut echo = started_session(SessionConfig::default().with_echo(true));
    let echo_seen = record(&mut echo, Topic::all());
    echo.exchange("ex_1").start(StartExchange::default()).unwrap();
    let seen = echo_seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].origin, Origin::Local);
}

#[test]
fn test_session_end_rejects_further_emits() {
    let mut session = started_session(SessionConfig::default());
    session.exchange("ex_1").start(StartExchange::default()).unwrap();
    session.end_session(None).unwrap();

    assert_eq!(
        session.completed(&EntityRef::exchange("ex_1")).map(|r| r.termination()),
        Some(Termination::Abnormal)
    );
    let err = session.update_label(LabelUpdated::new("late")).unwrap_err();
    assert!(matches!(err, ProtocolError::SessionEnded));
}

#[test]
fn test_drop_policy_on_session_end() {
    let config = SessionConfig::default().with_abandon_policy(AbandonPolicy::Drop);
    let mut session = started_session(config);
    session.exchange("ex_1").start(StartExchange::default()).unwrap();
    session.end_session(None).unwrap();

    assert!(session.completed(&EntityRef::exchange("ex_1")).is_none());
    assert_eq!(session.phase(&EntityRef::exchange("ex_1")), Some(Phase::Ended));
}

#[test]
fn test_unknown_and_foreign_events_are_ignored() {
    let mut session = started_session(SessionConfig::default());
    let seen = record(&mut session, Topic::all());
    session
        .receive(ConversationEvent::new(CONV, ConversationEventKind::Unknown))
        .unwrap();
    session
        .receive(inbound_exchange("ex_1", ExchangeEventKind::Unknown))
        .unwrap();
    session
        .receive(ConversationEvent::new(
            "conv_other",
            ConversationEventKind::LabelUpdated(LabelUpdated::new("x")),
        ))
        .unwrap();
    assert!(seen.lock().unwrap().is_empty());
    assert!(session.label().is_none());
}

#[test]
fn test_receive_frame() {
    let mut session = new_session(SessionConfig::default());
    let frame = encode_frame(&session_started(), FrameFormat::Binary).unwrap();
    session.receive_frame(&frame).unwrap();
    assert_eq!(session.phase(&EntityRef::Session), Some(Phase::Active));

    let err = session
        .receive_frame(&Frame::Text("{not json".to_string()))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Codec(_)));
}

#[test]
fn test_ending_deadline() {
    let mut session = started_session(SessionConfig::default());
    assert!(session.ending_deadline().is_none());
    session
        .receive(ConversationEvent::new(
            CONV,
            ConversationEventKind::SessionEnding(SessionEnding {
                time_to_live_ms: 30_000,
            }),
        ))
        .unwrap();
    assert!(session.ending_deadline().is_some());
}
