//! Tests for the observer registry

use std::sync::{Arc, Mutex};

use super::*;
use crate::aggregate::CompletedInterrupt;
use crate::events::{ErrorStart, MetaEvent};
use crate::state::Termination;

fn event(entity: EntityRef, kind: SessionEventKind) -> SessionEvent {
    SessionEvent {
        entity,
        kind,
        origin: Origin::Remote,
    }
}

fn meta(entity: EntityRef) -> SessionEvent {
    event(entity, SessionEventKind::Meta(MetaEvent::default()))
}

fn recorder(observers: &mut Observers, topic: Topic) -> Arc<Mutex<Vec<SessionEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    observers.subscribe(topic, move |e| sink.lock().unwrap().push(e.clone()));
    seen
}

#[test]
fn test_scope_matching() {
    let message = EntityRef::message("ex_1", "msg_1");
    let part = EntityRef::content_part("ex_1", "msg_1", "p1");
    let other = EntityRef::message("ex_1", "msg_2");

    let mut observers = Observers::new();
    let within = recorder(&mut observers, Topic::within(message.clone()));
    let exact = recorder(&mut observers, Topic::entity(message.clone()));
    let parts = recorder(&mut observers, Topic::all().of_kind(EntityKind::ContentPart));

    observers.notify(&meta(message.clone()));
    observers.notify(&meta(part.clone()));
    observers.notify(&meta(other));

    assert_eq!(within.lock().unwrap().len(), 2);
    assert_eq!(exact.lock().unwrap().len(), 1);
    assert_eq!(parts.lock().unwrap()[0].entity, part);
}

#[test]
fn test_error_topic() {
    let mut observers = Observers::new();
    let errors = recorder(&mut observers, Topic::errors());

    observers.notify(&meta(EntityRef::exchange("ex_1")));
    observers.notify(&event(
        EntityRef::async_tool_call("t1"),
        SessionEventKind::ErrorStarted {
            error_id: "e1".to_string(),
            error: ErrorStart::new("boom"),
        },
    ));

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].entity, EntityRef::async_tool_call("t1"));
}

#[test]
fn test_unsubscribe() {
    let mut observers = Observers::new();
    let id = observers.subscribe(Topic::all(), |_| {});
    assert_eq!(observers.len(), 1);
    assert!(observers.unsubscribe(id));
    assert!(!observers.unsubscribe(id));
    assert!(observers.is_empty());
}

#[test]
fn test_completion_retires_scoped_subscriptions() {
    let interrupt = EntityRef::interrupt("ex_1", "msg_1", "i1");
    let mut observers = Observers::new();
    let scoped = recorder(&mut observers, Topic::within(interrupt.clone()));
    let global = recorder(&mut observers, Topic::all());

    observers.notify(&event(
        interrupt.clone(),
        SessionEventKind::Completed(CompletedRecord::Interrupt(CompletedInterrupt {
            interrupt_id: "i1".to_string(),
            start: None,
            end: None,
            termination: Termination::Normal,
        })),
    ));
    observers.notify(&meta(interrupt));

    assert_eq!(scoped.lock().unwrap().len(), 1);
    assert_eq!(global.lock().unwrap().len(), 2);
    assert_eq!(observers.len(), 1);
}

#[test]
fn test_session_end_retires_everything() {
    let mut observers = Observers::new();
    observers.subscribe(Topic::all(), |_| {});
    observers.subscribe(Topic::errors(), |_| {});
    observers.notify(&event(
        EntityRef::Session,
        SessionEventKind::SessionEnded(Default::default()),
    ));
    assert!(observers.is_empty());
}
