//! Tests for the entity registry

use super::*;
use crate::state::Termination;

fn completed_exchange(exchange_id: &str) -> CompletedExchange {
    CompletedExchange {
        exchange_id: exchange_id.to_string(),
        start: Some(StartExchange::default()),
        end: Some(EndExchange::default()),
        messages: Vec::new(),
        history: None,
        termination: Termination::Normal,
    }
}

#[test]
fn test_unseen_entities_have_no_phase() {
    let registry = EntityRegistry::default();
    assert_eq!(registry.phase(&EntityRef::Session), Some(Phase::Pending));
    assert_eq!(registry.phase(&EntityRef::exchange("ex_1")), None);
    assert_eq!(registry.phase(&EntityRef::message("ex_1", "m1")), None);
    assert!(registry.completed(&EntityRef::exchange("ex_1")).is_none());
}

#[test]
fn test_retention_cap_evicts_oldest() {
    let mut registry = EntityRegistry::new(Some(2));
    for id in ["ex_1", "ex_2", "ex_3"] {
        registry.retain_exchange(completed_exchange(id));
    }

    let retained: Vec<_> = registry
        .completed_exchanges()
        .map(|e| e.exchange_id.as_str())
        .collect();
    assert_eq!(retained, vec!["ex_2", "ex_3"]);
    assert!(registry.completed(&EntityRef::exchange("ex_1")).is_none());
    // Evicted ids are still known to have ended
    assert_eq!(registry.phase(&EntityRef::exchange("ex_1")), Some(Phase::Ended));
}

#[test]
fn test_restore_skips_live_exchange() {
    let mut registry = EntityRegistry::default();
    let mut entry = ExchangeEntry::new(EntityRef::exchange("ex_live"), registry.next_seq());
    entry.lifecycle.start(StartExchange::default()).unwrap();
    registry.exchanges.insert("ex_live".to_string(), entry);

    assert!(!registry.restore_exchange(completed_exchange("ex_live")));
    assert!(registry.restore_exchange(completed_exchange("ex_old")));
    assert_eq!(
        registry.phase(&EntityRef::exchange("ex_live")),
        Some(Phase::Active)
    );
    assert!(matches!(
        registry.completed(&EntityRef::exchange("ex_old")),
        Some(CompletedRecord::Exchange(_))
    ));
}

#[test]
fn test_message_lookup_through_retained_exchange() {
    let mut registry = EntityRegistry::default();
    let mut record = completed_exchange("ex_1");
    record.messages.push(CompletedMessage {
        message_id: "m1".to_string(),
        role: None,
        start: None,
        end: None,
        content_parts: Vec::new(),
        tool_calls: vec![CompletedToolCall {
            tool_call_id: "t1".to_string(),
            ..Default::default()
        }],
        interrupts: Vec::new(),
        termination: Termination::Normal,
    });
    registry.retain_exchange(record);

    assert_eq!(
        registry.phase(&EntityRef::message("ex_1", "m1")),
        Some(Phase::Ended)
    );
    assert!(matches!(
        registry.completed(&EntityRef::tool_call("ex_1", "m1", "t1")),
        Some(CompletedRecord::ToolCall(_))
    ));
}

#[test]
fn test_error_ledger() {
    let mut ledger = ErrorLedger::default();
    let entity = EntityRef::exchange("ex_1");
    ledger.raise(&entity, "e1", ErrorStart::new("first"));
    ledger.raise(&entity, "e2", ErrorStart::new("second"));
    ledger.raise(&entity, "e1", ErrorStart::new("first, again"));

    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.open_errors(&entity)[0].1.message, "first, again");

    assert_eq!(ledger.clear(&entity, "e1").map(|e| e.message), Some("first, again".to_string()));
    assert!(ledger.clear(&entity, "e1").is_none());
    assert!(ledger.clear(&EntityRef::Session, "e2").is_none());
    ledger.clear(&entity, "e2");
    assert!(ledger.is_empty());
    assert!(ledger.open_errors(&entity).is_empty());
}

#[test]
fn test_eviction_releases_open_errors() {
    let mut registry = EntityRegistry::new(Some(1));
    let part = EntityRef::content_part("ex_1", "m1", "p1");
    registry.errors.raise(&EntityRef::exchange("ex_1"), "e1", ErrorStart::new("exchange"));
    registry.errors.raise(&part, "e2", ErrorStart::new("part"));
    registry.errors.raise(&EntityRef::exchange("ex_2"), "e3", ErrorStart::new("kept"));

    registry.retain_exchange(completed_exchange("ex_1"));
    assert_eq!(registry.errors().len(), 3);

    registry.retain_exchange(completed_exchange("ex_2"));
    assert!(registry.errors().open_errors(&part).is_empty());
    assert!(registry.errors().open_errors(&EntityRef::exchange("ex_1")).is_empty());
    assert_eq!(registry.errors().len(), 1);
    assert_eq!(registry.phase(&EntityRef::exchange("ex_1")), Some(Phase::Ended));
}
