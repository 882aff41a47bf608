//! Tests for the lifecycle state machine

use super::*;

fn lifecycle() -> Lifecycle<&'static str, &'static str> {
    Lifecycle::new(EntityRef::exchange("ex_1"))
}

#[test]
fn test_normal_flow() {
    let mut lc = lifecycle();
    assert_eq!(lc.phase(), Phase::Pending);
    assert_eq!(lc.ensure_active(), Err(ViolationKind::NotActive));

    lc.start("s").unwrap();
    assert!(lc.is_active());
    assert_eq!(lc.start_event(), Ok(&"s"));
    assert!(lc.ensure_active().is_ok());

    lc.end("e").unwrap();
    assert!(lc.ended());
    assert_eq!(lc.end_event(), Some(&"e"));
    assert_eq!(lc.termination(), Termination::Normal);
    assert_eq!(lc.ensure_active(), Err(ViolationKind::EventAfterEnd));
}

#[test]
fn test_duplicate_start_keeps_first() {
    let mut lc = lifecycle();
    lc.start("first").unwrap();
    assert_eq!(lc.start("second"), Err(ViolationKind::DuplicateStart));
    assert_eq!(lc.start_event_maybe(), Some(&"first"));

    lc.end("e").unwrap();
    assert_eq!(lc.start("third"), Err(ViolationKind::DuplicateStart));
    assert!(lc.ended());
}

#[test]
fn test_premature_end_moves_to_ended() {
    let mut lc = lifecycle();
    assert_eq!(lc.end("e"), Err(ViolationKind::PrematureEnd));
    assert!(lc.ended());
    assert!(lc.start_event_maybe().is_none());
    assert_eq!(lc.end_event(), Some(&"e"));
}

#[test]
fn test_end_after_end_changes_nothing() {
    let mut lc = lifecycle();
    lc.start("s").unwrap();
    lc.end("first").unwrap();
    assert_eq!(lc.end("second"), Err(ViolationKind::EventAfterEnd));
    assert_eq!(lc.end_event(), Some(&"first"));
}

#[test]
fn test_start_event_before_start_fails() {
    let lc = lifecycle();
    let err = lc.start_event().unwrap_err();
    assert_eq!(err.entity, EntityRef::exchange("ex_1"));
}

#[test]
fn test_abandon() {
    let mut lc = lifecycle();
    lc.start("s").unwrap();
    assert!(lc.abandon());
    assert!(lc.ended());
    assert_eq!(lc.termination(), Termination::Abnormal);
    assert!(!lc.abandon());
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Start(u8),
        End(u8),
        Abandon,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u8>().prop_map(Op::Start),
            any::<u8>().prop_map(Op::End),
            Just(Op::Abandon),
        ]
    }

    fn rank(phase: Phase) -> u8 {
        match phase {
            Phase::Pending => 0,
            Phase::Active => 1,
            Phase::Ended => 2,
        }
    }

    proptest! {
        #[test]
        fn phase_never_moves_backwards(ops in proptest::collection::vec(op(), 0..16)) {
            let mut lc: Lifecycle<u8, u8> = Lifecycle::new(EntityRef::Session);
            let mut first_start = None;
            for op in ops {
                let before = lc.phase();
                match op {
                    Op::Start(v) => {
                        if lc.start(v).is_ok() {
                            first_start = Some(v);
                        }
                    }
                    Op::End(v) => {
                        let _ = lc.end(v);
                    }
                    Op::Abandon => {
                        lc.abandon();
                    }
                }
                prop_assert!(rank(lc.phase()) >= rank(before));
                prop_assert_eq!(lc.start_event_maybe().copied(), first_start);
            }
        }
    }
}
