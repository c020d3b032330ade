use super::{
    engine::LifecycleEngine,
    events::LifecycleEvent,
    types::{CardPhase, LifecycleApplyStatus},
};
use crate::host::SlotStatus;

fn opened_engine() -> LifecycleEngine {
    let mut engine = LifecycleEngine::new();
    assert_eq!(
        engine.apply(LifecycleEvent::Opened),
        LifecycleApplyStatus::Applied
    );
    engine
}

#[test]
fn engine_starts_closed() {
    let engine = LifecycleEngine::new();
    assert_eq!(engine.phase(), CardPhase::Closed);
    assert!(!engine.phase().is_open());
}

#[test]
fn successful_bring_up_reaches_ready() {
    let mut engine = opened_engine();
    for event in [
        LifecycleEvent::CardReset,
        LifecycleEvent::StatusRead(SlotStatus::from_raw(0x11_0001)),
        LifecycleEvent::BringUpStarted,
        LifecycleEvent::BringUpSucceeded,
    ] {
        assert_eq!(engine.apply(event), LifecycleApplyStatus::Applied);
    }
    assert_eq!(engine.phase(), CardPhase::Ready);
    assert!(engine.phase().is_ready());
}

#[test]
fn absent_card_parks_in_not_inserted_until_next_reset() {
    let mut engine = opened_engine();
    let _ = engine.apply(LifecycleEvent::CardReset);
    let _ = engine.apply(LifecycleEvent::StatusRead(SlotStatus::from_raw(0)));
    assert_eq!(
        engine.apply(LifecycleEvent::CardAbsent),
        LifecycleApplyStatus::Applied
    );
    assert_eq!(engine.phase(), CardPhase::NotInserted);

    assert_eq!(
        engine.apply(LifecycleEvent::BringUpStarted),
        LifecycleApplyStatus::InvalidTransition
    );
    assert_eq!(engine.phase(), CardPhase::NotInserted);

    let _ = engine.apply(LifecycleEvent::CardReset);
    assert_eq!(engine.phase(), CardPhase::Reset);
}

#[test]
fn controller_reset_path_closes_and_reopens() {
    let mut engine = opened_engine();
    let _ = engine.apply(LifecycleEvent::CardReset);
    let _ = engine.apply(LifecycleEvent::StatusRead(SlotStatus::from_raw(0x1)));
    let _ = engine.apply(LifecycleEvent::ControllerNotReady);
    assert_eq!(engine.phase(), CardPhase::NeedsControllerReset);

    let _ = engine.apply(LifecycleEvent::Closed);
    assert_eq!(engine.phase(), CardPhase::Closed);
    let _ = engine.apply(LifecycleEvent::Opened);
    assert_eq!(engine.phase(), CardPhase::Opened);
}

#[test]
fn bring_up_failure_is_terminal_until_reset() {
    let mut engine = opened_engine();
    let _ = engine.apply(LifecycleEvent::CardReset);
    let _ = engine.apply(LifecycleEvent::StatusRead(SlotStatus::from_raw(0x11_0001)));
    let _ = engine.apply(LifecycleEvent::BringUpStarted);
    assert_eq!(
        engine.apply(LifecycleEvent::BringUpFailed),
        LifecycleApplyStatus::Applied
    );
    assert_eq!(engine.phase(), CardPhase::Failed);
    assert_eq!(
        engine.apply(LifecycleEvent::BringUpSucceeded),
        LifecycleApplyStatus::InvalidTransition
    );
    let _ = engine.apply(LifecycleEvent::CardReset);
    assert_eq!(engine.phase(), CardPhase::Reset);
}

#[test]
fn repeated_reset_is_unchanged() {
    let mut engine = opened_engine();
    assert_eq!(
        engine.apply(LifecycleEvent::CardReset),
        LifecycleApplyStatus::Applied
    );
    assert_eq!(
        engine.apply(LifecycleEvent::CardReset),
        LifecycleApplyStatus::Unchanged
    );
}

#[test]
fn closed_engine_rejects_card_events() {
    let mut engine = LifecycleEngine::new();
    assert_eq!(
        engine.apply(LifecycleEvent::CardReset),
        LifecycleApplyStatus::InvalidTransition
    );
    assert_eq!(
        engine.apply(LifecycleEvent::Closed),
        LifecycleApplyStatus::Unchanged
    );
    assert_eq!(engine.phase(), CardPhase::Closed);
}

#[test]
fn ready_card_can_close() {
    let mut engine = opened_engine();
    for event in [
        LifecycleEvent::CardReset,
        LifecycleEvent::StatusRead(SlotStatus::from_raw(0x1_0001)),
        LifecycleEvent::BringUpStarted,
        LifecycleEvent::BringUpSucceeded,
        LifecycleEvent::Closed,
    ] {
        let _ = engine.apply(event);
    }
    assert_eq!(engine.phase(), CardPhase::Closed);
}
