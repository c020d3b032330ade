use crate::host::SlotStatus;

/// Progress reported by the host while it drives the card.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Opened,
    CardReset,
    StatusRead(SlotStatus),
    CardAbsent,
    ControllerNotReady,
    BringUpStarted,
    BringUpSucceeded,
    BringUpFailed,
    Closed,
}
