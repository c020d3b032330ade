#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CardPhase {
    Closed,
    Opened,
    Reset,
    StatusChecked,
    NotInserted,
    NeedsControllerReset,
    BringingUp,
    Ready,
    Failed,
}

impl CardPhase {
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleApplyStatus {
    Applied,
    Unchanged,
    InvalidTransition,
}
