use statig::blocking::IntoStateMachineExt as _;

use super::events::LifecycleEvent;
use super::machine::{DispatchContext, LifecycleMachine};
use super::types::{CardPhase, LifecycleApplyStatus};

/// Tracks where the card is in its open/reset/bring-up sequence.
pub(crate) struct LifecycleEngine {
    machine: statig::blocking::StateMachine<LifecycleMachine>,
}

impl LifecycleEngine {
    pub(crate) fn new() -> Self {
        Self {
            machine: LifecycleMachine::new().state_machine(),
        }
    }

    pub(crate) fn phase(&self) -> CardPhase {
        self.machine.inner().phase
    }

    pub(crate) fn apply(&mut self, event: LifecycleEvent) -> LifecycleApplyStatus {
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(&event, &mut context);
        context.status
    }
}
