use statig::prelude::*;

use super::events::LifecycleEvent;
use super::types::{CardPhase, LifecycleApplyStatus};

#[derive(Clone, Copy, Debug)]
pub(super) struct LifecycleMachine {
    pub(super) phase: CardPhase,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct DispatchContext {
    pub(super) status: LifecycleApplyStatus,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self {
            status: LifecycleApplyStatus::Unchanged,
        }
    }
}

impl LifecycleMachine {
    pub(super) fn new() -> Self {
        Self {
            phase: CardPhase::Closed,
        }
    }

    fn enter(&mut self, context: &mut DispatchContext, phase: CardPhase) {
        context.status = if self.phase == phase {
            LifecycleApplyStatus::Unchanged
        } else {
            LifecycleApplyStatus::Applied
        };
        self.phase = phase;
    }

    fn reject(context: &mut DispatchContext) {
        context.status = LifecycleApplyStatus::InvalidTransition;
    }
}

#[state_machine(initial = "State::closed()")]
impl LifecycleMachine {
    #[state]
    fn closed(&mut self, context: &mut DispatchContext, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Opened => {
                self.enter(context, CardPhase::Opened);
                Transition(State::opened())
            }
            LifecycleEvent::Closed => {
                context.status = LifecycleApplyStatus::Unchanged;
                Handled
            }
            _ => {
                Self::reject(context);
                Handled
            }
        }
    }

    #[state]
    fn opened(&mut self, context: &mut DispatchContext, event: &LifecycleEvent) -> Outcome<State> {
        self.open_common(context, event)
    }

    #[state]
    fn reset(&mut self, context: &mut DispatchContext, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::StatusRead(_) => {
                self.enter(context, CardPhase::StatusChecked);
                Transition(State::status_checked())
            }
            LifecycleEvent::BringUpFailed => {
                self.enter(context, CardPhase::Failed);
                Transition(State::failed())
            }
            _ => self.open_common(context, event),
        }
    }

    #[state]
    fn status_checked(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        match event {
            LifecycleEvent::CardAbsent => {
                self.enter(context, CardPhase::NotInserted);
                Transition(State::not_inserted())
            }
            LifecycleEvent::ControllerNotReady => {
                self.enter(context, CardPhase::NeedsControllerReset);
                Transition(State::needs_controller_reset())
            }
            LifecycleEvent::BringUpStarted => {
                self.enter(context, CardPhase::BringingUp);
                Transition(State::bringing_up())
            }
            LifecycleEvent::BringUpFailed => {
                self.enter(context, CardPhase::Failed);
                Transition(State::failed())
            }
            _ => self.open_common(context, event),
        }
    }

    #[state]
    fn not_inserted(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        self.open_common(context, event)
    }

    #[state]
    fn needs_controller_reset(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        self.open_common(context, event)
    }

    #[state]
    fn bringing_up(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        match event {
            LifecycleEvent::BringUpSucceeded => {
                self.enter(context, CardPhase::Ready);
                Transition(State::ready())
            }
            LifecycleEvent::BringUpFailed => {
                self.enter(context, CardPhase::Failed);
                Transition(State::failed())
            }
            _ => self.open_common(context, event),
        }
    }

    #[state]
    fn ready(&mut self, context: &mut DispatchContext, event: &LifecycleEvent) -> Outcome<State> {
        self.open_common(context, event)
    }

    #[state]
    fn failed(&mut self, context: &mut DispatchContext, event: &LifecycleEvent) -> Outcome<State> {
        self.open_common(context, event)
    }
}

impl LifecycleMachine {
    // Any open phase may reset the card again or drop the handle.
    fn open_common(
        &mut self,
        context: &mut DispatchContext,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        match event {
            LifecycleEvent::CardReset => {
                self.enter(context, CardPhase::Reset);
                Transition(State::reset())
            }
            LifecycleEvent::Closed => {
                self.enter(context, CardPhase::Closed);
                Transition(State::closed())
            }
            _ => {
                Self::reject(context);
                Handled
            }
        }
    }
}
