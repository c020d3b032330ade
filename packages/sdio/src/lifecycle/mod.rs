pub(crate) mod engine;
pub(crate) mod events;
pub(crate) mod machine;
#[cfg(test)]
mod tests;
pub(crate) mod types;

pub(crate) use engine::LifecycleEngine;
pub use events::LifecycleEvent;
pub use types::{CardPhase, LifecycleApplyStatus};
