pub mod chain;
pub mod deviation;
pub mod drift;
pub mod error;
pub mod lifecycle;
pub mod planning;
pub mod queries;
pub mod rescheduler;
pub mod sequencer;

#[cfg(test)]
pub(crate) mod testutil;

pub use chain::{ChainArena, ChainWalk, IntegrityWarning};
pub use drift::{run_periodic, SweepReport};
pub use error::SchedulerError;
pub use lifecycle::{Scheduler, StartRequest, TransitionOutcome};
pub use planning::OrderUpdate;
pub use rescheduler::{reference_end, reschedule, RescheduleTrigger};
pub use sequencer::sequence;
