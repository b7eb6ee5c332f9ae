//! Recurring schedule engine.
//!
//! Computes one job per enabled application definition and fires them
//! from a 1-second tick loop running on its own background task. Firings
//! are posted through the dispatcher; the tick loop never touches the
//! process registry or the notification sink directly.

pub mod engine;
pub mod jobs;

pub use engine::{ScheduleEngine, SchedulerHandle};
pub use jobs::{Firing, ScheduledJob, WallClock, build_jobs};
