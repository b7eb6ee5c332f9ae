//! appwarden: launches, supervises, and re-runs console applications.
//!
//! Each application is a user-configured external console program with a
//! working directory, a command line, an autorun flag, and an optional
//! interval or calendar schedule. The supervisor keeps one live process
//! per application, captures its merged output, and tears it down with
//! escalating termination when asked to stop.
//!
//! # Architecture
//!
//! All mutable state lives on one execution context (the [`Warden`]);
//! everything else talks to it through posted actions:
//! - **Store**: one directory per app under the apps root, holding a
//!   defaulted `settings.toml`
//! - **Process registry**: name → live child process, graceful-then-forced
//!   termination
//! - **Schedule engine**: 1-second tick loop on its own task, firing
//!   interval/daily/weekly/monthly jobs
//! - **Dispatcher**: the single cross-thread bridge onto the warden's
//!   action queue
//! - **Event sink**: observer interface for UI layers (process output,
//!   exits, starts, schedule activity)

pub mod apps;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod process;
pub mod scheduler;
pub mod store;
pub mod warden;

pub use apps::{AppDefinition, AppSettings, IntervalUnit, ScheduleConfig};
pub use dispatcher::Dispatcher;
pub use error::{Result, WardenError};
pub use events::{EventSink, LogSink, NullSink, OutputStream};
pub use process::{ProcessRegistry, ProcessState};
pub use scheduler::{ScheduleEngine, ScheduledJob, SchedulerHandle};
pub use store::AppStore;
pub use warden::{AppStatus, Warden};
