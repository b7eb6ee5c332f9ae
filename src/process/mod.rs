//! Process lifecycle management.
//!
//! Turns an application's command line into a launch plan, spawns and
//! tracks the OS process, captures its merged output, and tears it down
//! with escalating termination.

pub mod command;
pub mod registry;

pub use command::LaunchPlan;
pub use registry::{ManagedProcess, ProcessRegistry, ProcessState};
