//! Notification sink for UI layers.
//!
//! The supervisor never talks to a window toolkit directly; it reports
//! process and schedule activity through an [`EventSink`] supplied at
//! construction time. All callbacks run on the owning execution context,
//! so implementations need no internal locking.

use chrono::{DateTime, Local};
use tracing::{debug, info};

/// Which output stream a line arrived on.
///
/// Both streams are captured and delivered through the same callback in
/// arrival order, so a sink that does not care about the distinction can
/// simply ignore this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Observer interface for process and schedule activity.
///
/// Every method has a no-op default so sinks implement only what they
/// display.
pub trait EventSink: Send {
    /// One line of process output (without the trailing newline).
    fn on_process_output(&mut self, name: &str, stream: OutputStream, line: &[u8]) {
        let _ = (name, stream, line);
    }

    /// A process exit was confirmed and the registry entry removed.
    fn on_process_exited(&mut self, name: &str) {
        let _ = name;
    }

    /// An app was started. `should_focus` is `true` only for manual starts;
    /// scheduled and autorun starts never steal focus.
    fn on_app_started(&mut self, name: &str, should_focus: bool) {
        let _ = (name, should_focus);
    }

    /// A schedule fired for `name`, whether or not a restart followed.
    /// Lets the UI mark activity even when the app keeps running.
    fn on_scheduled_run(&mut self, name: &str, timestamp: DateTime<Local>) {
        let _ = (name, timestamp);
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Sink that forwards events to the tracing log.
///
/// Used by the headless binary, where the log file plays the role of the
/// terminal tabs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_process_output(&mut self, name: &str, stream: OutputStream, line: &[u8]) {
        info!(app = name, %stream, "{}", String::from_utf8_lossy(line));
    }

    fn on_process_exited(&mut self, name: &str) {
        info!(app = name, "process exited");
    }

    fn on_app_started(&mut self, name: &str, should_focus: bool) {
        info!(app = name, should_focus, "app started");
    }

    fn on_scheduled_run(&mut self, name: &str, timestamp: DateTime<Local>) {
        debug!(app = name, at = %timestamp.format("%H:%M:%S"), "scheduled run");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_methods_are_no_ops() {
        // A sink implementing nothing must still accept every event.
        struct Empty;
        impl EventSink for Empty {}

        let mut sink = Empty;
        sink.on_process_output("a", OutputStream::Stdout, b"line");
        sink.on_process_exited("a");
        sink.on_app_started("a", true);
        sink.on_scheduled_run("a", Local::now());
    }

    #[test]
    fn stream_display() {
        assert_eq!(OutputStream::Stdout.to_string(), "stdout");
        assert_eq!(OutputStream::Stderr.to_string(), "stderr");
    }
}
