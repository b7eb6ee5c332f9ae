//! Live process registry with escalating termination.
//!
//! Owns the mapping from application name to running child process. A
//! stop is graceful-first: the entry leaves the map immediately, the
//! process gets a termination request, and a deferred check 500 ms later
//! force-kills anything still alive, followed by one final deferred
//! check that only records whether the kill worked. None of this ever
//! blocks the owning context; every wait is a timer task that posts back
//! through the dispatcher.

use crate::apps::AppDefinition;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, WardenError};
use crate::events::{EventSink, OutputStream};
use crate::process::command::{plan_command, working_dir};
use std::collections::HashMap;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

/// How long a process gets to exit voluntarily before being force-killed.
pub const GRACE_WINDOW: Duration = Duration::from_millis(500);

/// Delay before the single post-kill check that records the outcome.
pub const KILL_CONFIRM_WINDOW: Duration = Duration::from_millis(500);

/// Process lifecycle states.
///
/// ```text
/// Starting → Running → Terminating → Exited
///                 ↘ ───────────────↗
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawn in progress.
    Starting,
    /// Process launched and tracked in the registry.
    Running,
    /// Stop requested; entry already removed from the live map.
    Terminating,
    /// OS exit confirmed (natural completion or kill).
    Exited,
}

impl ProcessState {
    /// Returns `true` if a transition from `self` to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Starting, Self::Running)
                | (Self::Running, Self::Terminating)
                | (Self::Running, Self::Exited)
                | (Self::Terminating, Self::Exited)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Exited => "exited",
        };
        f.write_str(label)
    }
}

/// A supervised child process.
///
/// Killed on drop unless its exit was already confirmed, so an entry that
/// falls out of scope (supervisor shutdown, dropped queue) cannot leak a
/// child.
pub struct ManagedProcess {
    name: String,
    child: Child,
    pid: Option<u32>,
    state: ProcessState,
}

impl ManagedProcess {
    fn new(name: &str, child: Child) -> Self {
        let pid = child.id();
        Self {
            name: name.to_owned(),
            child,
            pid,
            state: ProcessState::Starting,
        }
    }

    /// Application name this process belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// OS process id, if the process was spawned and not yet reaped.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn transition(&mut self, target: ProcessState) {
        if !self.state.can_transition_to(target) {
            warn!(
                app = %self.name,
                from = %self.state,
                to = %target,
                "unexpected process state transition"
            );
        } else {
            debug!(app = %self.name, from = %self.state, to = %target, "process state");
        }
        self.state = target;
    }

    /// Checks for exit without blocking; marks the process `Exited` and
    /// returns the status when the OS has reaped it.
    pub fn try_reap(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.transition(ProcessState::Exited);
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(app = %self.name, "cannot query process status: {e}");
                None
            }
        }
    }

    /// Asks the process to exit voluntarily.
    ///
    /// SIGTERM on Unix; platforms without a graceful signal go straight to
    /// the forced kill.
    fn request_termination(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                // Safety: plain kill(2) on a pid we spawned and still hold.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
                return;
            }
        }
        let _ = self.child.start_kill();
    }

    /// Forcibly kills the process (SIGKILL) without waiting.
    fn force_kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if self.state != ProcessState::Exited {
            let _ = self.child.start_kill();
            debug!(app = %self.name, "killed process on drop");
        }
    }
}

impl fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("state", &self.state)
            .finish()
    }
}

/// What the registry found when confirming an exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReapOutcome {
    /// Exit confirmed; the entry was removed.
    Exited,
    /// The process closed its stdio but is still alive.
    StillRunning,
    /// No entry for this name (already stopped or exited).
    Untracked,
}

/// Owns the live name → process map.
pub struct ProcessRegistry {
    procs: HashMap<String, ManagedProcess>,
    dispatcher: Dispatcher,
}

impl ProcessRegistry {
    /// Creates an empty registry posting its deferred checks through
    /// `dispatcher`.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            procs: HashMap::new(),
            dispatcher,
        }
    }

    /// O(1) check whether a process is tracked for `name`.
    pub fn is_running(&self, name: &str) -> bool {
        self.procs.contains_key(name)
    }

    /// Number of tracked processes.
    pub fn running_count(&self) -> usize {
        self.procs.len()
    }

    /// Names of all tracked processes, unordered.
    pub fn running_names(&self) -> Vec<String> {
        self.procs.keys().cloned().collect()
    }

    /// Launches the definition's command and tracks the new process.
    ///
    /// Both output streams are piped and pumped line-by-line into the
    /// action queue, so the sink observes one ordered stream per process.
    ///
    /// # Errors
    ///
    /// - [`WardenError::NoCommand`] — empty command; registry unchanged.
    /// - [`WardenError::AlreadyRunning`] — an entry exists; registry
    ///   unchanged.
    /// - [`WardenError::LaunchFailed`] — the OS refused to spawn.
    pub fn start(&mut self, def: &AppDefinition) -> Result<()> {
        let name = def.name.as_str();
        if self.procs.contains_key(name) {
            return Err(WardenError::AlreadyRunning(name.to_owned()));
        }
        let Some(plan) = plan_command(&def.settings.command) else {
            return Err(WardenError::NoCommand(name.to_owned()));
        };

        info!(app = name, program = %plan.program, "starting process");

        let mut cmd = Command::new(&plan.program);
        cmd.args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = working_dir(&def.settings.path) {
            debug!(app = name, dir = %dir.display(), "setting working directory");
            cmd.current_dir(dir);
        }
        for (key, value) in &plan.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            warn!(app = name, "launch failed: {e}");
            WardenError::LaunchFailed {
                name: name.to_owned(),
                source: e,
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        if let (Some(stdout), Some(stderr)) = (stdout, stderr) {
            spawn_output_pump(name.to_owned(), stdout, stderr, self.dispatcher.clone());
        }

        let mut proc = ManagedProcess::new(name, child);
        proc.transition(ProcessState::Running);
        self.procs.insert(name.to_owned(), proc);
        Ok(())
    }

    /// Requests termination and removes the entry immediately, so repeated
    /// or concurrent stops are no-ops. Never blocks: the grace-window
    /// check runs as a deferred post.
    ///
    /// # Errors
    ///
    /// [`WardenError::NotRunning`] if no entry exists for `name`.
    pub fn stop(&mut self, name: &str) -> Result<()> {
        let Some(mut proc) = self.procs.remove(name) else {
            return Err(WardenError::NotRunning(name.to_owned()));
        };

        info!(app = name, pid = ?proc.pid(), "stopping process");
        proc.transition(ProcessState::Terminating);
        proc.request_termination();

        self.dispatcher
            .post_after(GRACE_WINDOW, move |w| w.finish_grace_window(proc));
        Ok(())
    }

    /// Confirms a natural exit after the process closed its stdio.
    pub(crate) fn reap_closed(&mut self, name: &str) -> ReapOutcome {
        let Some(proc) = self.procs.get_mut(name) else {
            return ReapOutcome::Untracked;
        };
        match proc.try_reap() {
            Some(status) => {
                info!(app = name, code = ?status.code(), "process exited");
                self.procs.remove(name);
                ReapOutcome::Exited
            }
            None => ReapOutcome::StillRunning,
        }
    }
}

impl fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("running", &self.procs.len())
            .finish()
    }
}

/// Second phase of a stop: runs after the grace window. Force-kills a
/// survivor and arms the final kill-confirm check.
pub(crate) fn finish_grace_window(
    mut proc: ManagedProcess,
    dispatcher: &Dispatcher,
    sink: &mut dyn EventSink,
) {
    let name = proc.name().to_owned();
    if proc.try_reap().is_some() {
        debug!(app = %name, "process terminated within grace window");
        sink.on_process_exited(&name);
        return;
    }

    info!(app = %name, "process survived termination request, killing it");
    proc.force_kill();
    dispatcher.post_after(KILL_CONFIRM_WINDOW, move |w| w.finish_kill_confirm(proc));
}

/// Final phase of a stop: records (never retries) the kill outcome.
pub(crate) fn finish_kill_confirm(mut proc: ManagedProcess, sink: &mut dyn EventSink) {
    let name = proc.name().to_owned();
    if proc.try_reap().is_some() {
        debug!(app = %name, "kill confirmed");
        sink.on_process_exited(&name);
    } else {
        // Best-effort by design: the entry is already gone, so all we can
        // do is record the failure.
        warn!(app = %name, "process could not be killed");
    }
}

/// Pumps both output streams line-by-line into the action queue, then
/// posts a streams-closed notice so the owner can confirm the exit.
fn spawn_output_pump(
    name: String,
    stdout: ChildStdout,
    stderr: ChildStderr,
    dispatcher: Dispatcher,
) {
    tokio::spawn(async move {
        let mut out = BufReader::new(stdout);
        let mut err = BufReader::new(stderr);
        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            tokio::select! {
                n = out.read_until(b'\n', &mut out_buf), if out_open => {
                    match n {
                        Ok(0) => out_open = false,
                        Ok(_) => {
                            post_line(&dispatcher, &name, OutputStream::Stdout, &mut out_buf);
                        }
                        Err(e) => {
                            debug!(app = %name, "stdout read error: {e}");
                            out_open = false;
                        }
                    }
                }
                n = err.read_until(b'\n', &mut err_buf), if err_open => {
                    match n {
                        Ok(0) => err_open = false,
                        Ok(_) => {
                            post_line(&dispatcher, &name, OutputStream::Stderr, &mut err_buf);
                        }
                        Err(e) => {
                            debug!(app = %name, "stderr read error: {e}");
                            err_open = false;
                        }
                    }
                }
            }
        }

        debug!(app = %name, "output streams closed");
        dispatcher.post(move |w| w.streams_closed(&name));
    });
}

/// Posts one captured line (without its trailing newline) to the owner.
fn post_line(dispatcher: &Dispatcher, name: &str, stream: OutputStream, buf: &mut Vec<u8>) {
    while matches!(buf.last(), Some(&b'\n' | &b'\r')) {
        buf.pop();
    }
    let line = std::mem::take(buf);
    let name = name.to_owned();
    dispatcher.post(move |w| w.process_output(&name, stream, line));
}
