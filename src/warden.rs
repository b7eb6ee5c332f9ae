//! The owning execution context.
//!
//! One `Warden` owns the loaded definitions, the process registry, and
//! the notification sink. Everything that mutates this state (scheduler
//! firings, output lines, grace-window checks, restart delays) arrives
//! as a posted action and runs here, serialized in enqueue order. The
//! only other task that holds state is the schedule engine, which owns
//! its job list and is fed whole rebuilt lists over its command channel.

use crate::apps::{AppDefinition, AppSettings};
use crate::dispatcher::{Action, Dispatcher};
use crate::error::{Result, WardenError};
use crate::events::{EventSink, OutputStream};
use crate::process::registry::{
    self, GRACE_WINDOW, ManagedProcess, ProcessRegistry, ReapOutcome,
};
use crate::scheduler::{ScheduleEngine, SchedulerHandle, build_jobs};
use crate::store::AppStore;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pause between stopping a running app and starting it again on a
/// scheduled run, giving the OS time to release ports and files.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// One row of a status snapshot, for doctor/GUI tools.
#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    /// Application name.
    pub name: String,
    /// Whether a process is currently tracked.
    pub running: bool,
    /// Whether the app starts with the supervisor.
    pub autorun: bool,
    /// Human-readable schedule description.
    pub schedule: String,
}

/// Supervises console applications: starts, stops, re-runs on schedule.
pub struct Warden {
    store: AppStore,
    defs: BTreeMap<String, AppDefinition>,
    registry: ProcessRegistry,
    scheduler: SchedulerHandle,
    dispatcher: Dispatcher,
    actions: Option<mpsc::UnboundedReceiver<Action>>,
    sink: Box<dyn EventSink>,
}

impl Warden {
    /// Loads all definitions from `store` and wires up the registry,
    /// dispatcher, and schedule engine.
    ///
    /// Spawns the engine's background task, so this must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Store`] if the apps root cannot be scanned.
    pub fn new(store: AppStore, sink: Box<dyn EventSink>) -> Result<Self> {
        let (dispatcher, actions) = Dispatcher::new();
        let (scheduler, engine) = ScheduleEngine::new(dispatcher.clone());
        let _engine_task = engine.run();

        let registry = ProcessRegistry::new(dispatcher.clone());
        let defs = store
            .load_apps()?
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        Ok(Self {
            store,
            defs,
            registry,
            scheduler,
            dispatcher,
            actions: Some(actions),
            sink,
        })
    }

    /// The store this warden loads from and saves to.
    pub fn store(&self) -> &AppStore {
        &self.store
    }

    /// A posting handle onto this warden's action queue.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Loaded definitions, ordered by name.
    pub fn definitions(&self) -> impl Iterator<Item = &AppDefinition> {
        self.defs.values()
    }

    /// Looks up one definition.
    pub fn definition(&self, name: &str) -> Option<&AppDefinition> {
        self.defs.get(name)
    }

    /// O(1) check whether a process is tracked for `name`.
    pub fn is_running(&self, name: &str) -> bool {
        self.registry.is_running(name)
    }

    /// Number of tracked processes.
    pub fn running_count(&self) -> usize {
        self.registry.running_count()
    }

    /// Status snapshot of every definition, ordered by name.
    pub fn status(&self) -> Vec<AppStatus> {
        self.defs
            .values()
            .map(|def| AppStatus {
                name: def.name.clone(),
                running: self.registry.is_running(&def.name),
                autorun: def.settings.autorun,
                schedule: def.settings.schedule.to_string(),
            })
            .collect()
    }

    /// Starts every autorun definition and builds the schedules.
    ///
    /// A single app's failure is logged and never stops the rest.
    pub fn startup(&mut self) {
        let autorun: Vec<String> = self
            .defs
            .values()
            .filter(|d| d.settings.autorun)
            .map(|d| d.name.clone())
            .collect();
        for name in autorun {
            info!(app = %name, "autorun");
            if let Err(e) = self.start_app(&name, false) {
                warn!(app = %name, "autorun failed: {e}");
            }
        }
        self.setup_schedules();
    }

    /// Starts an application. `should_focus` is `true` for manual starts
    /// only; scheduled and autorun paths pass `false`.
    ///
    /// # Errors
    ///
    /// - [`WardenError::UnknownApp`] — no definition for `name`.
    /// - [`WardenError::NoCommand`] / [`WardenError::AlreadyRunning`] /
    ///   [`WardenError::LaunchFailed`] — from the registry, which is left
    ///   unchanged.
    pub fn start_app(&mut self, name: &str, should_focus: bool) -> Result<()> {
        let def = self
            .defs
            .get(name)
            .ok_or_else(|| WardenError::UnknownApp(name.to_owned()))?;
        self.registry.start(def)?;
        self.sink.on_app_started(name, should_focus);
        Ok(())
    }

    /// Stops an application. Membership ends synchronously; the process
    /// itself winds down through the grace-window escalation.
    ///
    /// # Errors
    ///
    /// [`WardenError::NotRunning`] if no process is tracked for `name`.
    pub fn stop_app(&mut self, name: &str) -> Result<()> {
        self.registry.stop(name)
    }

    /// Re-reads all definitions from disk and rebuilds the schedules.
    /// Running processes are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Store`] if the apps root cannot be scanned.
    pub fn reload_apps(&mut self) -> Result<()> {
        let defs = self.store.load_apps()?;
        self.defs = defs.into_iter().map(|d| (d.name.clone(), d)).collect();
        self.setup_schedules();
        Ok(())
    }

    /// Persists new settings for an app, updates the in-memory definition,
    /// and rebuilds the schedules.
    ///
    /// # Errors
    ///
    /// - [`WardenError::UnknownApp`] — no definition for `name`.
    /// - [`WardenError::Store`] — persistence failure (definition
    ///   unchanged).
    pub fn save_settings(&mut self, name: &str, settings: AppSettings) -> Result<()> {
        if !self.defs.contains_key(name) {
            return Err(WardenError::UnknownApp(name.to_owned()));
        }
        self.store.save_settings(name, &settings)?;
        if let Some(def) = self.defs.get_mut(name) {
            def.settings = settings;
        }
        self.setup_schedules();
        Ok(())
    }

    /// Rebuilds the engine's job list from the current definitions:
    /// existing jobs are cleared and exactly one job is created per
    /// enabled schedule.
    pub fn setup_schedules(&mut self) {
        let jobs = build_jobs(self.defs.values(), Local::now());
        self.scheduler.rebuild(jobs);
    }

    /// Runs a scheduled run for `name` right now, with the same
    /// stop → delay → start semantics as an engine firing.
    pub fn trigger_scheduled_run(&mut self, name: &str) {
        self.handle_scheduled_run(name, Local::now());
    }

    /// Drains the action queue until it closes. Runs forever in practice,
    /// since the warden itself keeps a posting handle; select against a
    /// shutdown signal to stop.
    pub async fn run(mut self) {
        let Some(mut actions) = self.actions.take() else {
            warn!("action queue already taken, cannot run");
            return;
        };
        info!(apps = self.defs.len(), "warden running");
        while let Some(action) = actions.recv().await {
            action(&mut self);
        }
    }

    /// Executes every action currently in the queue and returns how many
    /// ran. For hosts that drive the warden from their own event loop
    /// (and for tests); [`Warden::run`] is the usual way.
    pub fn drain_actions(&mut self) -> usize {
        let Some(mut actions) = self.actions.take() else {
            return 0;
        };
        let mut ran = 0;
        while let Ok(action) = actions.try_recv() {
            action(self);
            ran += 1;
        }
        self.actions = Some(actions);
        ran
    }

    // ── handlers invoked via posted actions ──────────────────────────────

    /// A schedule fired: mark the activity, then restart or start.
    pub(crate) fn handle_scheduled_run(&mut self, name: &str, at: DateTime<Local>) {
        self.sink.on_scheduled_run(name, at);

        if self.registry.is_running(name) {
            info!(app = name, "scheduled run: stopping current process first");
            if let Err(e) = self.registry.stop(name) {
                warn!(app = name, "cannot stop for scheduled run: {e}");
                return;
            }
            let name = name.to_owned();
            self.dispatcher
                .post_after(RESTART_DELAY, move |w| w.scheduled_start(&name));
        } else {
            self.scheduled_start(name);
        }
    }

    /// Start half of a scheduled run; failures are logged, never retried.
    fn scheduled_start(&mut self, name: &str) {
        if let Err(e) = self.start_app(name, false) {
            warn!(app = name, "scheduled start failed: {e}");
        }
    }

    /// One captured output line from a supervised process.
    pub(crate) fn process_output(&mut self, name: &str, stream: OutputStream, line: Vec<u8>) {
        self.sink.on_process_output(name, stream, &line);
    }

    /// A process closed its stdio; confirm the exit or keep checking.
    pub(crate) fn streams_closed(&mut self, name: &str) {
        match self.registry.reap_closed(name) {
            ReapOutcome::Exited => self.sink.on_process_exited(name),
            ReapOutcome::StillRunning => {
                debug!(app = name, "stdio closed but process alive, re-checking");
                let name = name.to_owned();
                self.dispatcher
                    .post_after(GRACE_WINDOW, move |w| w.streams_closed(&name));
            }
            ReapOutcome::Untracked => {
                debug!(app = name, "exit already handled");
            }
        }
    }

    /// Grace window elapsed for a stopped process.
    pub(crate) fn finish_grace_window(&mut self, proc: ManagedProcess) {
        registry::finish_grace_window(proc, &self.dispatcher, self.sink.as_mut());
    }

    /// Kill-confirm window elapsed for a force-killed process.
    pub(crate) fn finish_kill_confirm(&mut self, proc: ManagedProcess) {
        registry::finish_kill_confirm(proc, self.sink.as_mut());
    }
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warden")
            .field("apps", &self.defs.len())
            .field("running", &self.registry.running_count())
            .finish()
    }
}
