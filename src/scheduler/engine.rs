//! Schedule engine tick loop.
//!
//! One background task owns the job list and polls it once per second.
//! The owning context never shares the jobs; it pushes whole rebuilt
//! lists through a command channel, and due firings travel back as
//! dispatcher posts. A single job's problem is logged and never stops
//! the loop; the next tick always comes.

use crate::dispatcher::Dispatcher;
use crate::scheduler::jobs::ScheduledJob;
use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Tick cadence of the engine loop.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// How many ticks between next-fire debug listings.
const LOG_EVERY_TICKS: u64 = 10;

/// Commands the owning context sends to the engine task.
enum EngineCommand {
    /// Replace the whole job list.
    Rebuild(Vec<ScheduledJob>),
}

/// Owning-context handle to the engine task.
///
/// Dropping every handle shuts the engine down.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl SchedulerHandle {
    /// Replaces the engine's job list with a freshly built one.
    ///
    /// Called at startup and after every settings edit; existing jobs are
    /// cleared, so each definition has exactly one job afterwards.
    pub fn rebuild(&self, jobs: Vec<ScheduledJob>) {
        if self.tx.send(EngineCommand::Rebuild(jobs)).is_err() {
            debug!("schedule engine gone, dropping rebuild");
        }
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle").finish_non_exhaustive()
    }
}

/// The engine task state: job list, command intake, and the dispatcher
/// firings are posted through.
pub struct ScheduleEngine {
    jobs: Vec<ScheduledJob>,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    dispatcher: Dispatcher,
    tick_count: u64,
}

impl ScheduleEngine {
    /// Creates the engine and its handle.
    pub fn new(dispatcher: Dispatcher) -> (SchedulerHandle, Self) {
        let (tx, commands) = mpsc::unbounded_channel();
        (
            SchedulerHandle { tx },
            Self {
                jobs: Vec::new(),
                commands,
                dispatcher,
                tick_count: 0,
            },
        )
    }

    /// Starts the tick loop on its own background task.
    pub fn run(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("schedule engine started");
            let mut interval = tokio::time::interval(TICK_INTERVAL);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.tick(Local::now());
                    }
                    command = self.commands.recv() => {
                        match command {
                            Some(EngineCommand::Rebuild(jobs)) => {
                                info!(jobs = jobs.len(), "schedules rebuilt");
                                self.jobs = jobs;
                            }
                            None => {
                                debug!("all scheduler handles dropped, stopping engine");
                                return;
                            }
                        }
                    }
                }
            }
        })
    }

    /// One tick: every due job fires exactly once, then recomputes its
    /// next-fire time from `now`.
    fn tick(&mut self, now: DateTime<Local>) {
        self.tick_count += 1;
        if self.tick_count % LOG_EVERY_TICKS == 0 && !self.jobs.is_empty() {
            for job in &self.jobs {
                debug!(
                    app = %job.name,
                    in_secs = (job.next_fire() - now).num_seconds(),
                    "next fire"
                );
            }
        }

        for job in &mut self.jobs {
            let Some(firing) = job.poll(now) else {
                continue;
            };
            if !firing.run {
                debug!(app = %job.name, "monthly gate: not the 1st, skipping run");
                continue;
            }

            info!(app = %job.name, at = %firing.at.format("%H:%M:%S"), "schedule fired");
            let name = job.name.clone();
            let at = firing.at;
            self.dispatcher.post(move |w| w.handle_scheduled_run(&name, at));
        }
    }
}

impl std::fmt::Debug for ScheduleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleEngine")
            .field("jobs", &self.jobs.len())
            .field("tick_count", &self.tick_count)
            .finish()
    }
}
