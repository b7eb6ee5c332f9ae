//! Scheduled jobs and next-fire computation.
//!
//! A [`ScheduledJob`] is the engine's record of when one application
//! should next fire. Jobs are rebuilt from the definitions whenever
//! schedules change and recomputed after every firing, always from the
//! current moment rather than the missed scheduled time, so a stalled
//! loop can't produce a catch-up burst.

use crate::apps::{AppDefinition, ScheduleConfig};
use crate::error::{Result, WardenError};
use chrono::{DateTime, Datelike, Days, Local, NaiveDate};
use tracing::warn;

/// Wall-clock trigger time for calendar schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    /// Hour of day (0-23).
    pub hour: u32,
    /// Minute of hour (0-59).
    pub min: u32,
}

impl WallClock {
    /// Parses `"HH:MM"`.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Schedule`] for anything that is not a valid
    /// 24-hour wall-clock time.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || WardenError::Schedule(format!("invalid time '{text}', expected HH:MM"));

        let (hour, min) = text.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let min: u32 = min.parse().map_err(|_| invalid())?;
        if hour > 23 || min > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, min })
    }
}

impl std::fmt::Display for WallClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.min)
    }
}

/// Validated schedule snapshot carried by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobSchedule {
    /// Fire every N seconds (already clamped to ≥ 1).
    Every { secs: u64 },
    /// Fire daily at a wall-clock time.
    Daily(WallClock),
    /// Fire weekly at a wall-clock time.
    Weekly(WallClock),
    /// Fire daily at a wall-clock time, but only run on the 1st of the
    /// month. There is no native monthly primitive; this is a filtered
    /// daily check.
    MonthlyGate(WallClock),
}

/// One firing produced by [`ScheduledJob::poll`].
#[derive(Debug, Clone, Copy)]
pub struct Firing {
    /// When the firing was observed.
    pub at: DateTime<Local>,
    /// Whether the application should actually run. `false` only for a
    /// monthly gate tick that landed on the wrong day of the month.
    pub run: bool,
}

/// The engine's record of when one application should next fire.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    /// Application name this job triggers.
    pub name: String,
    schedule: JobSchedule,
    next_fire: DateTime<Local>,
}

impl ScheduledJob {
    /// Builds a job from a schedule configuration.
    ///
    /// Returns `Ok(None)` for a disabled schedule.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Schedule`] for a malformed trigger time;
    /// callers treat that definition as disabled.
    pub fn build(name: &str, config: &ScheduleConfig, now: DateTime<Local>) -> Result<Option<Self>> {
        let schedule = match config {
            ScheduleConfig::Disabled => return Ok(None),
            ScheduleConfig::Interval { .. } => JobSchedule::Every {
                // interval_secs is Some for every Interval config.
                secs: config.interval_secs().unwrap_or(1),
            },
            ScheduleConfig::Daily { time } => JobSchedule::Daily(WallClock::parse(time)?),
            ScheduleConfig::Weekly { time } => JobSchedule::Weekly(WallClock::parse(time)?),
            ScheduleConfig::Monthly { time } => JobSchedule::MonthlyGate(WallClock::parse(time)?),
        };

        Ok(Some(Self {
            name: name.to_owned(),
            next_fire: schedule.next_after(now),
            schedule,
        }))
    }

    /// When this job will next fire.
    pub fn next_fire(&self) -> DateTime<Local> {
        self.next_fire
    }

    /// Checks the job against `now`. A due job yields exactly one
    /// [`Firing`] and recomputes its next-fire time from `now`.
    pub fn poll(&mut self, now: DateTime<Local>) -> Option<Firing> {
        if now < self.next_fire {
            return None;
        }
        self.next_fire = self.schedule.next_after(now);

        let run = match self.schedule {
            JobSchedule::MonthlyGate(_) => now.day() == 1,
            _ => true,
        };
        Some(Firing { at: now, run })
    }
}

impl JobSchedule {
    /// Next fire time strictly after `now`.
    fn next_after(self, now: DateTime<Local>) -> DateTime<Local> {
        match self {
            Self::Every { secs } => now + chrono::Duration::seconds(secs.max(1) as i64),
            Self::Daily(at) | Self::MonthlyGate(at) => next_wall_clock(now, at),
            Self::Weekly(at) => at_wall_clock(now.date_naive() + Days::new(7), at)
                .unwrap_or_else(|| now + chrono::Duration::days(7)),
        }
    }
}

/// Builds the full job list for the current definitions.
///
/// One job per definition with an enabled schedule; a malformed schedule
/// logs a warning and the definition is treated as disabled; it never
/// aborts the build or affects another application's job.
pub fn build_jobs<'a>(
    defs: impl IntoIterator<Item = &'a AppDefinition>,
    now: DateTime<Local>,
) -> Vec<ScheduledJob> {
    let mut jobs = Vec::new();
    for def in defs {
        match ScheduledJob::build(&def.name, &def.settings.schedule, now) {
            Ok(Some(job)) => {
                tracing::debug!(
                    app = %job.name,
                    schedule = %def.settings.schedule,
                    next = %job.next_fire().format("%Y-%m-%d %H:%M:%S"),
                    "scheduled"
                );
                jobs.push(job);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(app = %def.name, "disabling schedule: {e}");
            }
        }
    }
    jobs
}

/// The given date at a wall-clock time, if that instant exists locally.
fn at_wall_clock(date: NaiveDate, at: WallClock) -> Option<DateTime<Local>> {
    date.and_hms_opt(at.hour, at.min, 0)?
        .and_local_timezone(Local)
        .earliest()
}

/// Next occurrence of a wall-clock time strictly after `now`.
fn next_wall_clock(now: DateTime<Local>, at: WallClock) -> DateTime<Local> {
    if let Some(today) = at_wall_clock(now.date_naive(), at) {
        if today > now {
            return today;
        }
    }
    // Tomorrow; one extra day covers a DST-skipped instant.
    for days in 1..=2 {
        if let Some(dt) = at_wall_clock(now.date_naive() + Days::new(days), at) {
            return dt;
        }
    }
    now + chrono::Duration::days(1)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::apps::{AppSettings, IntervalUnit};
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn interval_job(value: u64, unit: IntervalUnit, now: DateTime<Local>) -> ScheduledJob {
        ScheduledJob::build("app", &ScheduleConfig::Interval { value, unit }, now)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn wall_clock_parsing() {
        let t = WallClock::parse("09:30").unwrap();
        assert_eq!((t.hour, t.min), (9, 30));
        assert_eq!(t.to_string(), "09:30");

        assert!(WallClock::parse("24:00").is_err());
        assert!(WallClock::parse("12:60").is_err());
        assert!(WallClock::parse("noon").is_err());
        assert!(WallClock::parse("").is_err());
    }

    #[test]
    fn disabled_schedule_builds_no_job() {
        let job = ScheduledJob::build("app", &ScheduleConfig::Disabled, Local::now()).unwrap();
        assert!(job.is_none());
    }

    #[test]
    fn malformed_time_is_a_schedule_error() {
        let config = ScheduleConfig::Daily {
            time: "whenever".to_owned(),
        };
        let err = ScheduledJob::build("app", &config, Local::now()).unwrap_err();
        assert!(matches!(err, WardenError::Schedule(_)));
    }

    #[test]
    fn one_second_interval_fires_once_per_elapsed_second() {
        let t0 = local(2024, 1, 15, 12, 0, 0);
        let mut job = interval_job(1, IntervalUnit::Seconds, t0);

        let mut firings = 0;
        for i in 1..=10i64 {
            let now = t0 + chrono::Duration::seconds(i);
            assert!(now >= job.next_fire(), "tick {i} should be due");
            assert!(job.poll(now).is_some(), "tick {i} should fire");
            firings += 1;
            // Same instant again: never twice for one elapsed second.
            assert!(job.poll(now).is_none());
        }
        assert_eq!(firings, 10);
    }

    #[test]
    fn sub_second_ticks_do_not_double_fire() {
        let t0 = local(2024, 1, 15, 12, 0, 0);
        let mut job = interval_job(1, IntervalUnit::Seconds, t0);

        assert!(job.poll(t0 + chrono::Duration::milliseconds(500)).is_none());
        assert!(job.poll(t0 + chrono::Duration::milliseconds(1000)).is_some());
        // Next fire was recomputed from 12:00:01; 12:00:01.4 is not due.
        assert!(job.poll(t0 + chrono::Duration::milliseconds(1400)).is_none());
    }

    #[test]
    fn interval_zero_clamps_to_one_second() {
        let t0 = local(2024, 1, 15, 12, 0, 0);
        let job = interval_job(0, IntervalUnit::Seconds, t0);
        assert_eq!(job.next_fire(), t0 + chrono::Duration::seconds(1));
    }

    #[test]
    fn interval_next_fire_recomputes_from_actual_fire_time() {
        // Drift is preserved: a late tick pushes the whole schedule back.
        let t0 = local(2024, 1, 15, 12, 0, 0);
        let mut job = interval_job(5, IntervalUnit::Seconds, t0);

        let late = t0 + chrono::Duration::seconds(8);
        job.poll(late).unwrap();
        assert_eq!(job.next_fire(), late + chrono::Duration::seconds(5));
    }

    #[test]
    fn daily_fires_today_when_time_is_ahead() {
        let now = local(2024, 1, 15, 8, 0, 0);
        let config = ScheduleConfig::Daily {
            time: "09:00".to_owned(),
        };
        let job = ScheduledJob::build("app", &config, now).unwrap().unwrap();
        assert_eq!(job.next_fire(), local(2024, 1, 15, 9, 0, 0));
    }

    #[test]
    fn daily_rolls_to_tomorrow_when_time_has_passed() {
        let now = local(2024, 1, 15, 10, 0, 0);
        let config = ScheduleConfig::Daily {
            time: "09:00".to_owned(),
        };
        let job = ScheduledJob::build("app", &config, now).unwrap().unwrap();
        assert_eq!(job.next_fire(), local(2024, 1, 16, 9, 0, 0));
    }

    #[test]
    fn daily_recomputes_next_day_after_firing() {
        let now = local(2024, 1, 15, 8, 0, 0);
        let config = ScheduleConfig::Daily {
            time: "09:00".to_owned(),
        };
        let mut job = ScheduledJob::build("app", &config, now).unwrap().unwrap();

        let fire_tick = local(2024, 1, 15, 9, 0, 0);
        let firing = job.poll(fire_tick).unwrap();
        assert!(firing.run);
        assert_eq!(job.next_fire(), local(2024, 1, 16, 9, 0, 0));
    }

    #[test]
    fn weekly_fires_one_week_out() {
        let now = local(2024, 1, 15, 8, 0, 0);
        let config = ScheduleConfig::Weekly {
            time: "12:00".to_owned(),
        };
        let job = ScheduledJob::build("app", &config, now).unwrap().unwrap();
        assert_eq!(job.next_fire(), local(2024, 1, 22, 12, 0, 0));
    }

    #[test]
    fn monthly_gate_skips_mid_month_and_runs_on_the_first() {
        let config = ScheduleConfig::Monthly {
            time: "09:00".to_owned(),
        };

        // Day 15: the gate fires but must not run the app.
        let mid_month = local(2024, 1, 15, 8, 59, 0);
        let mut job = ScheduledJob::build("app", &config, mid_month)
            .unwrap()
            .unwrap();
        let firing = job.poll(local(2024, 1, 15, 9, 0, 0)).unwrap();
        assert!(!firing.run);
        // Gate re-arms for the next day either way.
        assert_eq!(job.next_fire(), local(2024, 1, 16, 9, 0, 0));

        // Day 1: runs exactly once.
        let eve = local(2024, 1, 31, 23, 0, 0);
        let mut job = ScheduledJob::build("app", &config, eve).unwrap().unwrap();
        let firing = job.poll(local(2024, 2, 1, 9, 0, 0)).unwrap();
        assert!(firing.run);
        assert!(job.poll(local(2024, 2, 1, 9, 0, 0)).is_none());
    }

    #[test]
    fn build_jobs_skips_disabled_and_malformed() {
        let now = local(2024, 1, 15, 8, 0, 0);
        let mut defs = Vec::new();
        for (name, schedule) in [
            ("off", ScheduleConfig::Disabled),
            (
                "bad",
                ScheduleConfig::Daily {
                    time: "nonsense".to_owned(),
                },
            ),
            (
                "ok",
                ScheduleConfig::Interval {
                    value: 5,
                    unit: IntervalUnit::Minutes,
                },
            ),
        ] {
            defs.push(AppDefinition {
                name: name.to_owned(),
                dir: std::env::temp_dir(),
                settings: AppSettings {
                    schedule,
                    ..Default::default()
                },
            });
        }

        let jobs = build_jobs(defs.iter(), now);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "ok");
    }
}
