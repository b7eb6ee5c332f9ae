//! Application definitions and their schedule configuration.
//!
//! An application is a user-configured external console program: a command
//! line, an optional working directory, an autorun flag, and a schedule.
//! The store guarantees every field is fully defaulted on load (string
//! fields default to empty, booleans to false, the interval value to 60),
//! so the rest of the system never sees a partially absent definition.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default interval value when none is configured.
pub const DEFAULT_INTERVAL_VALUE: u64 = 60;

/// Default wall-clock trigger time for calendar schedules.
pub const DEFAULT_SCHEDULE_TIME: &str = "12:00";

/// A loaded application: its unique name, the directory it lives in, and
/// its settings.
///
/// The name is the directory name under the apps root, which makes
/// uniqueness structural rather than something to validate.
#[derive(Debug, Clone)]
pub struct AppDefinition {
    /// Unique application name.
    pub name: String,
    /// Directory holding the app's settings file.
    pub dir: PathBuf,
    /// Fully defaulted settings.
    pub settings: AppSettings,
}

/// Persisted per-application settings.
///
/// Every field carries a serde default so a partially written settings file
/// (or none at all) loads as a complete record. Table-valued fields
/// (`schedule`, `parameters`) come last so the TOML serializer never has
/// to emit a value after a table header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Working directory for the launched process (empty = inherit).
    pub path: String,
    /// Command line to launch.
    pub command: String,
    /// Associated URL shown by UI layers; never interpreted by the core.
    pub url: String,
    /// Start this app when the supervisor starts.
    pub autorun: bool,
    /// Display label for UI layers.
    pub display_name: String,
    /// Short label for UI layers.
    pub short_name: String,
    /// Group label for UI layers.
    pub group: String,
    /// When to automatically re-run the app.
    pub schedule: ScheduleConfig,
    /// Custom parameter mapping, carried as opaque data.
    pub parameters: BTreeMap<String, String>,
}

/// Schedule configuration for one application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleConfig {
    /// No automatic runs.
    #[default]
    Disabled,
    /// Run every N units.
    Interval {
        /// Interval count; values below 1 are clamped to 1.
        value: u64,
        /// Unit of the interval count.
        unit: IntervalUnit,
    },
    /// Run once a day at a wall-clock time.
    Daily {
        /// Trigger time as `"HH:MM"`.
        time: String,
    },
    /// Run once a week at a wall-clock time.
    Weekly {
        /// Trigger time as `"HH:MM"`.
        time: String,
    },
    /// Run once a month at a wall-clock time (on the 1st).
    Monthly {
        /// Trigger time as `"HH:MM"`.
        time: String,
    },
}

impl ScheduleConfig {
    /// Returns `true` unless the schedule is [`ScheduleConfig::Disabled`].
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Returns the interval period in seconds, clamped to at least 1 second.
    ///
    /// `None` for calendar and disabled schedules.
    pub fn interval_secs(&self) -> Option<u64> {
        match self {
            Self::Interval { value, unit } => Some((*value).max(1) * unit.secs()),
            _ => None,
        }
    }

    /// A defaulted interval schedule: every 60 minutes.
    pub fn default_interval() -> Self {
        Self::Interval {
            value: DEFAULT_INTERVAL_VALUE,
            unit: IntervalUnit::Minutes,
        }
    }
}

impl std::fmt::Display for ScheduleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Interval { value, unit } => {
                write!(f, "every {} {}", (*value).max(1), unit)
            }
            Self::Daily { time } => write!(f, "daily at {time}"),
            Self::Weekly { time } => write!(f, "weekly at {time}"),
            Self::Monthly { time } => write!(f, "monthly (1st) at {time}"),
        }
    }
}

/// Unit for interval schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    /// Seconds between runs.
    Seconds,
    /// Minutes between runs.
    Minutes,
    /// Hours between runs.
    Hours,
}

impl IntervalUnit {
    /// Seconds in one unit.
    pub fn secs(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3600,
        }
    }
}

impl std::fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
        };
        f.write_str(label)
    }
}

impl AppDefinition {
    /// Creates a definition with default settings (used when a settings
    /// file is absent or unreadable).
    pub fn with_defaults(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            settings: AppSettings::default(),
        }
    }
}
