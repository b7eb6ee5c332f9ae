//! On-disk application store.
//!
//! Each application is one directory under the apps root, holding a
//! `settings.toml`. A missing or unreadable settings file is never fatal:
//! the definition loads with pure defaults and a warning is logged.

use crate::apps::{AppDefinition, AppSettings};
use crate::error::{Result, WardenError};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Settings filename inside each app directory.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Loads and saves application definitions under a single apps root.
#[derive(Debug, Clone)]
pub struct AppStore {
    root: PathBuf,
}

impl AppStore {
    /// Creates a store rooted at `root`. The directory is created lazily on
    /// first load.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default apps root for the current platform.
    ///
    /// - Linux/macOS: `~/.config/appwarden/apps`
    /// - Windows: `%APPDATA%\appwarden\apps`
    pub fn default_root() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("appwarden").join("apps"))
    }

    /// Returns the apps root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads every application definition, ordered by name.
    ///
    /// Each subdirectory of the root is one application; its name is the
    /// directory name. Missing settings files yield fully defaulted
    /// definitions. Malformed settings files are logged and also yield
    /// defaults; a bad file never drops the app or aborts the load.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Store`] only if the root itself cannot be
    /// created or scanned.
    pub fn load_apps(&self) -> Result<Vec<AppDefinition>> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| WardenError::Store(format!("cannot create apps root: {e}")))?;

        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| WardenError::Store(format!("cannot scan apps root: {e}")))?;

        let mut apps = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable apps-root entry: {e}");
                    continue;
                }
            };
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %dir.display(), "skipping app directory with non-UTF-8 name");
                continue;
            };

            let settings = load_settings(&dir.join(SETTINGS_FILE), name);
            apps.push(AppDefinition {
                name: name.to_owned(),
                dir,
                settings,
            });
        }

        apps.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = apps.len(), root = %self.root.display(), "loaded app definitions");
        Ok(apps)
    }

    /// Writes `settings.toml` for an existing application directory.
    ///
    /// # Errors
    ///
    /// - [`WardenError::UnknownApp`] if no directory exists for `name`.
    /// - [`WardenError::Store`] on serialization or write failure.
    pub fn save_settings(&self, name: &str, settings: &AppSettings) -> Result<()> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(WardenError::UnknownApp(name.to_owned()));
        }

        let text = toml::to_string_pretty(settings)
            .map_err(|e| WardenError::Store(format!("cannot serialize settings: {e}")))?;
        std::fs::write(dir.join(SETTINGS_FILE), text)
            .map_err(|e| WardenError::Store(format!("cannot write settings: {e}")))?;

        debug!(app = name, "saved settings");
        Ok(())
    }

    /// Creates an application directory (with defaulted settings) if it does
    /// not already exist, then returns the loaded definition.
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::Store`] if the directory cannot be created.
    pub fn create_app(&self, name: &str) -> Result<AppDefinition> {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir)
            .map_err(|e| WardenError::Store(format!("cannot create app directory: {e}")))?;
        Ok(AppDefinition {
            name: name.to_owned(),
            dir: dir.clone(),
            settings: load_settings(&dir.join(SETTINGS_FILE), name),
        })
    }
}

/// Loads one settings file with full defaulting.
fn load_settings(path: &Path, app: &str) -> AppSettings {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return AppSettings::default();
        }
        Err(e) => {
            warn!(app, "cannot read settings file, using defaults: {e}");
            return AppSettings::default();
        }
    };

    match toml::from_str(&text) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(app, "malformed settings file, using defaults: {e}");
            AppSettings::default()
        }
    }
}
