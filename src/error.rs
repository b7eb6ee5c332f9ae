//! Error types for the appwarden supervisor.

/// Top-level error type for the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// The definition has no command configured, so there is nothing to launch.
    #[error("no command configured for app '{0}'")]
    NoCommand(String),

    /// A process for this definition is already running.
    #[error("app '{0}' is already running")]
    AlreadyRunning(String),

    /// The OS refused to spawn the process.
    #[error("failed to launch app '{name}': {source}")]
    LaunchFailed {
        /// Application name the launch was attempted for.
        name: String,
        /// The underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// No running process exists for this definition.
    #[error("app '{0}' is not running")]
    NotRunning(String),

    /// The named application was never loaded from the store.
    #[error("unknown app: {0}")]
    UnknownApp(String),

    /// Settings persistence error (read, write, serialize).
    #[error("store error: {0}")]
    Store(String),

    /// Malformed schedule configuration.
    #[error("schedule error: {0}")]
    Schedule(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, WardenError>;
