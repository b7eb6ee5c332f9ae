//! appwarden daemon.
//!
//! Loads the app definitions, starts every autorun app, and keeps
//! re-running scheduled apps until Ctrl-C. Process output and lifecycle
//! events go to the tracing log, which plays the role a terminal panel
//! would in a GUI host.
//!
//! Usage: `appwarden [APPS_ROOT]`. The root defaults to the platform
//! config directory (`~/.config/appwarden/apps` on Linux/macOS).

use anyhow::Context;
use appwarden::{AppStore, LogSink, Warden};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Initializes tracing to stdout plus a daily-rolling log file.
///
/// The returned guard must stay alive for the file writer to flush.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("appwarden=info"));

    let log_dir = dirs::data_local_dir()
        .map(|d| d.join("appwarden").join("logs"))
        .filter(|dir| std::fs::create_dir_all(dir).is_ok());

    match log_dir {
        Some(dir) => {
            let (file, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "appwarden.log"));
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stdout.and(file))
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();

    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(AppStore::default_root)
        .context("cannot determine apps root; pass it as the first argument")?;

    let store = AppStore::new(root);
    tracing::info!(root = %store.root().display(), "appwarden starting");

    let mut warden = Warden::new(store, Box::new(LogSink))?;
    warden.startup();

    match serde_json::to_string(&warden.status()) {
        Ok(status) => tracing::info!(%status, "startup complete"),
        Err(e) => tracing::warn!("cannot serialize status snapshot: {e}"),
    }

    tokio::select! {
        _ = warden.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
    Ok(())
}
