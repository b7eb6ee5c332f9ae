//! End-to-end supervisor scenarios: autorun, scheduled restart sequencing,
//! and merged output capture, against real child processes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use appwarden::warden::RESTART_DELAY;
use appwarden::{
    AppSettings, AppStore, EventSink, IntervalUnit, OutputStream, ScheduleConfig, Warden,
};
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sink that records events as plain strings for assertions.
#[derive(Clone, Default)]
struct Recording(Arc<Mutex<Vec<String>>>);

impl Recording {
    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl EventSink for Recording {
    fn on_process_output(&mut self, name: &str, stream: OutputStream, line: &[u8]) {
        self.0.lock().unwrap().push(format!(
            "output:{name}:{stream}:{}",
            String::from_utf8_lossy(line)
        ));
    }

    fn on_process_exited(&mut self, name: &str) {
        self.0.lock().unwrap().push(format!("exited:{name}"));
    }

    fn on_app_started(&mut self, name: &str, should_focus: bool) {
        self.0
            .lock()
            .unwrap()
            .push(format!("started:{name}:{should_focus}"));
    }

    fn on_scheduled_run(&mut self, name: &str, _timestamp: DateTime<Local>) {
        self.0.lock().unwrap().push(format!("scheduled:{name}"));
    }
}

fn make_warden(
    name: &str,
    settings: AppSettings,
) -> (tempfile::TempDir, Warden, Recording) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = AppStore::new(dir.path());
    store.create_app(name).expect("create app");
    store.save_settings(name, &settings).expect("save settings");

    let sink = Recording::default();
    let warden = Warden::new(store, Box::new(sink.clone())).expect("warden");
    (dir, warden, sink)
}

#[tokio::test]
async fn autorun_app_is_running_after_startup() {
    let (_dir, mut warden, sink) = make_warden(
        "pinger",
        AppSettings {
            command: "sleep 30".to_owned(),
            autorun: true,
            ..Default::default()
        },
    );

    warden.startup();

    assert!(warden.is_running("pinger"));
    assert_eq!(sink.count("started:pinger"), 1);

    warden.stop_app("pinger").unwrap();
}

#[tokio::test]
async fn scheduled_fire_restarts_running_app_in_sequence() {
    let (_dir, mut warden, sink) = make_warden(
        "pinger",
        AppSettings {
            command: "sleep 30".to_owned(),
            ..Default::default()
        },
    );

    warden.start_app("pinger", true).unwrap();
    assert!(warden.is_running("pinger"));

    warden.trigger_scheduled_run("pinger");

    // Stop is observed immediately, before the deferred restart.
    assert!(!warden.is_running("pinger"));
    assert_eq!(sink.count("scheduled:pinger"), 1);

    tokio::time::sleep(RESTART_DELAY + Duration::from_millis(500)).await;
    warden.drain_actions();

    assert!(warden.is_running("pinger"));
    let scheduled_starts: Vec<String> = sink
        .events()
        .into_iter()
        .filter(|e| e == "started:pinger:false")
        .collect();
    assert_eq!(scheduled_starts.len(), 1, "exactly one focus-free start");

    warden.stop_app("pinger").unwrap();
}

#[tokio::test]
async fn engine_fire_starts_idle_app() {
    let (_dir, mut warden, sink) = make_warden(
        "cycler",
        AppSettings {
            command: "sleep 30".to_owned(),
            schedule: ScheduleConfig::Interval {
                value: 2,
                unit: IntervalUnit::Seconds,
            },
            ..Default::default()
        },
    );

    warden.startup();
    assert!(!warden.is_running("cycler"), "no autorun configured");

    // First fire lands within ~3 s of the schedule build.
    tokio::time::sleep(Duration::from_millis(3500)).await;
    warden.drain_actions();

    assert!(warden.is_running("cycler"));
    assert_eq!(sink.count("scheduled:cycler"), 1);
    assert_eq!(sink.count("started:cycler:false"), 1);

    warden.stop_app("cycler").unwrap();
}

#[tokio::test]
async fn output_is_captured_and_exit_confirmed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = AppStore::new(dir.path());
    let app = store.create_app("shorty").expect("create app");
    std::fs::write(app.dir.join("run.sh"), "echo hello\necho oops >&2\n").unwrap();

    store
        .save_settings(
            "shorty",
            &AppSettings {
                command: "sh run.sh".to_owned(),
                path: app.dir.to_string_lossy().into_owned(),
                ..Default::default()
            },
        )
        .unwrap();

    let sink = Recording::default();
    let mut warden = Warden::new(store, Box::new(sink.clone())).expect("warden");

    warden.start_app("shorty", false).unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;
    warden.drain_actions();

    let events = sink.events();
    assert!(
        events.contains(&"output:shorty:stdout:hello".to_owned()),
        "events: {events:?}"
    );
    assert!(
        events.contains(&"output:shorty:stderr:oops".to_owned()),
        "events: {events:?}"
    );
    assert!(events.contains(&"exited:shorty".to_owned()), "events: {events:?}");
    assert!(!warden.is_running("shorty"), "exit removes the entry");
}

#[tokio::test]
async fn exited_app_can_be_started_again() {
    let (_dir, mut warden, sink) = make_warden(
        "oneshot",
        AppSettings {
            command: "echo done".to_owned(),
            ..Default::default()
        },
    );

    warden.start_app("oneshot", false).unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    warden.drain_actions();
    assert!(!warden.is_running("oneshot"));

    // Exited entries are gone, so an immediate restart is allowed.
    warden.start_app("oneshot", false).unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;
    warden.drain_actions();

    assert_eq!(sink.count("started:oneshot"), 2);
    assert_eq!(sink.count("exited:oneshot"), 2);
}
