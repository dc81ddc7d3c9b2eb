//! P8: graceful stop escalates to a hard kill after the timeout elapses.

use std::io::Write as _;
use std::time::Instant;

use devproc_core::config;
use devproc_core::supervisor::{ServiceStatus, StopOptions, Supervisor};

fn write_project(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("devproc.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn cooperative_process_stops_promptly_on_sigterm() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  good:
    cmd: "sleep 30"
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start("good", Default::default()).unwrap();

    let started = Instant::now();
    supervisor
        .stop(
            "good",
            StopOptions {
                timeout_ms: Some(2_000),
                ..Default::default()
            },
        )
        .unwrap();

    assert!(started.elapsed() < std::time::Duration::from_secs(2));
    assert!(matches!(supervisor.get_state("good"), Some(ServiceStatus::Stopped)));
}

#[test]
fn signal_ignoring_process_is_hard_killed_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  stubborn:
    cmd: "bash -c 'trap \"\" TERM; sleep 30'"
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start("stubborn", Default::default()).unwrap();

    let started = Instant::now();
    supervisor
        .stop(
            "stubborn",
            StopOptions {
                timeout_ms: Some(500),
                ..Default::default()
            },
        )
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= std::time::Duration::from_millis(500));
    assert!(elapsed < std::time::Duration::from_secs(5));
    assert!(matches!(supervisor.get_state("stubborn"), Some(ServiceStatus::Stopped)));
}

#[test]
fn stopping_a_service_also_stops_its_dependents_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  db:
    cmd: "sleep 30"
  api:
    cmd: "sleep 30"
    depends_on: [db]
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start_all();

    supervisor.stop("db", StopOptions::default()).unwrap();

    assert!(matches!(supervisor.get_state("api"), Some(ServiceStatus::Stopped)));
    assert!(matches!(supervisor.get_state("db"), Some(ServiceStatus::Stopped)));
}
