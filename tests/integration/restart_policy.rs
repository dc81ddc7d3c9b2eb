//! P6/P7-adjacent: restart policy behavior on crash vs. intentional stop.

use std::io::Write as _;
use std::thread;
use std::time::Duration;

use devproc_core::config;
use devproc_core::supervisor::{ServiceStatus, StopOptions, Supervisor};

fn write_project(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("devproc.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn on_failure_policy_restarts_after_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  flaky:
    cmd: "bash -c 'exit 1'"
    restart: on-failure
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start("flaky", Default::default()).unwrap();

    thread::sleep(Duration::from_millis(1_500));

    let state = supervisor
        .get_all_states()
        .into_iter()
        .find(|(n, _)| n == "flaky")
        .unwrap()
        .1;
    assert!(state.restart_count >= 1);

    supervisor.stop("flaky", StopOptions::default()).unwrap();
}

#[test]
fn no_restart_policy_leaves_service_stopped_after_crash() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  once:
    cmd: "bash -c 'exit 1'"
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start("once", Default::default()).unwrap();

    thread::sleep(Duration::from_millis(300));

    assert!(matches!(supervisor.get_state("once"), Some(ServiceStatus::Crashed)));
    let state = supervisor
        .get_all_states()
        .into_iter()
        .find(|(n, _)| n == "once")
        .unwrap()
        .1;
    assert_eq!(state.restart_count, 0);
}

#[test]
fn intentional_stop_does_not_trigger_restart_even_with_always_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  svc:
    cmd: "sleep 30"
    restart: always
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start("svc", Default::default()).unwrap();

    supervisor.stop("svc", StopOptions::default()).unwrap();
    thread::sleep(Duration::from_millis(1_500));

    assert!(matches!(supervisor.get_state("svc"), Some(ServiceStatus::Stopped)));
}
