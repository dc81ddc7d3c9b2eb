//! P3: a dependent waiting on `healthy` never starts before the probe passes.
//! Also covers gate-mode exhaustion producing `failed`.

use std::io::Write as _;
use std::thread;
use std::time::Duration;

use devproc_core::config;
use devproc_core::supervisor::{ServiceStatus, Supervisor};

fn write_project(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("devproc.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn dependent_waits_for_dependency_healthcheck() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  db:
    cmd: "sleep 5"
    healthcheck:
      cmd: "true"
      interval: 50ms
      timeout: 500ms
      retries: 3
  api:
    cmd: "sleep 5"
    depends_on:
      db: healthy
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);

    supervisor.start("api", Default::default()).unwrap();

    assert!(matches!(supervisor.get_state("db"), Some(ServiceStatus::Healthy)));
    assert!(matches!(
        supervisor.get_state("api"),
        Some(ServiceStatus::Running) | Some(ServiceStatus::Healthy)
    ));

    supervisor.stop_all();
}

#[test]
fn gate_mode_failure_marks_service_failed_and_blocks_dependent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  db:
    cmd: "sleep 5"
    healthcheck:
      cmd: "false"
      interval: 30ms
      timeout: 200ms
      retries: 2
  api:
    cmd: "sleep 5"
    depends_on:
      db: healthy
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);

    let result = supervisor.start("api", Default::default());
    assert!(result.is_err());

    thread::sleep(Duration::from_millis(50));
    assert!(matches!(supervisor.get_state("db"), Some(ServiceStatus::Failed)));

    supervisor.stop_all();
}

#[test]
fn poll_mode_flaps_between_running_and_healthy() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  flaky:
    cmd: "sleep 5"
    healthcheck:
      cmd: "true"
      interval: 30ms
      timeout: 200ms
      retries: 1
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);

    supervisor.start("flaky", Default::default()).unwrap();
    assert!(matches!(supervisor.get_state("flaky"), Some(ServiceStatus::Healthy)));

    supervisor.stop_all();
}
