//! Resource sampling observes a real running child's PID and records a
//! bounded history that survives the service's eventual exit.

use std::io::Write as _;
use std::thread;
use std::time::Duration;

use devproc_core::config;
use devproc_core::supervisor::{StopOptions, Supervisor};

fn write_project(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("devproc.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn running_service_accumulates_resource_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  burner:
    cmd: "sleep 5"
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start("burner", Default::default()).unwrap();

    thread::sleep(Duration::from_millis(2_200));

    let history = supervisor.get_resource_history("burner");
    assert!(!history.is_empty(), "expected at least one resource sample");
    for sample in &history {
        assert!(sample.cpu_percent >= 0.0);
    }

    supervisor.stop("burner", StopOptions::default()).unwrap();
}
