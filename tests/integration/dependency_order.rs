//! P1: a dependent never reaches `running` before its dependency does.

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
fn chain_of_three_starts_in_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: chain
services:
  db:
    cmd: "sleep 2"
  api:
    cmd: "sleep 2"
    depends_on: [db]
  web:
    cmd: "sleep 2"
    depends_on: [api]
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);

    let errors = supervisor.start_all();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");

    for name in ["db", "api", "web"] {
        assert!(matches!(supervisor.get_state(name), Some(ServiceStatus::Running)));
    }

    let states = supervisor.get_all_states();
    let position = |name: &str| states.iter().position(|(n, _)| n == name).unwrap();
    assert!(position("db") < position("api"));
    assert!(position("api") < position("web"));

    supervisor.stop_all();
}

#[test]
fn starting_a_leaf_service_brings_up_its_dependencies_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: chain
services:
  db:
    cmd: "sleep 2"
  api:
    cmd: "sleep 2"
    depends_on: [db]
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);

    supervisor.start("api", Default::default()).unwrap();
    thread::sleep(Duration::from_millis(100));

    assert!(matches!(supervisor.get_state("db"), Some(ServiceStatus::Running)));
    assert!(matches!(supervisor.get_state("api"), Some(ServiceStatus::Running)));

    supervisor.stop_all();
}
