//! P9: hot reload adds/removes/restarts exactly the services that changed,
//! and a failed reload leaves the running set untouched.

use std::io::Write as _;

use devproc_core::config;
use devproc_core::supervisor::{ServiceStatus, Supervisor};

fn write_project(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("devproc.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn reload_adds_a_new_service_without_touching_existing_ones() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  a:
    cmd: "sleep 30"
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start_all();

    write_project(
        &dir,
        r#"
name: demo
services:
  a:
    cmd: "sleep 30"
  b:
    cmd: "sleep 30"
"#,
    );

    let changes = supervisor.reload_config().unwrap();
    assert_eq!(changes.added, vec!["b".to_string()]);
    assert!(changes.removed.is_empty());
    assert!(changes.modified.is_empty());

    assert!(matches!(supervisor.get_state("a"), Some(ServiceStatus::Running)));
    assert!(matches!(supervisor.get_state("b"), Some(ServiceStatus::Stopped)));

    supervisor.stop_all();
}

#[test]
fn reload_removes_a_service_and_stops_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  a:
    cmd: "sleep 30"
  b:
    cmd: "sleep 30"
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start_all();

    write_project(
        &dir,
        r#"
name: demo
services:
  a:
    cmd: "sleep 30"
"#,
    );

    let changes = supervisor.reload_config().unwrap();
    assert_eq!(changes.removed, vec!["b".to_string()]);
    assert_eq!(supervisor.get_state("b"), None);

    supervisor.stop_all();
}

#[test]
fn failed_reload_leaves_prior_config_and_running_services_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  a:
    cmd: "sleep 30"
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start_all();

    write_project(
        &dir,
        r#"
name: demo
services:
  a:
    cmd: "sleep 30"
    depends_on: [ghost]
"#,
    );

    assert!(supervisor.reload_config().is_err());
    assert!(matches!(supervisor.get_state("a"), Some(ServiceStatus::Running)));
    assert_eq!(supervisor.get_service_config("a").unwrap().depends_on.len(), 0);

    supervisor.stop_all();
}
