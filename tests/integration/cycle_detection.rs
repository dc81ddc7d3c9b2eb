//! P2: a dependency cycle is rejected at load time with a path-shaped message.

use std::io::Write as _;

use devproc_core::config;
use devproc_core::error::ProcessManagerError;

fn write_project(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("devproc.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn direct_cycle_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: cyclic
services:
  a:
    cmd: "sleep 1"
    depends_on: [b]
  b:
    cmd: "sleep 1"
    depends_on: [a]
"#,
    );

    let err = config::load_project(&path).unwrap_err();
    match err {
        ProcessManagerError::InvalidConfig(msg) => {
            assert!(msg.contains("cycle"));
            assert!(msg.contains("a"));
            assert!(msg.contains("b"));
        }
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[test]
fn longer_cycle_through_three_services_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: cyclic
services:
  a:
    cmd: "sleep 1"
    depends_on: [b]
  b:
    cmd: "sleep 1"
    depends_on: [c]
  c:
    cmd: "sleep 1"
    depends_on: [a]
"#,
    );

    assert!(matches!(
        config::load_project(&path),
        Err(ProcessManagerError::InvalidConfig(_))
    ));
}

#[test]
fn self_dependency_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: cyclic
services:
  a:
    cmd: "sleep 1"
    depends_on: [a]
"#,
    );

    assert!(matches!(
        config::load_project(&path),
        Err(ProcessManagerError::InvalidConfig(_))
    ));
}
