//! Captured stdout/stderr lines land in both the per-service and global
//! log buffers, bounded and in order.

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
fn stdout_lines_are_captured_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  echoer:
    cmd: "bash -c 'echo one; echo two; echo three; sleep 30'"
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start("echoer", Default::default()).unwrap();

    thread::sleep(Duration::from_millis(300));

    let tail = supervisor.get_log_tail("echoer", 10);
    let contents: Vec<_> = tail.iter().map(|l| l.content.clone()).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);

    supervisor.stop("echoer", StopOptions::default()).unwrap();
}

#[test]
fn global_tail_interleaves_multiple_services() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_project(
        &dir,
        r#"
name: demo
services:
  a:
    cmd: "bash -c 'echo from-a; sleep 30'"
  b:
    cmd: "bash -c 'echo from-b; sleep 30'"
"#,
    );
    let project = config::load_project(&path).unwrap();
    let supervisor = Supervisor::new(project);
    supervisor.start_all();

    thread::sleep(Duration::from_millis(300));

    let global = supervisor.get_log_tail_global(100);
    let services: std::collections::HashSet<_> = global.iter().map(|l| l.service.clone()).collect();
    assert!(services.contains("a"));
    assert!(services.contains("b"));

    supervisor.stop_all();
}
