//! Thin demonstration binary for `devproc-core`.
//!
//! Loads a project file, starts every service, prints state transitions as
//! they happen, and shuts everything down cleanly on SIGINT/SIGTERM.

use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use nix::sys::signal::{self, Signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use devproc_core::config;
use devproc_core::events::Event;
use devproc_core::supervisor::Supervisor;

static SHOULD_STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_signal(_: i32) {
    SHOULD_STOP.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() -> Result<(), Box<dyn Error>> {
    unsafe {
        let action = signal::SigAction::new(
            signal::SigHandler::Handler(handle_signal),
            signal::SaFlags::empty(),
            signal::SigSet::empty(),
        );
        signal::sigaction(Signal::SIGINT, &action)?;
        signal::sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}

/// Blocks until a shutdown signal arrives, then stops every service.
fn spawn_shutdown_waiter(supervisor: Supervisor) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !SHOULD_STOP.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        info!("shutdown signal received, stopping all services");
        for (service, err) in supervisor.stop_all() {
            error!(service, %err, "error while stopping service");
        }
        process::exit(0);
    })
}

fn spawn_event_logger(supervisor: &Supervisor) -> JoinHandle<()> {
    let events = supervisor.subscribe();
    std::thread::spawn(move || {
        for event in events {
            match event {
                Event::StateChange { service, status } => {
                    info!(service, ?status, "state change");
                }
                Event::Error { service, message } => {
                    error!(service, message, "service error");
                }
                Event::AllStopped => info!("all services stopped"),
                Event::ConfigReloaded(changes) => info!(?changes, "config reloaded"),
                Event::ConfigError(message) => error!(message, "config reload failed"),
                _ => {}
            }
        }
    })
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    install_signal_handlers()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("devproc.yaml"));

    let project = config::load_project(&config_path)?;
    info!(project = %project.name, path = %config_path.display(), "loaded project");

    let supervisor = Supervisor::new(project);
    spawn_event_logger(&supervisor);

    let errors = supervisor.start_all();
    for (service, err) in &errors {
        error!(service, %err, "failed to start service");
    }
    if !errors.is_empty() {
        process::exit(1);
    }

    let waiter = spawn_shutdown_waiter(supervisor);
    let _ = waiter.join();
    Ok(())
}
