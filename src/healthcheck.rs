//! Healthcheck runner: gate-mode retries and continuous poll-mode monitoring.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use indexmap::IndexMap;

use crate::command;
use crate::config::ProbeSpec;
use crate::streams::{LogLine, Stream};

/// How often the gate/poll loops check for child exit while waiting out a
/// probe's timeout. Short enough that cancellation and timeouts feel prompt.
const POLL_STEP: Duration = Duration::from_millis(25);

/// Runs a single probe attempt, waiting up to `timeout` for it to exit.
/// Force-kills the probe on timeout. Returns `true` iff the probe exited 0.
fn run_attempt(service: &str, cwd: &Path, env: &IndexMap<String, String>, probe: &ProbeSpec) -> bool {
    let mut child = match command::spawn(service, &probe.cmd, cwd, env) {
        Ok(c) => c,
        Err(_) => return false,
    };

    let deadline = Instant::now() + Duration::from_millis(probe.timeout_ms);
    loop {
        match child.try_wait() {
            Ok(Some(code)) => return code == 0,
            Ok(None) => {}
            Err(_) => return false,
        }

        if Instant::now() >= deadline {
            let _ = child.kill_hard();
            let _ = child.wait();
            return false;
        }

        thread::sleep(POLL_STEP);
    }
}

/// Gate mode (`waitForHealthy`): retries the probe until it succeeds or
/// `retries` consecutive failures have occurred. Emits a synthetic stderr
/// log line describing the outcome of every attempt.
pub fn wait_for_healthy<F>(
    service: &str,
    cwd: &Path,
    env: &IndexMap<String, String>,
    probe: &ProbeSpec,
    mut emit_log: F,
) -> bool
where
    F: FnMut(LogLine),
{
    for attempt in 1..=probe.retries {
        let healthy = run_attempt(service, cwd, env, probe);

        let content = if healthy {
            format!("healthcheck attempt {attempt}/{}: ok", probe.retries)
        } else {
            format!("healthcheck attempt {attempt}/{}: failed", probe.retries)
        };
        emit_log(LogLine {
            timestamp: Utc::now(),
            service: service.to_string(),
            stream: Stream::Stderr,
            content,
        });

        if healthy {
            return true;
        }

        if attempt < probe.retries {
            thread::sleep(Duration::from_millis(probe.interval_ms));
        }
    }
    false
}

/// A handle to a running poll-mode healthcheck. Dropping it does not stop
/// the poller; call [`Poller::stop`] explicitly for prompt cancellation.
pub struct Poller {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Poll mode (`startPoller`): repeats the probe every `intervalMs` after
    /// the prior attempt's completion (not a fixed schedule), at most one
    /// probe in flight at a time. `on_result` is invoked with `true`/`false`
    /// after every attempt.
    pub fn start<F>(
        service: String,
        cwd: PathBuf,
        env: IndexMap<String, String>,
        probe: ProbeSpec,
        mut on_result: F,
    ) -> Self
    where
        F: FnMut(bool) + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_thread = stop_flag.clone();

        let handle = thread::spawn(move || {
            while !stop_flag_thread.load(Ordering::SeqCst) {
                let healthy = run_attempt(&service, &cwd, &env, &probe);
                on_result(healthy);

                let wait_until = Instant::now() + Duration::from_millis(probe.interval_ms);
                while Instant::now() < wait_until {
                    if stop_flag_thread.load(Ordering::SeqCst) {
                        return;
                    }
                    thread::sleep(POLL_STEP.min(Duration::from_millis(probe.interval_ms)));
                }
            }
        });

        Poller {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Signals the poller to stop and blocks until its thread has exited.
    /// No further `on_result` callbacks fire after this returns.
    pub fn stop(mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
