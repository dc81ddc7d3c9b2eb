//! The supervisor: per-service state machine, dependency-gated start,
//! coordinated stop, restart policy, hot reload, and the event bus.

use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::command;
use crate::config::{self, Project, RestartPolicy, ServiceSpec, WaitCondition};
use crate::error::ProcessManagerError;
use crate::events::{Event, EventBus, ReloadChanges};
use crate::healthcheck::{self, Poller};
use crate::logs::LogBuffers;
use crate::resolver;
use crate::resources::{ResourceSample, ResourceSampler};
use crate::streams::{self, LogLine, Stream};

const DEPENDENCY_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_STOP_TIMEOUT_MS: u64 = 10_000;
const RESTART_BACKOFF: Duration = Duration::from_secs(1);
const SAMPLER_TICK: Duration = Duration::from_secs(1);
const CPU_HYSTERESIS: f64 = 0.1;
const RSS_HYSTERESIS_BYTES: i64 = 1024;

/// The per-service lifecycle state, per the state machine in §4.I.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Stopped,
    Starting,
    Running,
    Healthy,
    Stopping,
    Crashed,
    Failed,
}

fn is_terminal(status: ServiceStatus) -> bool {
    matches!(
        status,
        ServiceStatus::Stopped | ServiceStatus::Crashed | ServiceStatus::Failed
    )
}

fn condition_satisfied(condition: WaitCondition, status: ServiceStatus) -> bool {
    match condition {
        WaitCondition::Started => matches!(status, ServiceStatus::Running | ServiceStatus::Healthy),
        WaitCondition::Healthy => status == ServiceStatus::Healthy,
    }
}

/// Mutable runtime state for a single service.
#[derive(Debug, Clone)]
pub struct ServiceRuntimeState {
    pub status: ServiceStatus,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub restart_count: u32,
    pub last_error: Option<String>,
    pub resources: Option<ResourceSample>,
}

impl Default for ServiceRuntimeState {
    fn default() -> Self {
        ServiceRuntimeState {
            status: ServiceStatus::Stopped,
            pid: None,
            started_at: None,
            stopped_at: None,
            exit_code: None,
            restart_count: 0,
            last_error: None,
            resources: None,
        }
    }
}

struct ServiceEntry {
    state: ServiceRuntimeState,
    poller: Option<Poller>,
}

/// Options for [`Supervisor::start`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    pub force: bool,
    pub skip_deps: bool,
}

/// Options for [`Supervisor::stop`].
#[derive(Debug, Clone, Default)]
pub struct StopOptions {
    pub skip_dependents: bool,
    pub signal: Option<String>,
    pub timeout_ms: Option<u64>,
}

struct Inner {
    project: Mutex<Project>,
    entries: Mutex<IndexMap<String, ServiceEntry>>,
    cond: Condvar,
    op_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    logs: LogBuffers,
    sampler: Mutex<ResourceSampler>,
    events: EventBus,
    last_published: Mutex<HashMap<String, ResourceSample>>,
}

/// The orchestrator. Cheaply cloneable: every clone shares the same
/// underlying state, which is how background threads (stream readers,
/// exit waiters, the healthcheck poller, the resource sampler ticker) call
/// back into supervisor operations without borrowing across thread
/// boundaries.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Builds a supervisor for `project`, with every service initially
    /// `stopped`, and starts the background resource-sampling ticker.
    pub fn new(project: Project) -> Self {
        let mut entries = IndexMap::new();
        for name in project.services.keys() {
            entries.insert(
                name.clone(),
                ServiceEntry {
                    state: ServiceRuntimeState::default(),
                    poller: None,
                },
            );
        }

        let supervisor = Supervisor {
            inner: Arc::new(Inner {
                project: Mutex::new(project),
                entries: Mutex::new(entries),
                cond: Condvar::new(),
                op_locks: Mutex::new(HashMap::new()),
                logs: LogBuffers::default(),
                sampler: Mutex::new(ResourceSampler::default()),
                events: EventBus::new(),
                last_published: Mutex::new(HashMap::new()),
            }),
        };

        supervisor.spawn_sampler_ticker();
        supervisor
    }

    fn spawn_sampler_ticker(&self) {
        let sup = self.clone();
        thread::spawn(move || loop {
            thread::sleep(SAMPLER_TICK);
            sup.sampler_tick();
        });
    }

    fn sampler_tick(&self) {
        let updated = self.inner.sampler.lock().expect("sampler mutex poisoned").tick();
        if updated.is_empty() {
            return;
        }

        let mut changed = Vec::new();
        {
            let mut last = self.inner.last_published.lock().expect("last_published mutex poisoned");
            let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
            for (name, sample) in updated {
                if let Some(entry) = entries.get_mut(&name) {
                    entry.state.resources = Some(sample);
                }
                let publish = match last.get(&name) {
                    None => true,
                    Some(prev) => {
                        (prev.cpu_percent - sample.cpu_percent).abs() > CPU_HYSTERESIS
                            || (prev.rss_bytes as i64 - sample.rss_bytes as i64).abs()
                                > RSS_HYSTERESIS_BYTES
                    }
                };
                if publish {
                    last.insert(name.clone(), sample);
                    changed.push((name, sample));
                }
            }
        }

        if !changed.is_empty() {
            self.inner.events.publish(Event::ResourcesUpdated(changed));
        }
    }

    fn op_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.op_locks.lock().expect("op_locks mutex poisoned");
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Returns the current status of a service, or `None` if unknown.
    pub fn get_state(&self, name: &str) -> Option<ServiceStatus> {
        self.inner
            .entries
            .lock()
            .expect("entries mutex poisoned")
            .get(name)
            .map(|e| e.state.status)
    }

    /// Returns every service's runtime state, in topological order.
    pub fn get_all_states(&self) -> Vec<(String, ServiceRuntimeState)> {
        let order = {
            let project = self.inner.project.lock().expect("project mutex poisoned");
            resolver::topological_order(&project.services).unwrap_or_default()
        };
        let entries = self.inner.entries.lock().expect("entries mutex poisoned");
        order
            .into_iter()
            .filter_map(|name| entries.get(&name).map(|e| (name.clone(), e.state.clone())))
            .collect()
    }

    /// Returns a service's resolved configuration, or `None` if unknown.
    pub fn get_service_config(&self, name: &str) -> Option<ServiceSpec> {
        self.inner
            .project
            .lock()
            .expect("project mutex poisoned")
            .services
            .get(name)
            .cloned()
    }

    /// Returns the configured groups, in declaration order.
    pub fn get_groups(&self) -> IndexMap<String, Vec<String>> {
        self.inner.project.lock().expect("project mutex poisoned").groups.clone()
    }

    /// Returns a service's bounded resource-sample history.
    pub fn get_resource_history(&self, name: &str) -> Vec<ResourceSample> {
        self.inner.sampler.lock().expect("sampler mutex poisoned").history(name)
    }

    /// Returns the last `n` log lines for a service.
    pub fn get_log_tail(&self, name: &str, n: usize) -> Vec<LogLine> {
        self.inner.logs.tail(name, n)
    }

    /// Returns the last `n` log lines across all services, interleaved.
    pub fn get_log_tail_global(&self, n: usize) -> Vec<LogLine> {
        self.inner.logs.tail_global(n)
    }

    /// Subscribes to the event bus; events are delivered in publish order.
    pub fn subscribe(&self) -> Receiver<Event> {
        self.inner.events.subscribe()
    }

    fn get_pid(&self, name: &str) -> Option<u32> {
        self.inner
            .entries
            .lock()
            .expect("entries mutex poisoned")
            .get(name)
            .and_then(|e| e.state.pid)
    }

    fn dependents_of(&self, name: &str) -> Vec<String> {
        let project = self.inner.project.lock().expect("project mutex poisoned");
        project
            .services
            .iter()
            .filter(|(_, spec)| spec.depends_on.contains_key(name))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }

    fn set_status(&self, name: &str, status: ServiceStatus) {
        {
            let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
            if let Some(entry) = entries.get_mut(name) {
                entry.state.status = status;
            }
        }
        self.inner.cond.notify_all();
        self.publish_state_change(name);
        self.maybe_publish_all_stopped();
    }

    fn set_failed(&self, name: &str, message: String) {
        {
            let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
            if let Some(entry) = entries.get_mut(name) {
                entry.state.status = ServiceStatus::Failed;
                entry.state.last_error = Some(message.clone());
            }
        }
        self.inner.cond.notify_all();
        self.publish_state_change(name);
        self.inner.events.publish(Event::Error {
            service: name.to_string(),
            message,
        });
        self.maybe_publish_all_stopped();
    }

    fn publish_state_change(&self, name: &str) {
        if let Some(status) = self.get_state(name) {
            self.inner.events.publish(Event::StateChange {
                service: name.to_string(),
                status,
            });
        }
    }

    fn maybe_publish_all_stopped(&self) {
        let all_terminal = {
            let entries = self.inner.entries.lock().expect("entries mutex poisoned");
            entries.values().all(|e| is_terminal(e.state.status))
        };
        if all_terminal {
            self.inner.events.publish(Event::AllStopped);
        }
    }

    fn wait_for_condition(
        &self,
        caller: &str,
        dependency: &str,
        condition: WaitCondition,
        deadline: Instant,
    ) -> Result<(), ProcessManagerError> {
        let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
        loop {
            match entries.get(dependency).map(|e| e.state.status) {
                Some(status) if condition_satisfied(condition, status) => return Ok(()),
                Some(ServiceStatus::Failed) | Some(ServiceStatus::Crashed) => {
                    return Err(ProcessManagerError::DependencyFailed {
                        service: caller.to_string(),
                        dependency: dependency.to_string(),
                    });
                }
                _ => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ProcessManagerError::DependencyTimeout {
                    service: caller.to_string(),
                    dependency: dependency.to_string(),
                });
            }

            let step = (deadline - now).min(Duration::from_millis(100));
            let (guard, _timed_out) = self
                .inner
                .cond
                .wait_timeout(entries, step)
                .expect("entries mutex poisoned");
            entries = guard;
        }
    }

    fn wait_until_exited(&self, name: &str, deadline: Instant) -> bool {
        let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
        loop {
            if entries.get(name).map(|e| e.state.pid.is_none()).unwrap_or(true) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let step = (deadline - now).min(Duration::from_millis(100));
            let (guard, _timed_out) = self
                .inner
                .cond
                .wait_timeout(entries, step)
                .expect("entries mutex poisoned");
            entries = guard;
        }
    }

    fn wait_until_exited_unbounded(&self, name: &str) {
        let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
        while entries.get(name).map(|e| e.state.pid.is_some()).unwrap_or(false) {
            let (guard, _timed_out) = self
                .inner
                .cond
                .wait_timeout(entries, Duration::from_millis(200))
                .expect("entries mutex poisoned");
            entries = guard;
        }
    }

    /// Starts a service, recursively satisfying its dependencies first
    /// unless `skip_deps` is set. No-op if already running/healthy unless
    /// `force`.
    pub fn start(&self, name: &str, opts: StartOptions) -> Result<(), ProcessManagerError> {
        {
            let entries = self.inner.entries.lock().expect("entries mutex poisoned");
            let status = entries
                .get(name)
                .map(|e| e.state.status)
                .ok_or_else(|| ProcessManagerError::UnknownService(name.to_string()))?;
            if matches!(status, ServiceStatus::Running | ServiceStatus::Healthy) && !opts.force {
                return Ok(());
            }
        }

        if opts.force {
            self.stop(name, StopOptions::default())?;
        }

        let op_lock = self.op_lock(name);
        let _guard = op_lock.lock().expect("op lock poisoned");

        {
            let entries = self.inner.entries.lock().expect("entries mutex poisoned");
            let status = entries.get(name).map(|e| e.state.status);
            if matches!(status, Some(ServiceStatus::Running) | Some(ServiceStatus::Healthy)) && !opts.force {
                return Ok(());
            }
        }

        let spec = {
            let project = self.inner.project.lock().expect("project mutex poisoned");
            project
                .services
                .get(name)
                .cloned()
                .ok_or_else(|| ProcessManagerError::UnknownService(name.to_string()))?
        };

        if !opts.skip_deps {
            for (dep, condition) in &spec.depends_on {
                self.start(
                    dep,
                    StartOptions {
                        force: false,
                        skip_deps: false,
                    },
                )?;

                let deadline = Instant::now() + DEPENDENCY_WAIT_TIMEOUT;
                if let Err(e) = self.wait_for_condition(name, dep, *condition, deadline) {
                    self.set_failed(name, e.to_string());
                    return Err(e);
                }
            }
        }

        self.set_status(name, ServiceStatus::Starting);

        let mut child = match command::spawn(name, &spec.cmd, &spec.cwd, &spec.env) {
            Ok(c) => c,
            Err(e) => {
                self.set_failed(name, e.to_string());
                return Err(e);
            }
        };

        let pid = child.pid;
        {
            let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
            if let Some(entry) = entries.get_mut(name) {
                entry.state.pid = Some(pid);
                entry.state.started_at = Some(Utc::now());
                entry.state.exit_code = None;
            }
        }
        info!(service = name, pid, "service spawned");

        self.inner.sampler.lock().expect("sampler mutex poisoned").track(name, pid);

        let stdout = child.take_stdout().expect("stdout was piped");
        let stderr = child.take_stderr().expect("stderr was piped");

        let sup_out = self.clone();
        streams::spawn_reader(name.to_string(), Stream::Stdout, stdout, move |line| {
            sup_out.inner.logs.append(line.clone());
            sup_out.inner.events.publish(Event::Log(line));
        });
        let sup_err = self.clone();
        streams::spawn_reader(name.to_string(), Stream::Stderr, stderr, move |line| {
            sup_err.inner.logs.append(line.clone());
            sup_err.inner.events.publish(Event::Log(line));
        });

        let sup_wait = self.clone();
        let name_wait = name.to_string();
        let restart_policy = spec.restart;
        thread::spawn(move || {
            let exit_code = child.wait().ok().flatten();
            sup_wait.handle_exit(&name_wait, exit_code, restart_policy);
        });

        match &spec.healthcheck {
            None => {
                // A concurrent `handle_exit` may have already observed the child exit
                // and cleared the pid; don't stomp its terminal status with `Running`.
                if self.get_pid(name).is_some() {
                    self.set_status(name, ServiceStatus::Running);
                }
            }
            Some(probe) => {
                let sup_gate = self.clone();
                let healthy = healthcheck::wait_for_healthy(name, &spec.cwd, &spec.env, probe, move |line| {
                    sup_gate.inner.logs.append(line.clone());
                    sup_gate.inner.events.publish(Event::Log(line));
                });

                if !healthy {
                    warn!(service = name, "healthcheck exhausted");
                    self.set_failed(
                        name,
                        ProcessManagerError::HealthcheckExhausted {
                            service: name.to_string(),
                            retries: probe.retries,
                        }
                        .to_string(),
                    );
                    return Ok(());
                }

                if self.get_pid(name).is_none() {
                    // Child already exited and `handle_exit` took over; don't mark
                    // healthy and don't start a poller against a dead pid.
                    return Ok(());
                }

                self.set_status(name, ServiceStatus::Healthy);

                let sup_poll = self.clone();
                let name_poll = name.to_string();
                let poller = Poller::start(
                    name.to_string(),
                    spec.cwd.clone(),
                    spec.env.clone(),
                    probe.clone(),
                    move |ok| {
                        let current = sup_poll.get_state(&name_poll);
                        match (current, ok) {
                            (Some(ServiceStatus::Healthy), false) => {
                                sup_poll.set_status(&name_poll, ServiceStatus::Running)
                            }
                            (Some(ServiceStatus::Running), true) => {
                                sup_poll.set_status(&name_poll, ServiceStatus::Healthy)
                            }
                            _ => {}
                        }
                    },
                );

                let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
                if let Some(entry) = entries.get_mut(name) {
                    entry.poller = Some(poller);
                }
            }
        }

        Ok(())
    }

    fn handle_exit(&self, name: &str, exit_code: Option<i32>, restart_policy: RestartPolicy) {
        let (intentional_stop, poller) = {
            let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
            let Some(entry) = entries.get_mut(name) else {
                return;
            };
            let intentional_stop = entry.state.status == ServiceStatus::Stopping;
            entry.state.pid = None;
            entry.state.stopped_at = Some(Utc::now());
            entry.state.exit_code = exit_code;
            entry.state.status = if intentional_stop || exit_code == Some(0) {
                ServiceStatus::Stopped
            } else {
                ServiceStatus::Crashed
            };
            (intentional_stop, entry.poller.take())
        };

        if let Some(poller) = poller {
            poller.stop();
        }

        self.inner.sampler.lock().expect("sampler mutex poisoned").untrack(name);
        self.inner.cond.notify_all();
        self.publish_state_change(name);
        self.maybe_publish_all_stopped();

        let status_after = match self.get_state(name) {
            Some(s) => s,
            None => return,
        };
        debug!(service = name, ?status_after, exit_code, "child exited");

        let should_restart = match status_after {
            ServiceStatus::Crashed => {
                matches!(restart_policy, RestartPolicy::OnFailure | RestartPolicy::Always)
            }
            ServiceStatus::Stopped if !intentional_stop => matches!(restart_policy, RestartPolicy::Always),
            _ => false,
        };

        if should_restart {
            self.schedule_restart(name.to_string(), status_after);
        }
    }

    fn schedule_restart(&self, name: String, captured_status: ServiceStatus) {
        let captured_restart_count = self
            .inner
            .entries
            .lock()
            .expect("entries mutex poisoned")
            .get(&name)
            .map(|e| e.state.restart_count)
            .unwrap_or(0);

        let sup = self.clone();
        thread::spawn(move || {
            thread::sleep(RESTART_BACKOFF);

            let proceed = {
                let entries = sup.inner.entries.lock().expect("entries mutex poisoned");
                entries.get(&name).is_some_and(|e| {
                    e.state.status == captured_status && e.state.restart_count == captured_restart_count
                })
            };
            if !proceed {
                return;
            }

            {
                let mut entries = sup.inner.entries.lock().expect("entries mutex poisoned");
                if let Some(entry) = entries.get_mut(&name) {
                    entry.state.restart_count += 1;
                }
            }

            let _ = sup.start(
                &name,
                StartOptions {
                    force: false,
                    skip_deps: true,
                },
            );
        });
    }

    /// Stops a service. No-op unless currently `running|healthy|starting`.
    /// Recursively stops dependents first unless `skip_dependents`.
    pub fn stop(&self, name: &str, opts: StopOptions) -> Result<(), ProcessManagerError> {
        let stoppable = |status: Option<ServiceStatus>| {
            matches!(
                status,
                Some(ServiceStatus::Running) | Some(ServiceStatus::Healthy) | Some(ServiceStatus::Starting)
            )
        };

        if !stoppable(self.get_state(name)) {
            return Ok(());
        }

        let op_lock = self.op_lock(name);
        let _guard = op_lock.lock().expect("op lock poisoned");

        if !stoppable(self.get_state(name)) {
            return Ok(());
        }

        if !opts.skip_dependents {
            let dependents = self.dependents_of(name);
            let handles: Vec<_> = dependents
                .into_iter()
                .map(|dependent| {
                    let sup = self.clone();
                    thread::spawn(move || {
                        let _ = sup.stop(&dependent, StopOptions::default());
                    })
                })
                .collect();
            for handle in handles {
                let _ = handle.join();
            }
        }

        let poller = {
            let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
            entries.get_mut(name).and_then(|e| e.poller.take())
        };
        if let Some(poller) = poller {
            poller.stop();
        }

        self.set_status(name, ServiceStatus::Stopping);

        let pid = self.get_pid(name);
        let configured_signal = {
            let project = self.inner.project.lock().expect("project mutex poisoned");
            project
                .services
                .get(name)
                .map(|s| s.stop_signal.clone())
                .unwrap_or_else(|| "SIGTERM".to_string())
        };
        let signal_name = opts.signal.clone().unwrap_or(configured_signal);
        let timeout_ms = opts.timeout_ms.unwrap_or(DEFAULT_STOP_TIMEOUT_MS);

        if let Some(pid) = pid {
            match command::parse_signal(&signal_name) {
                Ok(signal) => {
                    let _ = command::send_signal(pid, signal);
                }
                Err(e) => warn!(service = name, "{e}"),
            }
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let exited = self.wait_until_exited(name, deadline);

        if !exited {
            warn!(service = name, timeout_ms, "graceful stop timed out, escalating to hard kill");
            if let Some(pid) = self.get_pid(name) {
                let _ = command::send_hard_kill(pid);
            }
            self.wait_until_exited_unbounded(name);
        }

        Ok(())
    }

    /// Stops then starts a service.
    pub fn restart(&self, name: &str) -> Result<(), ProcessManagerError> {
        self.stop(name, StopOptions::default())?;
        self.start(name, StartOptions::default())
    }

    /// Starts every service in topological order. Per-service errors are
    /// collected but do not abort the batch.
    pub fn start_all(&self) -> Vec<(String, ProcessManagerError)> {
        let order = {
            let project = self.inner.project.lock().expect("project mutex poisoned");
            resolver::topological_order(&project.services)
        };
        let order = match order {
            Ok(order) => order,
            Err(e) => return vec![("<config>".to_string(), e)],
        };

        let mut errors = Vec::new();
        for name in order {
            if let Err(e) = self.start(&name, StartOptions::default()) {
                errors.push((name, e));
            }
        }
        errors
    }

    /// Stops every service in reverse topological order.
    pub fn stop_all(&self) -> Vec<(String, ProcessManagerError)> {
        let order = {
            let project = self.inner.project.lock().expect("project mutex poisoned");
            resolver::stop_order(&project.services)
        };
        let order = match order {
            Ok(order) => order,
            Err(e) => return vec![("<config>".to_string(), e)],
        };

        let mut errors = Vec::new();
        for name in order {
            if let Err(e) = self.stop(&name, StopOptions::default()) {
                errors.push((name, e));
            }
        }
        errors
    }

    /// Stops then starts every service.
    pub fn restart_all(&self) -> Vec<(String, ProcessManagerError)> {
        let mut errors = self.stop_all();
        errors.extend(self.start_all());
        errors
    }

    fn group_members_in_order(&self, group: &str, order: Vec<String>) -> Result<Vec<String>, ProcessManagerError> {
        let project = self.inner.project.lock().expect("project mutex poisoned");
        let members = project
            .groups
            .get(group)
            .ok_or_else(|| ProcessManagerError::UnknownGroup(group.to_string()))?;
        let member_set: std::collections::HashSet<&String> = members.iter().collect();
        Ok(order.into_iter().filter(|n| member_set.contains(n)).collect())
    }

    /// Starts only the members of `group`, in topological order.
    pub fn start_group(&self, group: &str) -> Result<Vec<(String, ProcessManagerError)>, ProcessManagerError> {
        let order = {
            let project = self.inner.project.lock().expect("project mutex poisoned");
            resolver::topological_order(&project.services)?
        };
        let filtered = self.group_members_in_order(group, order)?;

        let mut errors = Vec::new();
        for name in filtered {
            if let Err(e) = self.start(&name, StartOptions::default()) {
                errors.push((name, e));
            }
        }
        Ok(errors)
    }

    /// Stops only the members of `group`, in reverse topological order.
    pub fn stop_group(&self, group: &str) -> Result<Vec<(String, ProcessManagerError)>, ProcessManagerError> {
        let order = {
            let project = self.inner.project.lock().expect("project mutex poisoned");
            resolver::stop_order(&project.services)?
        };
        let filtered = self.group_members_in_order(group, order)?;

        let mut errors = Vec::new();
        for name in filtered {
            if let Err(e) = self.stop(&name, StopOptions::default()) {
                errors.push((name, e));
            }
        }
        Ok(errors)
    }

    /// Reloads the project from its `config_path`, diffing against the
    /// current config and restarting only services whose definition
    /// changed. On failure to load or validate, the prior config is kept
    /// and a `config-error` event is published.
    pub fn reload_config(&self) -> Result<ReloadChanges, ProcessManagerError> {
        let config_path = self.inner.project.lock().expect("project mutex poisoned").config_path.clone();

        let new_project = match config::load_project(&config_path) {
            Ok(p) => p,
            Err(e) => {
                self.inner.events.publish(Event::ConfigError(e.to_string()));
                return Err(e);
            }
        };

        let (added, removed, modified) = {
            let old_project = self.inner.project.lock().expect("project mutex poisoned");
            let mut added = Vec::new();
            let mut removed = Vec::new();
            let mut modified = Vec::new();

            for name in new_project.services.keys() {
                if !old_project.services.contains_key(name) {
                    added.push(name.clone());
                }
            }
            for name in old_project.services.keys() {
                if !new_project.services.contains_key(name) {
                    removed.push(name.clone());
                }
            }
            for (name, new_spec) in &new_project.services {
                if let Some(old_spec) = old_project.services.get(name) {
                    if config::service_changed(old_spec, new_spec) {
                        modified.push(name.clone());
                    }
                }
            }
            (added, removed, modified)
        };

        for name in &removed {
            let _ = self.stop(
                name,
                StopOptions {
                    skip_dependents: true,
                    ..Default::default()
                },
            );
            self.inner.entries.lock().expect("entries mutex poisoned").shift_remove(name);
        }

        {
            let mut project = self.inner.project.lock().expect("project mutex poisoned");
            *project = new_project;
        }

        {
            let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
            for name in &added {
                entries.insert(
                    name.clone(),
                    ServiceEntry {
                        state: ServiceRuntimeState::default(),
                        poller: None,
                    },
                );
            }
        }

        for name in &modified {
            let was_running = matches!(
                self.get_state(name),
                Some(ServiceStatus::Running) | Some(ServiceStatus::Healthy) | Some(ServiceStatus::Starting)
            );
            if was_running {
                let _ = self.stop(
                    name,
                    StopOptions {
                        skip_dependents: true,
                        ..Default::default()
                    },
                );
            }

            {
                let mut entries = self.inner.entries.lock().expect("entries mutex poisoned");
                if let Some(entry) = entries.get_mut(name) {
                    entry.state = ServiceRuntimeState::default();
                }
            }

            if was_running {
                let _ = self.start(name, StartOptions::default());
            }
        }

        let changes = ReloadChanges {
            added,
            removed,
            modified,
        };
        info!(?changes, "config reloaded");
        self.inner.events.publish(Event::ConfigReloaded(changes.clone()));
        Ok(changes)
    }
}
