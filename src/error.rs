//! Error handling for the process orchestration core.
use thiserror::Error;

/// Defines all possible errors that can occur in the process manager.
#[derive(Debug, Error)]
pub enum ProcessManagerError {
    /// Error reading the configuration file from disk.
    #[error("failed to read config file: {0}")]
    ConfigReadError(#[from] std::io::Error),

    /// Error parsing or validating the configuration.
    ///
    /// Covers YAML schema errors, unknown durations, unknown dependency
    /// names, dependency cycles, `healthy`-conditioned edges onto a
    /// service with no healthcheck, and group-membership violations.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Error spawning a service's child process.
    #[error("failed to start service '{service}': {source}")]
    SpawnError {
        /// The service that failed to start.
        service: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A gate-mode healthcheck exhausted its retries without succeeding.
    #[error("service '{service}' exhausted {retries} healthcheck attempt(s)")]
    HealthcheckExhausted {
        /// The service whose healthcheck never passed.
        service: String,
        /// The configured retry count.
        retries: u32,
    },

    /// Waiting for a dependency to satisfy its wait-condition exceeded the timeout.
    #[error("timed out waiting for dependency '{dependency}' of service '{service}'")]
    DependencyTimeout {
        /// The service that was waiting.
        service: String,
        /// The dependency that did not become ready in time.
        dependency: String,
    },

    /// A dependency reached a terminal failure status while being waited on.
    #[error("service '{service}' cannot start because dependency '{dependency}' failed")]
    DependencyFailed {
        /// The service that cannot start.
        service: String,
        /// The dependency that failed or crashed.
        dependency: String,
    },

    /// A child did not exit after the graceful signal within the configured timeout.
    ///
    /// Recovered locally by escalating to a hard kill; not normally surfaced
    /// to callers (see the error-handling policy table), but kept as a typed
    /// value so internal plumbing has something to log.
    #[error("service '{service}' did not stop within {timeout_ms}ms of the graceful signal")]
    StopTimeout {
        /// The service being stopped.
        service: String,
        /// The configured graceful timeout, in milliseconds.
        timeout_ms: u64,
    },

    /// The resource sampler's process-table probe failed for a tick.
    #[error("resource sampler probe failed: {0}")]
    SamplerError(String),

    /// A named service does not exist in the current configuration.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// A named group does not exist in the current configuration.
    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    /// A shared lock was poisoned by a panicking thread.
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Implements the `From` trait to convert a `std::sync::PoisonError` into a `ProcessManagerError`.
impl<T> From<std::sync::PoisonError<T>> for ProcessManagerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ProcessManagerError::LockPoisoned(err.to_string())
    }
}
