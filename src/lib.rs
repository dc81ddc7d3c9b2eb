//! Process orchestration core for a local developer process manager.
//!
//! This crate owns configuration loading, dependency resolution, process
//! spawning, health probing, resource sampling, and log buffering. It does
//! not own a CLI, TUI, or config-file discovery; those are a consuming
//! layer built on top of the [`supervisor::Supervisor`]/`Observer` surface.

#![warn(unused_crate_dependencies)]
// Only used by the `devproc` binary, not the library itself.
use tracing_subscriber as _;
#[cfg(test)]
use tempfile as _;

/// Command tokenization and child-process spawning.
pub mod command;

/// Config loading, normalization, and validation.
pub mod config;

/// Duration string parsing.
pub mod duration;

/// Errors.
pub mod error;

/// Typed event bus.
pub mod events;

/// Healthcheck gate and poll modes.
pub mod healthcheck;

/// Log ring buffers.
pub mod logs;

/// Dependency graph resolution.
pub mod resolver;

/// Resource sampling.
pub mod resources;

/// Stream line reading.
pub mod streams;

/// Supervisor: the lifecycle engine.
pub mod supervisor;
