//! Resource sampler: periodic CPU/RSS sampling via the OS process table.

use std::collections::VecDeque;
use std::process::Command;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::warn;

const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// A single CPU/memory observation for one service's child process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub rss_bytes: u64,
    pub mem_percent_of_system: f64,
    pub timestamp: DateTime<Utc>,
}

struct Tracked {
    pid: u32,
    history: VecDeque<ResourceSample>,
}

/// Samples CPU% and RSS for a set of tracked PIDs using a single batched
/// `ps` invocation per tick, per the platform process-table contract.
pub struct ResourceSampler {
    tracked: IndexMap<String, Tracked>,
    history_capacity: usize,
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ResourceSampler {
    pub fn new(history_capacity: usize) -> Self {
        ResourceSampler {
            tracked: IndexMap::new(),
            history_capacity,
        }
    }

    /// Begins tracking `pid` under `name`. Re-tracking a name discards its
    /// prior history, matching the description of a fresh observation
    /// window starting at the new process.
    pub fn track(&mut self, name: &str, pid: u32) {
        self.tracked.insert(
            name.to_string(),
            Tracked {
                pid,
                history: VecDeque::with_capacity(self.history_capacity),
            },
        );
    }

    /// Stops sampling `name`. Its history remains available via
    /// [`ResourceSampler::history`] until cleared or re-tracked.
    pub fn untrack(&mut self, name: &str) {
        if let Some(entry) = self.tracked.get_mut(name) {
            entry.pid = 0;
        }
    }

    /// Drops a service's history entirely.
    pub fn clear(&mut self, name: &str) {
        self.tracked.shift_remove(name);
    }

    /// Drops all services' history.
    pub fn clear_all(&mut self) {
        self.tracked.clear();
    }

    /// Returns the latest sample for a service, if any.
    pub fn latest(&self, name: &str) -> Option<ResourceSample> {
        self.tracked.get(name).and_then(|t| t.history.back().copied())
    }

    /// Returns a snapshot of a service's bounded sample history.
    pub fn history(&self, name: &str) -> Vec<ResourceSample> {
        self.tracked
            .get(name)
            .map(|t| t.history.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Runs one sampling tick: a single `ps` call over every currently
    /// tracked, live PID. Returns the services whose sample was updated.
    /// Any failure of the `ps` invocation itself is logged and treated as
    /// an empty tick; a PID missing from the output (exited between
    /// registration and sampling) is silently skipped for that service.
    pub fn tick(&mut self) -> Vec<(String, ResourceSample)> {
        let live: Vec<(&String, u32)> = self
            .tracked
            .iter()
            .filter(|(_, t)| t.pid != 0)
            .map(|(name, t)| (name, t.pid))
            .collect();

        if live.is_empty() {
            return Vec::new();
        }

        let pid_list = live
            .iter()
            .map(|(_, pid)| pid.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let output = match Command::new("ps")
            .args(["-p", &pid_list, "-o", "pid=,%cpu=,%mem=,rss="])
            .output()
        {
            Ok(out) => out,
            Err(e) => {
                warn!("resource sampler: ps invocation failed: {e}");
                return Vec::new();
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut by_pid: IndexMap<u32, (f64, f64, u64)> = IndexMap::new();
        for line in stdout.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                continue;
            }
            let (Ok(pid), Ok(cpu), Ok(mem), Ok(rss_kib)) = (
                fields[0].parse::<u32>(),
                fields[1].parse::<f64>(),
                fields[2].parse::<f64>(),
                fields[3].parse::<u64>(),
            ) else {
                continue;
            };
            by_pid.insert(pid, (cpu, mem, rss_kib * 1024));
        }

        let now = Utc::now();
        let mut updated = Vec::new();
        for (name, pid) in live {
            if let Some(&(cpu, mem, rss_bytes)) = by_pid.get(&pid) {
                let sample = ResourceSample {
                    cpu_percent: cpu,
                    rss_bytes,
                    mem_percent_of_system: mem,
                    timestamp: now,
                };
                if let Some(entry) = self.tracked.get_mut(name) {
                    if entry.history.len() >= self.history_capacity {
                        entry.history.pop_front();
                    }
                    entry.history.push_back(sample);
                }
                updated.push((name.clone(), sample));
            }
        }

        updated
    }
}

/// Formats a byte count as `B|KB|MB|GB`, one decimal place once past KB.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let bytes_f = bytes as f64;
    if bytes_f < KB {
        format!("{bytes}B")
    } else if bytes_f < MB {
        format!("{:.1}KB", bytes_f / KB)
    } else if bytes_f < GB {
        format!("{:.1}MB", bytes_f / MB)
    } else {
        format!("{:.1}GB", bytes_f / GB)
    }
}

/// Maps a numeric history to a length-N sparkline of block characters,
/// scaled to the window's own min/max.
pub fn sparkline(values: &[f64]) -> String {
    const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

    if values.is_empty() {
        return String::new();
    }

    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    values
        .iter()
        .map(|&v| {
            let level = if range <= f64::EPSILON {
                0
            } else {
                (((v - min) / range) * (BLOCKS.len() - 1) as f64).round() as usize
            };
            BLOCKS[level.min(BLOCKS.len() - 1)]
        })
        .collect()
}
