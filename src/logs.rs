//! Log ring buffers: bounded per-service and global interleaved history.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::streams::LogLine;

const DEFAULT_CAPACITY: usize = 1000;

/// Bounded FIFO log storage. Appending a line enters it into both the
/// owning service's buffer and the global interleaved buffer; overflow
/// evicts the oldest entry from whichever buffer is full.
///
/// Concurrent appends and reads are supported (not lock-free, but a single
/// mutex guards both buffers so no line is ever observed torn).
pub struct LogBuffers {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    per_service: HashMap<String, VecDeque<LogLine>>,
    global: VecDeque<LogLine>,
}

impl Default for LogBuffers {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogBuffers {
    pub fn new(capacity: usize) -> Self {
        LogBuffers {
            inner: Mutex::new(Inner {
                per_service: HashMap::new(),
                global: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Appends a line to its service's buffer and the global buffer,
    /// evicting the oldest entry from each if at capacity.
    pub fn append(&self, line: LogLine) {
        let mut inner = self.inner.lock().expect("log buffer mutex poisoned");

        let service_buf = inner
            .per_service
            .entry(line.service.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if service_buf.len() >= self.capacity {
            service_buf.pop_front();
        }
        service_buf.push_back(line.clone());

        if inner.global.len() >= self.capacity {
            inner.global.pop_front();
        }
        inner.global.push_back(line);
    }

    /// Returns a snapshot of the last `n` lines for a service (oldest first).
    pub fn tail(&self, service: &str, n: usize) -> Vec<LogLine> {
        let inner = self.inner.lock().expect("log buffer mutex poisoned");
        match inner.per_service.get(service) {
            Some(buf) => {
                let skip = buf.len().saturating_sub(n);
                buf.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Returns a snapshot of the last `n` lines across all services, in the
    /// order they were appended.
    pub fn tail_global(&self, n: usize) -> Vec<LogLine> {
        let inner = self.inner.lock().expect("log buffer mutex poisoned");
        let skip = inner.global.len().saturating_sub(n);
        inner.global.iter().skip(skip).cloned().collect()
    }

    /// Empties the named service's buffer and removes its entries from the
    /// global buffer.
    pub fn clear(&self, service: &str) {
        let mut inner = self.inner.lock().expect("log buffer mutex poisoned");
        inner.per_service.remove(service);
        inner.global.retain(|line| line.service != service);
    }

    /// Empties every buffer.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().expect("log buffer mutex poisoned");
        inner.per_service.clear();
        inner.global.clear();
    }
}
