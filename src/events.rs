//! Typed publish/subscribe event bus exposed by the supervisor.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use crate::resources::ResourceSample;
use crate::streams::LogLine;
use crate::supervisor::ServiceStatus;

/// The set of changed service names produced by a `reloadConfig` call.
#[derive(Debug, Clone, Default)]
pub struct ReloadChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

/// Every event the supervisor can publish. Subscribers see events on a
/// single logical stream, in the order the supervisor generated them.
#[derive(Debug, Clone)]
pub enum Event {
    /// A service transitioned to a new visible state.
    StateChange { service: String, status: ServiceStatus },
    /// A captured stdout/stderr line, including synthetic healthcheck lines.
    Log(LogLine),
    /// An asynchronous error not attributable to a specific call.
    Error { service: String, message: String },
    /// Every service has reached a terminal status.
    AllStopped,
    /// A `reloadConfig` call completed successfully.
    ConfigReloaded(ReloadChanges),
    /// A `reloadConfig` call failed; the prior config remains active.
    ConfigError(String),
    /// At least one tracked service's sample changed beyond the hysteresis
    /// threshold since the last tick.
    ResourcesUpdated(Vec<(String, ResourceSample)>),
}

/// A fan-out bus: every subscriber receives every event, in publish order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber and returns its receiving end.
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .expect("event bus mutex poisoned")
            .push(tx);
        rx
    }

    /// Publishes an event to every current subscriber. Subscribers whose
    /// receiver has been dropped are pruned lazily.
    pub fn publish(&self, event: Event) {
        let mut subscribers = self.subscribers.lock().expect("event bus mutex poisoned");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
