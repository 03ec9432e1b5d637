//! Progress and log event stream.
//!
//! Append-only broadcast: every published event lands in the history
//! and is forwarded to all live subscribers. Late subscribers replay
//! the full history first, so every subscriber observes the same
//! sequence regardless of when it attached.

use std::path::PathBuf;
use std::sync::mpsc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::jobs::TaskStatus;

use super::ExecutionState;

/// One observable event in a job's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    JobStateChanged {
        old: ExecutionState,
        new: ExecutionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    TaskStarted {
        file: PathBuf,
        operation: String,
    },
    TaskFinished {
        file: PathBuf,
        operation: String,
        status: TaskStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    JobProgress {
        completed: usize,
        total: usize,
    },
}

struct BusInner {
    history: Vec<JobEvent>,
    subscribers: Vec<mpsc::Sender<JobEvent>>,
}

/// Broadcast channel with history replay.
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                history: Vec::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Append an event and forward it to all live subscribers.
    ///
    /// Publishing holds the bus lock, so concurrent publishers are
    /// serialized and every subscriber sees one total order.
    pub fn publish(&self, event: JobEvent) {
        let mut inner = self.inner.lock();
        inner.history.push(event.clone());
        inner
            .subscribers
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Attach a subscriber; the full history is replayed first.
    pub fn subscribe(&self) -> mpsc::Receiver<JobEvent> {
        let (sender, receiver) = mpsc::channel();
        let mut inner = self.inner.lock();
        for event in &inner.history {
            // Receiver is still in scope, send cannot fail here.
            let _ = sender.send(event.clone());
        }
        inner.subscribers.push(sender);
        receiver
    }

    /// Snapshot of all events so far.
    pub fn history(&self) -> Vec<JobEvent> {
        self.inner.lock().history.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(completed: usize) -> JobEvent {
        JobEvent::JobProgress {
            completed,
            total: 10,
        }
    }

    #[test]
    fn live_subscriber_receives_events() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        bus.publish(progress(1));
        bus.publish(progress(2));

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
    }

    #[test]
    fn late_subscriber_replays_history() {
        let bus = EventBus::new();
        bus.publish(progress(1));
        bus.publish(progress(2));

        let rx = bus.subscribe();
        bus.publish(progress(3));

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert!(matches!(received[0], JobEvent::JobProgress { completed: 1, .. }));
        assert!(matches!(received[2], JobEvent::JobProgress { completed: 3, .. }));
    }

    #[test]
    fn all_subscribers_observe_identical_sequences() {
        let bus = EventBus::new();
        let early = bus.subscribe();
        bus.publish(progress(1));
        let late = bus.subscribe();
        bus.publish(progress(2));
        bus.publish(progress(3));

        let a: Vec<_> = early.try_iter().map(|e| format!("{:?}", e)).collect();
        let b: Vec<_> = late.try_iter().map(|e| format!("{:?}", e)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        drop(bus.subscribe());
        bus.publish(progress(1));
        assert_eq!(bus.history().len(), 1);
    }
}
