//! Domain events for decoupled communication between bounded contexts.
//!
//! Events are published when something interesting happens in the system.
//! Other components can subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The orchestrator produced its final reply for a turn
    ResponseGenerated {
        model: String,
        iterations: u32,
        tool_calls: usize,
        timestamp: DateTime<Utc>,
    },

    /// The model ladder moved on from a failing model
    ModelFallback {
        from_model: String,
        to_model: Option<String>,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The synchronization engine switched its source of truth
    SyncSourceChanged {
        source: String,
        timestamp: DateTime<Utc>,
    },

    /// A task in the live map changed status
    TaskChanged {
        task_id: String,
        status: String,
        timestamp: DateTime<Utc>,
    },
}

/// Buffered events per subscriber before the slowest one starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out of [`DomainEvent`]s to any number of listeners.
///
/// Publishing never blocks and never fails. A listener that falls more than
/// the capacity behind loses the oldest events and sees
/// `RecvError::Lagged` once.
pub struct EventBus {
    tx: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Returns how many listeners the event reached.
    pub fn publish(&self, event: DomainEvent) -> usize {
        self.tx.send(Arc::new(event)).unwrap_or(0)
    }

    /// Events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
