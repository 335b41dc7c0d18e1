//! Lifecycle notifications for external observers (UI layers, loggers).
//!
//! Every component publishes onto a shared [`EventBus`]; observers call
//! [`EventBus::subscribe`] and receive every event published afterwards.
//! Publishing never blocks and never fails when nobody is listening.

use crate::orchestrator::OrchestratorState;
use crate::research::{ResearchEngineState, ResearchStatus};
use serde::Serialize;
use tokio::sync::broadcast;

/// Default channel capacity; slow subscribers lag rather than block publishers.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Which cache an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Search,
    Research,
    Response,
}

/// Kind of orchestrated unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Search,
    Research,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    IndexProgress {
        processed: usize,
        total: usize,
    },
    IndexCompleted {
        indexed: usize,
        failed: usize,
        removed: usize,
    },
    OrchestratorStateChanged {
        from: OrchestratorState,
        to: OrchestratorState,
    },
    ResearchEngineStateChanged {
        from: ResearchEngineState,
        to: ResearchEngineState,
    },
    ResearchStatusChanged {
        task_id: String,
        status: ResearchStatus,
    },
    TaskStarted {
        task_id: String,
        kind: TaskKind,
    },
    TaskCompleted {
        task_id: String,
        kind: TaskKind,
        results: usize,
    },
    TaskFailed {
        task_id: String,
        kind: TaskKind,
        error: String,
    },
    CacheHit {
        cache: CacheKind,
        key: String,
    },
    CacheMiss {
        cache: CacheKind,
        key: String,
    },
}

/// Broadcast channel shared by all components of one engine instance.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        // An error only means there are no subscribers right now.
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
