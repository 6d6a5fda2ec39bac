//! Propagation lifecycle events
//!
//! Broadcast to any number of subscribers (the editor's realtime channel).

use crate::task::{PropagationTask, TaskId};
use chrono::{DateTime, Utc};
use schemaflow_graph::NodeId;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Enqueued,
    Refreshed,
    Started { attempt: u32 },
    Deferred { attempts: u32, delay_ms: u64 },
    Succeeded,
    Failed { reason: String },
    Cancelled,
    Purged,
}

impl EventKind {
    /// Task reached success or failure
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Succeeded | EventKind::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationEvent {
    pub task_id: TaskId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
}

impl PropagationEvent {
    #[must_use]
    pub fn new(task: &PropagationTask, kind: EventKind, at: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id,
            source: task.source,
            target: task.target,
            kind,
            at,
        }
    }
}
