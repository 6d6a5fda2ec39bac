//! Propagation tasks and their status state machine

use crate::error::PropagationError;
use chrono::{DateTime, Utc};
use schemaflow_graph::NodeId;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique task identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Generate new task ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a propagation task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl TaskStatus {
    /// Success and failure are final for automatic processing
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses reachable from `from`
#[must_use]
pub fn allowed_transitions(from: TaskStatus) -> &'static [TaskStatus] {
    use TaskStatus::{Failed, Pending, Processing, Success};
    match from {
        Pending => &[Processing],
        Processing => &[Pending, Success, Failed],
        // Manual retry only
        Failed => &[Pending],
        Success => &[],
    }
}

/// Validates a status transition
///
/// # Errors
/// - `PropagationError::IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), PropagationError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PropagationError::IllegalTransition { from, to })
    }
}

/// "Copy schema from `source` to `target`"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationTask {
    pub id: TaskId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the backoff timer fires; `Some` while the task waits on it
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Set while waiting on a backoff timer; `claim_next` skips such tasks
    #[serde(skip)]
    pub(crate) backing_off: bool,
    /// Enqueued again while an attempt was in flight
    #[serde(skip)]
    pub(crate) rerun: bool,
}

impl PropagationTask {
    /// Create a pending task
    #[must_use]
    pub fn new(source: NodeId, target: NodeId, sheet: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            source,
            target,
            sheet,
            attempts: 0,
            last_attempt: None,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            next_retry_at: None,
            last_error: None,
            backing_off: false,
            rerun: false,
        }
    }

    /// Whether this task propagates along `source -> target`
    #[inline]
    #[must_use]
    pub fn is_pair(&self, source: NodeId, target: NodeId) -> bool {
        self.source == source && self.target == target
    }

    #[inline]
    #[must_use]
    pub fn touches(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }

    /// Pending and not waiting on a timer
    #[inline]
    #[must_use]
    pub fn is_due(&self) -> bool {
        self.status == TaskStatus::Pending && !self.backing_off
    }

    #[inline]
    #[must_use]
    pub fn is_waiting_for_retry(&self) -> bool {
        self.backing_off
    }

    /// Move to `to`, stamping `updated_at`
    pub(crate) fn transition(
        &mut self,
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PropagationError> {
        validate_transition(self.status, to)?;
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}
