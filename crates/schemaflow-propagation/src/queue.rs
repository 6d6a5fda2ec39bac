//! Propagation queue
//!
//! An insertion-ordered set of tasks, keyed implicitly by (source, target).
//! Pure bookkeeping: no timers, no I/O. The propagator drives it.
//!
//! Invariants:
//! - at most one non-successful task per (source, target) pair
//! - `attempts` never exceeds `max_attempts`
//! - a task waiting on a backoff timer is never claimed

use crate::error::PropagationError;
use crate::task::{PropagationTask, TaskId, TaskStatus};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use indexmap::IndexMap;
use schemaflow_graph::NodeId;
use serde::Serialize;

/// Result of [`PropagationQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// New task appended
    Created(TaskId),
    /// Existing task for the pair reset in place
    Refreshed(TaskId),
}

impl Enqueued {
    #[inline]
    #[must_use]
    pub fn task_id(self) -> TaskId {
        match self {
            Enqueued::Created(id) | Enqueued::Refreshed(id) => id,
        }
    }
}

/// Result of deferring a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferral {
    /// Back to pending; retry after backoff
    Retry { attempts: u32 },
    /// Attempt budget spent; task is now failed
    GaveUp { attempts: u32 },
    /// Refreshed mid-attempt; pending again with a fresh budget, no backoff
    Rerun,
}

/// Task counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub success: usize,
    pub failed: usize,
    /// Pending tasks waiting on a backoff timer
    pub backing_off: usize,
}

impl QueueStats {
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.success + self.failed
    }

    /// No pending or processing work left
    #[inline]
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

/// Ordered collection of propagation tasks
#[derive(Debug, Clone)]
pub struct PropagationQueue {
    tasks: IndexMap<TaskId, PropagationTask>,
    max_attempts: u32,
}

impl PropagationQueue {
    /// Create an empty queue giving up after `max_attempts` deferrals
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            tasks: IndexMap::new(),
            max_attempts,
        }
    }

    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&PropagationTask> {
        self.tasks.get(&id)
    }

    /// Tasks in queue order
    pub fn iter(&self) -> impl Iterator<Item = &PropagationTask> + '_ {
        self.tasks.values()
    }

    /// The live (non-successful) task for a pair, if any
    #[must_use]
    pub fn find_active(&self, source: NodeId, target: NodeId) -> Option<&PropagationTask> {
        self.tasks
            .values()
            .find(|t| t.is_pair(source, target) && t.status != TaskStatus::Success)
    }

    /// Insert a task for the pair, or refresh the live one in place
    ///
    /// Refreshing resets attempts and backoff and marks the task pending. A
    /// task that is mid-attempt is flagged instead and goes back to pending
    /// when the attempt finishes.
    pub fn enqueue(
        &mut self,
        source: NodeId,
        target: NodeId,
        sheet: Option<String>,
        now: DateTime<Utc>,
    ) -> Enqueued {
        let existing = self
            .tasks
            .values_mut()
            .find(|t| t.is_pair(source, target) && t.status != TaskStatus::Success);

        match existing {
            Some(task) => {
                task.sheet = sheet;
                task.attempts = 0;
                task.backing_off = false;
                task.next_retry_at = None;
                task.last_error = None;
                task.updated_at = now;
                if task.status == TaskStatus::Processing {
                    task.rerun = true;
                } else {
                    task.status = TaskStatus::Pending;
                }
                Enqueued::Refreshed(task.id)
            }
            None => {
                let task = PropagationTask::new(source, target, sheet, now);
                let id = task.id;
                self.tasks.insert(id, task);
                Enqueued::Created(id)
            }
        }
    }

    /// Whether any task can be claimed right now
    #[must_use]
    pub fn has_due(&self) -> bool {
        self.tasks.values().any(PropagationTask::is_due)
    }

    /// Claim the oldest due task, moving it to processing
    pub fn claim_next(&mut self, now: DateTime<Utc>) -> Option<PropagationTask> {
        let task = self.tasks.values_mut().find(|t| t.is_due())?;
        task.transition(TaskStatus::Processing, now).ok()?;
        task.last_attempt = Some(now);
        Some(task.clone())
    }

    fn processing_mut(&mut self, id: TaskId) -> Result<&mut PropagationTask, PropagationError> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(PropagationError::TaskNotFound(id))?;
        if task.status != TaskStatus::Processing {
            return Err(PropagationError::IllegalTransition {
                from: task.status,
                to: TaskStatus::Pending,
            });
        }
        Ok(task)
    }

    /// Finish an attempt whose source was not ready (or hit a transient error)
    ///
    /// # Errors
    /// - `PropagationError::TaskNotFound` if the task is gone
    /// - `PropagationError::IllegalTransition` if the task is not processing
    pub fn defer(
        &mut self,
        id: TaskId,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Deferral, PropagationError> {
        let max_attempts = self.max_attempts;
        let task = self.processing_mut(id)?;

        if error.is_some() {
            task.last_error = error;
        }

        if std::mem::take(&mut task.rerun) {
            task.transition(TaskStatus::Pending, now)?;
            return Ok(Deferral::Rerun);
        }

        task.attempts = task.attempts.saturating_add(1);
        if task.attempts >= max_attempts {
            task.transition(TaskStatus::Failed, now)?;
            return Ok(Deferral::GaveUp {
                attempts: task.attempts,
            });
        }

        task.transition(TaskStatus::Pending, now)?;
        task.backing_off = true;
        Ok(Deferral::Retry {
            attempts: task.attempts,
        })
    }

    /// Record when the backoff timer of a deferred task fires
    pub fn set_retry_at(&mut self, id: TaskId, at: DateTime<Utc>) {
        if let Some(task) = self.tasks.get_mut(&id) {
            if task.backing_off {
                task.next_retry_at = Some(at);
            }
        }
    }

    /// Backoff timer fired: make the task claimable again
    ///
    /// Returns false if the task is gone or no longer waiting.
    pub fn mark_due(&mut self, id: TaskId) -> bool {
        match self.tasks.get_mut(&id) {
            Some(task) if task.backing_off => {
                task.backing_off = false;
                task.next_retry_at = None;
                true
            }
            _ => false,
        }
    }

    /// Attempt succeeded
    ///
    /// A task refreshed mid-attempt goes back to pending instead.
    ///
    /// # Errors
    /// Same as [`PropagationQueue::defer`].
    pub fn complete(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<TaskStatus, PropagationError> {
        let task = self.processing_mut(id)?;
        let next = if std::mem::take(&mut task.rerun) {
            TaskStatus::Pending
        } else {
            TaskStatus::Success
        };
        task.transition(next, now)?;
        task.last_error = None;
        Ok(next)
    }

    /// Attempt failed permanently
    ///
    /// A task refreshed mid-attempt goes back to pending instead.
    ///
    /// # Errors
    /// Same as [`PropagationQueue::defer`].
    pub fn fail(
        &mut self,
        id: TaskId,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<TaskStatus, PropagationError> {
        let task = self.processing_mut(id)?;
        task.last_error = Some(error.into());
        let next = if std::mem::take(&mut task.rerun) {
            TaskStatus::Pending
        } else {
            TaskStatus::Failed
        };
        task.transition(next, now)?;
        Ok(next)
    }

    /// Manually retry a failed task with a fresh attempt budget
    ///
    /// # Errors
    /// - `PropagationError::TaskNotFound` if the task is gone
    /// - `PropagationError::IllegalTransition` if the task has not failed
    pub fn retry(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<(), PropagationError> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or(PropagationError::TaskNotFound(id))?;
        task.transition(TaskStatus::Pending, now)?;
        task.attempts = 0;
        task.backing_off = false;
        task.next_retry_at = None;
        Ok(())
    }

    /// Drop a task regardless of status
    pub fn remove(&mut self, id: TaskId) -> Option<PropagationTask> {
        self.tasks.shift_remove(&id)
    }

    /// Drop every task for a pair (edge deleted)
    pub fn remove_pair(&mut self, source: NodeId, target: NodeId) -> Vec<PropagationTask> {
        self.remove_where(|t| t.is_pair(source, target))
    }

    /// Drop every task touching a node (node deleted)
    pub fn remove_for_node(&mut self, node: NodeId) -> Vec<PropagationTask> {
        self.remove_where(|t| t.touches(node))
    }

    fn remove_where(&mut self, pred: impl Fn(&PropagationTask) -> bool) -> Vec<PropagationTask> {
        let ids: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| pred(t))
            .map(|t| t.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.tasks.shift_remove(&id))
            .collect()
    }

    /// Purge terminal tasks last updated more than `retention` ago
    ///
    /// A retention reaching past the representable time range purges nothing.
    pub fn gc(&mut self, now: DateTime<Utc>, retention: ChronoDuration) -> Vec<PropagationTask> {
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return Vec::new();
        };
        self.remove_where(|t| t.status.is_terminal() && t.updated_at < cutoff)
    }

    /// Counts per status
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => {
                    stats.pending += 1;
                    if task.backing_off {
                        stats.backing_off += 1;
                    }
                }
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Success => stats.success += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

impl Default for PropagationQueue {
    fn default() -> Self {
        Self::new(10)
    }
}
