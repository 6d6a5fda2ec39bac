//! Schema propagator
//!
//! Drives the [`PropagationQueue`] against a [`SchemaStore`]:
//! - `process_queue` is single-flight: one attempt in progress at a time
//! - deferred tasks wait on their own backoff timer, so they retry
//!   independently of each other
//! - a worker task (mpsc command channel) drains the queue when woken
//! - a GC task purges finished tasks past the retention window
//!
//! Background tasks hold only a weak reference; dropping the last
//! `SchemaPropagator` handle stops them.

use crate::backoff::BackoffPolicy;
use crate::config::PropagationConfig;
use crate::error::{ConfigError, PropagationError, StoreError};
use crate::event::{EventKind, PropagationEvent};
use crate::notify::{Notification, Notifier};
use crate::queue::{Deferral, Enqueued, PropagationQueue, QueueStats};
use crate::store::SchemaStore;
use crate::task::{PropagationTask, TaskId, TaskStatus};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use schemaflow_graph::NodeId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{AbortHandle, JoinHandle};

/// What a single `process_queue` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing due
    Idle,
    /// Another attempt is in progress
    Busy,
    /// Schema copied to the target
    Propagated(TaskId),
    /// Source not ready (or transient error); retry scheduled
    Deferred {
        id: TaskId,
        attempts: u32,
        delay: Duration,
    },
    /// Task was refreshed mid-attempt and is due again
    Requeued(TaskId),
    /// Task failed permanently or ran out of attempts
    Failed(TaskId),
    /// Task was cancelled while the attempt was in flight
    Cancelled(TaskId),
}

impl ProcessOutcome {
    /// Whether a task was claimed
    #[inline]
    #[must_use]
    pub fn did_work(&self) -> bool {
        !matches!(self, ProcessOutcome::Idle | ProcessOutcome::Busy)
    }
}

enum Command {
    Wake,
    Shutdown,
}

/// Clears the in-progress flag when the attempt ends
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct RetryTimer {
    generation: u64,
    handle: AbortHandle,
}

struct Inner {
    config: PropagationConfig,
    backoff: BackoffPolicy,
    queue: Mutex<PropagationQueue>,
    store: Arc<dyn SchemaStore>,
    notifier: Arc<dyn Notifier>,
    in_progress: AtomicBool,
    shut_down: AtomicBool,
    timers: DashMap<TaskId, RetryTimer>,
    timer_generation: AtomicU64,
    events: broadcast::Sender<PropagationEvent>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for timer in self.timers.iter() {
            timer.handle.abort();
        }
        for handle in self.background.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// Queue-backed, single-flight schema propagator
#[derive(Clone)]
pub struct SchemaPropagator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SchemaPropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaPropagator")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SchemaPropagator {
    /// Create a propagator
    ///
    /// With `auto_process` the worker and GC tasks are spawned on the
    /// current tokio runtime.
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if the config fails validation, or if
    ///   `auto_process` is set outside a tokio runtime
    pub fn new(
        config: PropagationConfig,
        store: Arc<dyn SchemaStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let runtime = if config.auto_process {
            Some(tokio::runtime::Handle::try_current().map_err(|_| {
                ConfigError::invalid("auto_process", "requires a running tokio runtime")
            })?)
        } else {
            None
        };

        let (events, _) = broadcast::channel(config.event_capacity);
        let (commands, receiver) = if runtime.is_some() {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let inner = Arc::new(Inner {
            backoff: config.backoff(),
            queue: Mutex::new(PropagationQueue::new(config.max_attempts)),
            config,
            store,
            notifier,
            in_progress: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            timers: DashMap::new(),
            timer_generation: AtomicU64::new(0),
            events,
            commands,
            background: Mutex::new(Vec::new()),
        });

        if let (Some(runtime), Some(receiver)) = (runtime, receiver) {
            let worker = runtime.spawn(run_worker(Arc::downgrade(&inner), receiver));
            let gc = runtime.spawn(run_gc(
                Arc::downgrade(&inner),
                inner.config.gc_interval(),
            ));
            inner.background.lock().extend([worker, gc]);
        }

        tracing::debug!(
            max_attempts = inner.config.max_attempts,
            auto_process = inner.config.auto_process,
            "schema propagator started"
        );

        Ok(Self { inner })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &PropagationConfig {
        &self.inner.config
    }

    /// Queue (or refresh) propagation from `source` to `target`
    ///
    /// # Errors
    /// - `PropagationError::ShutDown` after [`SchemaPropagator::shutdown`]
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn enqueue(
        &self,
        source: NodeId,
        target: NodeId,
        sheet: Option<String>,
    ) -> Result<TaskId, PropagationError> {
        self.ensure_running()?;

        let now = Utc::now();
        let (enqueued, task) = {
            let mut queue = self.inner.queue.lock();
            let enqueued = queue.enqueue(source, target, sheet, now);
            (enqueued, queue.get(enqueued.task_id()).cloned())
        };
        let id = enqueued.task_id();
        self.cancel_timer(id);

        if let Some(task) = task {
            let kind = match enqueued {
                Enqueued::Created(_) => EventKind::Enqueued,
                Enqueued::Refreshed(_) => EventKind::Refreshed,
            };
            self.emit(&task, kind);
        }

        self.wake();
        Ok(id)
    }

    /// Ask the store whether a node's schema exists and is populated
    ///
    /// # Errors
    /// Whatever the store reports.
    pub async fn is_node_ready(&self, node: NodeId) -> Result<bool, StoreError> {
        self.inner.store.is_node_ready(node).await
    }

    /// Run one propagation attempt for the oldest due task
    ///
    /// Returns `Busy` without doing anything if an attempt is already in
    /// progress.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn process_queue(&self) -> ProcessOutcome {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return ProcessOutcome::Idle;
        }
        let Some(flight) = FlightGuard::acquire(&self.inner.in_progress) else {
            return ProcessOutcome::Busy;
        };

        let claimed = self.inner.queue.lock().claim_next(Utc::now());
        let Some(task) = claimed else {
            return ProcessOutcome::Idle;
        };

        self.emit(
            &task,
            EventKind::Started {
                attempt: task.attempts + 1,
            },
        );
        let outcome = self.attempt(&task).await;
        drop(flight);

        if self.inner.queue.lock().has_due() {
            self.wake();
        }
        outcome
    }

    /// Process until nothing is due (or another caller holds the flight)
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while self.process_queue().await.did_work() {
            processed += 1;
        }
        processed
    }

    async fn attempt(&self, task: &PropagationTask) -> ProcessOutcome {
        let store = Arc::clone(&self.inner.store);

        match store.is_node_ready(task.source).await {
            Ok(true) => {}
            Ok(false) => return self.defer(task, None),
            Err(e) if e.is_retryable() => return self.defer(task, Some(e.to_string())),
            Err(e) => return self.fail(task, &e),
        }

        match store
            .propagate(task.source, task.target, task.sheet.clone())
            .await
        {
            Ok(()) => self.complete(task),
            Err(e) if e.is_retryable() => self.defer(task, Some(e.to_string())),
            Err(e) => self.fail(task, &e),
        }
    }

    fn complete(&self, task: &PropagationTask) -> ProcessOutcome {
        let result = self.inner.queue.lock().complete(task.id, Utc::now());
        match result {
            Ok(TaskStatus::Success) => {
                tracing::info!(
                    task = %task.id,
                    source = %task.source,
                    target = %task.target,
                    "schema propagated"
                );
                self.emit(task, EventKind::Succeeded);
                ProcessOutcome::Propagated(task.id)
            }
            Ok(_) => ProcessOutcome::Requeued(task.id),
            Err(e) => self.lost(task, &e),
        }
    }

    fn defer(&self, task: &PropagationTask, error: Option<String>) -> ProcessOutcome {
        let now = Utc::now();
        let mut queue = self.inner.queue.lock();
        let result = queue.defer(task.id, error.clone(), now);
        let deferral = match result {
            Ok(deferral) => deferral,
            Err(e) => {
                drop(queue);
                return self.lost(task, &e);
            }
        };

        match deferral {
            Deferral::Retry { attempts } => {
                let delay = self.inner.backoff.delay(attempts);
                if let Some(retry_at) = chrono::TimeDelta::from_std(delay)
                    .ok()
                    .and_then(|delay| now.checked_add_signed(delay))
                {
                    queue.set_retry_at(task.id, retry_at);
                }
                drop(queue);

                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                tracing::debug!(
                    task = %task.id,
                    attempts,
                    delay_ms,
                    error = ?error,
                    "source not ready, retry scheduled"
                );
                self.schedule_retry(task.id, delay);
                self.emit(task, EventKind::Deferred { attempts, delay_ms });
                ProcessOutcome::Deferred {
                    id: task.id,
                    attempts,
                    delay,
                }
            }
            Deferral::GaveUp { attempts } => {
                drop(queue);
                let reason = match error {
                    Some(e) => format!("gave up after {attempts} attempts: {e}"),
                    None => format!("source schema not ready after {attempts} attempts"),
                };
                tracing::warn!(
                    task = %task.id,
                    source = %task.source,
                    target = %task.target,
                    "{reason}"
                );
                self.inner.notifier.notify(
                    Notification::error(
                        "Schema propagation failed",
                        format!(
                            "Could not copy columns from node {} to node {}: {reason}",
                            task.source, task.target
                        ),
                    )
                    .for_task(task.id),
                );
                self.emit(task, EventKind::Failed { reason });
                ProcessOutcome::Failed(task.id)
            }
            Deferral::Rerun => ProcessOutcome::Requeued(task.id),
        }
    }

    fn fail(&self, task: &PropagationTask, error: &StoreError) -> ProcessOutcome {
        let result = self
            .inner
            .queue
            .lock()
            .fail(task.id, error.to_string(), Utc::now());
        match result {
            Ok(TaskStatus::Failed) => {
                tracing::error!(
                    task = %task.id,
                    source = %task.source,
                    target = %task.target,
                    error = %error,
                    "schema propagation failed"
                );
                self.inner.notifier.notify(
                    Notification::error(
                        "Schema propagation failed",
                        format!(
                            "Could not copy columns from node {} to node {}: {error}",
                            task.source, task.target
                        ),
                    )
                    .for_task(task.id),
                );
                self.emit(
                    task,
                    EventKind::Failed {
                        reason: error.to_string(),
                    },
                );
                ProcessOutcome::Failed(task.id)
            }
            Ok(_) => ProcessOutcome::Requeued(task.id),
            Err(e) => self.lost(task, &e),
        }
    }

    // The task vanished from the queue mid-attempt (cancelled)
    fn lost(&self, task: &PropagationTask, error: &PropagationError) -> ProcessOutcome {
        tracing::debug!(task = %task.id, error = %error, "task cancelled during attempt");
        ProcessOutcome::Cancelled(task.id)
    }

    fn schedule_retry(&self, id: TaskId, delay: Duration) {
        let generation = self.inner.timer_generation.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner
                .timers
                .remove_if(&id, |_, timer| timer.generation == generation);
            if inner.queue.lock().mark_due(id) {
                if let Some(commands) = &inner.commands {
                    let _ = commands.send(Command::Wake);
                }
            }
        });

        let timer = RetryTimer {
            generation,
            handle: handle.abort_handle(),
        };
        if let Some(previous) = self.inner.timers.insert(id, timer) {
            previous.handle.abort();
        }
    }

    fn cancel_timer(&self, id: TaskId) {
        if let Some((_, timer)) = self.inner.timers.remove(&id) {
            timer.handle.abort();
        }
    }

    /// Manually retry a failed task with a fresh attempt budget
    ///
    /// # Errors
    /// - `PropagationError::TaskNotFound` if the task is unknown
    /// - `PropagationError::IllegalTransition` if the task has not failed
    /// - `PropagationError::ShutDown` after shutdown
    pub fn retry(&self, id: TaskId) -> Result<(), PropagationError> {
        self.ensure_running()?;
        let task = {
            let mut queue = self.inner.queue.lock();
            queue.retry(id, Utc::now())?;
            queue.get(id).cloned()
        };
        if let Some(task) = task {
            tracing::info!(task = %id, "manual retry");
            self.emit(&task, EventKind::Refreshed);
        }
        self.wake();
        Ok(())
    }

    /// Drop tasks for an edge that no longer exists
    pub fn cancel_pair(&self, source: NodeId, target: NodeId) -> usize {
        let removed = self.inner.queue.lock().remove_pair(source, target);
        self.cancelled(removed)
    }

    /// Drop tasks touching a deleted node
    pub fn cancel_node(&self, node: NodeId) -> usize {
        let removed = self.inner.queue.lock().remove_for_node(node);
        self.cancelled(removed)
    }

    fn cancelled(&self, removed: Vec<PropagationTask>) -> usize {
        for task in &removed {
            self.cancel_timer(task.id);
            self.emit(task, EventKind::Cancelled);
        }
        removed.len()
    }

    /// Purge finished tasks older than the retention window
    pub fn gc(&self) -> usize {
        let retention = chrono::TimeDelta::from_std(self.inner.config.retention())
            .unwrap_or(chrono::TimeDelta::MAX);
        let purged = self.inner.queue.lock().gc(Utc::now(), retention);
        for task in &purged {
            self.cancel_timer(task.id);
            self.emit(task, EventKind::Purged);
        }
        if !purged.is_empty() {
            tracing::info!(purged = purged.len(), "purged finished propagation tasks");
        }
        purged.len()
    }

    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<PropagationTask> {
        self.inner.queue.lock().get(id).cloned()
    }

    /// All tasks in queue order
    #[must_use]
    pub fn tasks(&self) -> Vec<PropagationTask> {
        self.inner.queue.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.inner.queue.lock().stats()
    }

    /// Receive lifecycle events from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PropagationEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until no task is pending or processing
    pub async fn wait_settled(&self, poll: Duration) {
        while !self.stats().is_settled() {
            tokio::time::sleep(poll).await;
        }
    }

    /// Stop background work; further enqueues fail
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(commands) = &self.inner.commands {
            let _ = commands.send(Command::Shutdown);
        }
        for timer in self.inner.timers.iter() {
            timer.handle.abort();
        }
        self.inner.timers.clear();
        for handle in self.inner.background.lock().drain(..) {
            handle.abort();
        }
        tracing::debug!("schema propagator shut down");
    }

    #[inline]
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), PropagationError> {
        if self.is_shut_down() {
            Err(PropagationError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn emit(&self, task: &PropagationTask, kind: EventKind) {
        // No subscribers is fine
        let _ = self
            .inner
            .events
            .send(PropagationEvent::new(task, kind, Utc::now()));
    }

    fn wake(&self) {
        if let Some(commands) = &self.inner.commands {
            let _ = commands.send(Command::Wake);
        }
    }
}

/// Worker loop: drain the queue whenever woken
async fn run_worker(inner: Weak<Inner>, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        if matches!(command, Command::Shutdown) {
            break;
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let processed = SchemaPropagator { inner }.drain().await;
        if processed > 0 {
            tracing::trace!(processed, "worker drained queue");
        }
    }
}

/// Periodic purge of finished tasks
async fn run_gc(inner: Weak<Inner>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // First tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        SchemaPropagator { inner }.gc();
    }
}
