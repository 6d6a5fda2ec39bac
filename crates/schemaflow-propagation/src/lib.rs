//! SchemaFlow Propagation - eventually-consistent schema sync
//!
//! When a workflow edge is drawn, the target node needs the source node's
//! columns. The source schema may not exist yet (the upload is still being
//! parsed), so propagation is queued and retried:
//! - Deduplicated tasks per `(source, target)` pair
//! - Exponential backoff with jitter, bounded attempts
//! - Single-flight processing with independent per-task retry timers
//! - Notifications when a task gives up
//! - Periodic GC of finished tasks
//!
//! # Example
//!
//! ```rust,ignore
//! use schemaflow_propagation::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemorySchemaStore::new());
//! let propagator = SchemaPropagator::new(
//!     PropagationConfig::new(),
//!     store.clone(),
//!     Arc::new(TracingNotifier),
//! )?;
//!
//! let (upload, filter) = (NodeId::new(), NodeId::new());
//! propagator.enqueue(upload, filter, None)?;
//! // ... the upload finishes parsing and publishes its schema ...
//! propagator.wait_settled(std::time::Duration::from_millis(100)).await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod backoff;
pub mod config;
pub mod error;
pub mod event;
pub mod notify;
pub mod propagator;
pub mod queue;
pub mod store;
pub mod task;

pub use backoff::BackoffPolicy;
pub use config::{PropagationConfig, MAX_DELAY_MS, MAX_RETENTION_SECS};
pub use error::{ConfigError, PropagationError, StoreError};
pub use event::{EventKind, PropagationEvent};
pub use notify::{ChannelNotifier, Notification, NotificationLevel, Notifier, TracingNotifier};
pub use propagator::{ProcessOutcome, SchemaPropagator};
pub use queue::{Deferral, Enqueued, PropagationQueue, QueueStats};
pub use store::{InMemorySchemaStore, SchemaStore};
pub use task::{allowed_transitions, validate_transition, PropagationTask, TaskId, TaskStatus};

// Node IDs flow through every API here
pub use schemaflow_graph::NodeId;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving schema propagation
    pub use crate::{
        InMemorySchemaStore, NodeId, Notifier, ProcessOutcome, PropagationConfig,
        PropagationError, SchemaPropagator, SchemaStore, TaskId, TaskStatus, TracingNotifier,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
