//! Schema store seam
//!
//! The hosted platform owns the schema rows; the propagator only asks two
//! questions of it: is the source schema there yet, and please copy it to
//! the target. [`InMemorySchemaStore`] serves tests and the CLI simulator.

use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use schemaflow_graph::{NodeId, NodeSchema};

/// Remote schema storage used by the propagator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Whether the node's schema row exists and is populated
    async fn is_node_ready(&self, node: NodeId) -> Result<bool, StoreError>;

    /// Copy the source schema (one sheet, or all) to the target
    async fn propagate(
        &self,
        source: NodeId,
        target: NodeId,
        sheet: Option<String>,
    ) -> Result<(), StoreError>;
}

/// Concurrent in-memory schema store
#[derive(Debug, Default)]
pub struct InMemorySchemaStore {
    /// Schema each node produces
    schemas: DashMap<NodeId, NodeSchema>,
    /// Schema each target received, per source
    received: DashMap<(NodeId, NodeId), NodeSchema>,
}

impl InMemorySchemaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the schema a node produces (e.g. parsing finished)
    pub fn publish(&self, node: NodeId, schema: NodeSchema) {
        self.schemas.insert(node, schema);
    }

    /// Forget a node's own schema
    pub fn clear(&self, node: NodeId) -> Option<NodeSchema> {
        self.schemas.remove(&node).map(|(_, schema)| schema)
    }

    #[must_use]
    pub fn schema(&self, node: NodeId) -> Option<NodeSchema> {
        self.schemas.get(&node).map(|s| s.clone())
    }

    /// Schema `target` last received from `source`
    #[must_use]
    pub fn received(&self, target: NodeId, source: NodeId) -> Option<NodeSchema> {
        self.received.get(&(target, source)).map(|s| s.clone())
    }

    /// Number of (target, source) schemas delivered
    #[must_use]
    pub fn received_count(&self) -> usize {
        self.received.len()
    }
}

#[async_trait]
impl SchemaStore for InMemorySchemaStore {
    async fn is_node_ready(&self, node: NodeId) -> Result<bool, StoreError> {
        Ok(self
            .schemas
            .get(&node)
            .is_some_and(|schema| schema.is_populated()))
    }

    async fn propagate(
        &self,
        source: NodeId,
        target: NodeId,
        sheet: Option<String>,
    ) -> Result<(), StoreError> {
        let restricted = {
            let schema = self
                .schemas
                .get(&source)
                .ok_or(StoreError::NodeNotFound(source))?;
            schema
                .restrict(sheet.as_deref())
                .ok_or_else(|| StoreError::SheetNotFound {
                    node: source,
                    sheet: sheet.clone().unwrap_or_default(),
                })?
        };

        tracing::debug!(%source, %target, sheet = ?sheet, "schema delivered");
        self.received.insert((target, source), restricted);
        Ok(())
    }
}
