//! Testing utilities for SchemaFlow workspace
//!
//! Shared test helpers, fixtures, and scripted collaborators.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use schemaflow_graph::{
    infer_sheet_schema, Column, ColumnType, NodeId, NodeKind, NodeSchema, SheetSchema,
    WorkflowGraph,
};
use schemaflow_propagation::{
    InMemorySchemaStore, Notification, Notifier, PropagationConfig, SchemaPropagator, SchemaStore,
    StoreError,
};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store whose answers are scripted per node
///
/// - `ready_after(node, n)`: the first `n` readiness checks say "not ready"
/// - `fail_next(target, err)`: the next propagation into `target` fails
///
/// Successful propagations are delegated to an [`InMemorySchemaStore`], so
/// published schemas still flow through.
#[derive(Debug, Default)]
pub struct ScriptedSchemaStore {
    inner: InMemorySchemaStore,
    not_ready: Mutex<HashMap<NodeId, usize>>,
    failures: Mutex<HashMap<NodeId, VecDeque<StoreError>>>,
    readiness_checks: AtomicUsize,
    propagations: AtomicUsize,
}

impl ScriptedSchemaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `schema` for `node`, but report not ready for `checks` calls
    pub fn ready_after(&self, node: NodeId, checks: usize, schema: NodeSchema) {
        self.inner.publish(node, schema);
        self.not_ready.lock().insert(node, checks);
    }

    /// Publish immediately
    pub fn publish(&self, node: NodeId, schema: NodeSchema) {
        self.inner.publish(node, schema);
    }

    /// Queue an error for the next propagation into `target`
    pub fn fail_next(&self, target: NodeId, error: StoreError) {
        self.failures
            .lock()
            .entry(target)
            .or_default()
            .push_back(error);
    }

    pub fn readiness_checks(&self) -> usize {
        self.readiness_checks.load(Ordering::SeqCst)
    }

    /// Propagation calls, successful or not
    pub fn propagations(&self) -> usize {
        self.propagations.load(Ordering::SeqCst)
    }

    pub fn received(&self, target: NodeId, source: NodeId) -> Option<NodeSchema> {
        self.inner.received(target, source)
    }
}

#[async_trait]
impl SchemaStore for ScriptedSchemaStore {
    async fn is_node_ready(&self, node: NodeId) -> Result<bool, StoreError> {
        self.readiness_checks.fetch_add(1, Ordering::SeqCst);
        {
            let mut not_ready = self.not_ready.lock();
            if let Some(remaining) = not_ready.get_mut(&node) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(false);
                }
            }
        }
        self.inner.is_node_ready(node).await
    }

    async fn propagate(
        &self,
        source: NodeId,
        target: NodeId,
        sheet: Option<String>,
    ) -> Result<(), StoreError> {
        self.propagations.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .failures
            .lock()
            .get_mut(&target)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }
        self.inner.propagate(source, target, sheet).await
    }
}

/// Notifier that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.notifications.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.lock().is_empty()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }
}

/// Manual-stepping config: no background tasks, no jitter, 1s * 2^n backoff
pub fn manual_config() -> PropagationConfig {
    PropagationConfig::new()
        .with_auto_process(false)
        .with_backoff(Duration::from_secs(1), 2.0, Duration::from_secs(30))
        .with_jitter(Duration::ZERO)
}

/// Same backoff as [`manual_config`], with the worker running
pub fn auto_config() -> PropagationConfig {
    manual_config().with_auto_process(true)
}

pub fn setup_propagator(
    config: PropagationConfig,
    store: Arc<dyn SchemaStore>,
    notifier: Arc<dyn Notifier>,
) -> SchemaPropagator {
    SchemaPropagator::new(config, store, notifier).unwrap()
}

/// Single-sheet schema: region (text), units (integer), revenue (number)
pub fn sales_schema() -> NodeSchema {
    NodeSchema::single(SheetSchema::new(
        "Sheet1",
        vec![
            Column::new("region", ColumnType::Text),
            Column::new("units", ColumnType::Integer),
            Column::new("revenue", ColumnType::Number),
        ],
    ))
}

/// Workbook with `Q1` and `Q2` sheets
pub fn quarterly_schema() -> NodeSchema {
    NodeSchema::new(vec![
        SheetSchema::new(
            "Q1",
            vec![
                Column::new("region", ColumnType::Text),
                Column::new("units", ColumnType::Integer),
            ],
        ),
        SheetSchema::new(
            "Q2",
            vec![
                Column::new("region", ColumnType::Text),
                Column::new("closed_on", ColumnType::Date),
            ],
        ),
    ])
}

/// Rows as they arrive from the spreadsheet converter
pub fn sample_rows() -> Vec<Map<String, Value>> {
    [
        json!({ "region": "EU", "units": 12, "revenue": 1200.5, "closed_on": "2024-03-01" }),
        json!({ "region": "US", "units": 7, "revenue": 640, "closed_on": "" }),
        json!({ "region": "APAC", "units": 3, "revenue": 99.99 }),
    ]
    .into_iter()
    .filter_map(|row| match row {
        Value::Object(map) => Some(map),
        _ => None,
    })
    .collect()
}

pub fn inferred_schema() -> NodeSchema {
    NodeSchema::single(infer_sheet_schema("Sheet1", &sample_rows(), 2))
}

/// upload -> filter -> analysis -> sheet
pub fn linear_workflow() -> (WorkflowGraph, Vec<NodeId>) {
    let mut graph = WorkflowGraph::new();
    let ids = vec![
        graph.add_node(NodeKind::FileUpload, "sales.xlsx", json!({})),
        graph.add_node(NodeKind::Filter, "region = EU", json!({ "column": "region" })),
        graph.add_node(NodeKind::AiAnalysis, "summarise", json!({ "prompt": "Summarise" })),
        graph.add_node(NodeKind::Spreadsheet, "report", json!({})),
    ];
    for pair in ids.windows(2) {
        graph.add_edge(pair[0], pair[1], None).unwrap();
    }
    (graph, ids)
}

/// upload -> (filter, transform) -> sheet
pub fn diamond_workflow() -> (WorkflowGraph, [NodeId; 4]) {
    let mut graph = WorkflowGraph::new();
    let upload = graph.add_node(NodeKind::FileUpload, "orders.csv", json!({}));
    let filter = graph.add_node(NodeKind::Filter, "open orders", json!({}));
    let transform = graph.add_node(NodeKind::Transform, "rename", json!({}));
    let sheet = graph.add_node(NodeKind::Spreadsheet, "merged", json!({}));
    graph.add_edge(upload, filter, None).unwrap();
    graph.add_edge(upload, transform, None).unwrap();
    graph.add_edge(filter, sheet, None).unwrap();
    graph.add_edge(transform, sheet, None).unwrap();
    (graph, [upload, filter, transform, sheet])
}
