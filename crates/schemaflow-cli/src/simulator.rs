//! Workflow propagation simulator
//!
//! Loads a saved workflow into an editor backed by an in-memory store, lets
//! every node "finish parsing" after a seeded random delay, and reports how
//! each propagation task ended. A node fed by other nodes only finishes once
//! all of its inputs have delivered, so downstream edges retry until the
//! upstream schemas land.
//!
//! Node config keys the simulator understands:
//! - `schema`: the full schema the node publishes
//! - `rows` (plus optional `sheet`): sample rows to infer the schema from
//! - `ready: false`: the node never publishes, so its edges give up

use anyhow::Context;
use futures::future::join_all;
use rand::{rngs::StdRng, Rng, SeedableRng};
use schemaflow_core::WorkflowEditor;
use schemaflow_graph::{
    infer_sheet_schema, Column, ColumnType, Node, NodeId, NodeSchema, SheetSchema,
    WorkflowGraph, WorkflowId, WorkflowSnapshot,
};
use schemaflow_propagation::{
    ChannelNotifier, InMemorySchemaStore, Notification, PropagationConfig, QueueStats,
    SchemaPropagator, TaskId, TaskStatus,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Rows kept as samples when inferring a schema
const SAMPLE_ROWS: usize = 5;

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Upper bound on the delay before a node publishes its schema
    pub max_ready_ms: u64,
    /// Give up waiting for the queue to settle after this long
    pub timeout_secs: u64,
    /// Queue polling interval while waiting
    pub poll_ms: u64,
    pub propagation: PropagationConfig,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_ready_ms: 5000,
            timeout_secs: 600,
            poll_ms: 100,
            propagation: PropagationConfig::default(),
        }
    }
}

/// How one propagation task ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub source: NodeId,
    pub source_label: String,
    pub target: NodeId,
    pub target_label: String,
    pub sheet: Option<String>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Final report from simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    pub seed: u64,
    pub workflow: WorkflowId,
    pub nodes: usize,
    pub edges: usize,
    pub stats: QueueStats,
    pub tasks: Vec<TaskReport>,
    pub notifications: Vec<Notification>,
    pub elapsed_ms: u64,
    pub timed_out: bool,
}

impl SimulatorReport {
    /// Every task succeeded before the timeout
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.timed_out && self.stats.failed == 0 && self.stats.pending == 0
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== SchemaFlow Simulation Report ===\n\n");
        report.push_str(&format!("Workflow: {}\n", self.workflow));
        report.push_str(&format!("Seed: {}\n", self.seed));
        report.push_str(&format!("Nodes: {}\n", self.nodes));
        report.push_str(&format!("Edges: {}\n", self.edges));
        report.push_str(&format!("Succeeded: {}\n", self.stats.success));
        report.push_str(&format!("Failed: {}\n", self.stats.failed));
        report.push_str(&format!("Unfinished: {}\n", self.stats.pending + self.stats.processing));
        report.push_str(&format!("Elapsed: {}ms\n", self.elapsed_ms));

        report.push_str("\n=== Tasks ===\n");
        for task in &self.tasks {
            let sheet = task
                .sheet
                .as_deref()
                .map(|s| format!(" [{s}]"))
                .unwrap_or_default();
            report.push_str(&format!(
                "{} -> {}{}: {} after {} attempt(s)\n",
                task.source_label, task.target_label, sheet, task.status, task.attempts
            ));
            if let Some(error) = &task.last_error {
                report.push_str(&format!("    last error: {error}\n"));
            }
        }

        if !self.notifications.is_empty() {
            report.push_str("\n=== Notifications ===\n");
            for (i, n) in self.notifications.iter().enumerate() {
                report.push_str(&format!("{}. {}: {}\n", i + 1, n.title, n.message));
            }
        }

        if self.timed_out {
            report.push_str("\n!!! Queue did not settle before the timeout\n");
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));

        report
    }
}

/// How a node's schema becomes available during a simulation
#[derive(Debug, Clone, PartialEq)]
pub enum NodeReadiness {
    /// Never publishes; propagation out of it gives up
    Never,
    /// Publishes this schema after a random delay
    Publishes(NodeSchema),
    /// Publishes once every input has delivered, combining what it received
    Derived,
}

/// Decide how `node` becomes ready
///
/// Explicit `schema` or `rows` config always wins. Otherwise a node fed by
/// other nodes derives its schema from them, and a source node publishes a
/// single placeholder column.
#[must_use]
pub fn node_readiness(node: &Node, has_inputs: bool) -> NodeReadiness {
    let config = &node.config;
    if config.get("ready").and_then(serde_json::Value::as_bool) == Some(false) {
        return NodeReadiness::Never;
    }

    if let Some(value) = config.get("schema") {
        match serde_json::from_value::<NodeSchema>(value.clone()) {
            Ok(schema) => return NodeReadiness::Publishes(schema),
            Err(e) => tracing::warn!(node = %node.id, error = %e, "ignoring malformed schema"),
        }
    }

    let sheet = config
        .get("sheet")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("Sheet1");

    if let Some(rows) = config.get("rows").and_then(serde_json::Value::as_array) {
        let rows: Vec<_> = rows.iter().filter_map(|r| r.as_object().cloned()).collect();
        return NodeReadiness::Publishes(NodeSchema::single(infer_sheet_schema(
            sheet,
            &rows,
            SAMPLE_ROWS,
        )));
    }

    if has_inputs {
        return NodeReadiness::Derived;
    }

    NodeReadiness::Publishes(NodeSchema::single(SheetSchema::new(
        sheet,
        vec![Column::new(format!("{}_output", node.kind), ColumnType::Text)],
    )))
}

/// Sheets received from every input, first occurrence of a name wins
#[must_use]
pub fn combine_schemas(received: Vec<NodeSchema>) -> NodeSchema {
    let mut sheets: Vec<SheetSchema> = Vec::new();
    for sheet in received.into_iter().flat_map(|schema| schema.sheets) {
        if !sheets.iter().any(|s| s.name == sheet.name) {
            sheets.push(sheet);
        }
    }
    NodeSchema::new(sheets)
}

// Wait for every input to deliver, then publish what was received
async fn publish_derived(
    store: Arc<InMemorySchemaStore>,
    node: NodeId,
    inputs: Vec<NodeId>,
    delay: Duration,
    poll: Duration,
) {
    let received = loop {
        let received: Option<Vec<NodeSchema>> = inputs
            .iter()
            .map(|source| store.received(node, *source))
            .collect();
        if let Some(received) = received {
            break received;
        }
        tokio::time::sleep(poll).await;
    };

    tokio::time::sleep(delay).await;
    store.publish(node, combine_schemas(received));
    tracing::debug!(node = %node, inputs = inputs.len(), "derived schema published");
}

/// Run the simulator over a saved workflow
///
/// # Errors
/// - the propagation config is invalid
/// - the snapshot is not a valid workflow (unknown nodes, cycles, ...)
pub async fn run_simulator(
    snapshot: WorkflowSnapshot,
    config: SimulatorConfig,
) -> anyhow::Result<SimulatorReport> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let store = Arc::new(InMemorySchemaStore::new());
    let (notifier, mut notifications) = ChannelNotifier::new();

    let propagator = SchemaPropagator::new(
        config.propagation.clone().with_auto_process(true),
        store.clone(),
        Arc::new(notifier),
    )
    .context("invalid propagation config")?;
    let editor = WorkflowEditor::new(propagator);

    let started = Instant::now();
    let queued = editor.load(snapshot).context("failed to load workflow")?;
    tracing::info!(seed = config.seed, queued = queued.len(), "simulation started");

    let poll = Duration::from_millis(config.poll_ms);
    let publishers: Vec<_> = {
        let graph = editor.graph();
        let spawned: Vec<_> = graph
            .nodes()
            .filter_map(|node| {
                let inputs = graph.upstream(node.id);
                let readiness = node_readiness(node, !inputs.is_empty());
                let delay = Duration::from_millis(rng.random_range(0..=config.max_ready_ms));
                let (store, id) = (store.clone(), node.id);
                match readiness {
                    NodeReadiness::Never => None,
                    NodeReadiness::Publishes(schema) => Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        store.publish(id, schema);
                        tracing::debug!(node = %id, "schema published");
                    })),
                    NodeReadiness::Derived => {
                        Some(tokio::spawn(publish_derived(store, id, inputs, delay, poll)))
                    }
                }
            })
            .collect();
        spawned
    };

    let settled = tokio::time::timeout(
        Duration::from_secs(config.timeout_secs),
        editor.propagator().wait_settled(poll),
    )
    .await
    .is_ok();

    if !settled {
        tracing::warn!(timeout_secs = config.timeout_secs, "queue did not settle");
    }
    // Nodes whose inputs never arrive wait forever
    for publisher in &publishers {
        publisher.abort();
    }
    join_all(publishers).await;

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let propagator = editor.propagator();
    propagator.shutdown();

    let mut delivered = Vec::new();
    while let Ok(notification) = notifications.try_recv() {
        delivered.push(notification);
    }

    let graph = editor.graph();
    let report = SimulatorReport {
        seed: config.seed,
        workflow: graph.id(),
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        stats: propagator.stats(),
        tasks: propagator
            .tasks()
            .into_iter()
            .map(|task| TaskReport {
                id: task.id,
                source_label: label(&graph, task.source),
                source: task.source,
                target_label: label(&graph, task.target),
                target: task.target,
                sheet: task.sheet,
                status: task.status,
                attempts: task.attempts,
                last_error: task.last_error,
            })
            .collect(),
        notifications: delivered,
        elapsed_ms,
        timed_out: !settled,
    };

    tracing::info!(
        succeeded = report.stats.success,
        failed = report.stats.failed,
        elapsed_ms,
        "simulation finished"
    );
    Ok(report)
}

fn label(graph: &WorkflowGraph, node: NodeId) -> String {
    graph
        .node(node)
        .map_or_else(|| node.to_string(), |n| n.label.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use schemaflow_graph::NodeKind;
    use schemaflow_test_utils::{diamond_workflow, linear_workflow, manual_config};
    use serde_json::json;

    fn config() -> SimulatorConfig {
        SimulatorConfig {
            propagation: manual_config(),
            ..SimulatorConfig::default()
        }
    }

    fn published(readiness: NodeReadiness) -> NodeSchema {
        match readiness {
            NodeReadiness::Publishes(schema) => schema,
            other => panic!("expected a published schema, got {other:?}"),
        }
    }

    #[test]
    fn node_readiness_sources() {
        let plain = Node::new(NodeKind::FileUpload, "a.csv", json!({}));
        assert_eq!(
            published(node_readiness(&plain, false)).column_names(None),
            vec!["file_upload_output"]
        );

        let filter = Node::new(NodeKind::Filter, "EU only", json!({ "column": "region" }));
        assert_eq!(node_readiness(&filter, true), NodeReadiness::Derived);

        let never = Node::new(NodeKind::FileUpload, "b.csv", json!({ "ready": false }));
        assert_eq!(node_readiness(&never, false), NodeReadiness::Never);

        let rows = Node::new(
            NodeKind::FileUpload,
            "c.csv",
            json!({ "sheet": "Orders", "rows": [{ "id": 1, "total": 9.5 }, { "id": 2 }] }),
        );
        let schema = published(node_readiness(&rows, false));
        assert_eq!(schema.sheet_names(), vec!["Orders"]);
        let sheet = schema.sheet("Orders").unwrap();
        assert_eq!(sheet.column("id").unwrap().column_type, ColumnType::Integer);
        assert!(sheet.column("total").unwrap().nullable);

        let explicit = NodeSchema::single(SheetSchema::new(
            "Q1",
            vec![Column::new("region", ColumnType::Text)],
        ));
        let given = Node::new(
            NodeKind::Transform,
            "t",
            json!({ "schema": serde_json::to_value(&explicit).unwrap() }),
        );
        assert_eq!(
            node_readiness(&given, true),
            NodeReadiness::Publishes(explicit)
        );
    }

    #[test]
    fn combined_schema_keeps_first_sheet_of_each_name() {
        let q1 = NodeSchema::single(SheetSchema::new(
            "Q1",
            vec![Column::new("region", ColumnType::Text)],
        ));
        let q1_again = NodeSchema::single(SheetSchema::new(
            "Q1",
            vec![Column::new("units", ColumnType::Integer)],
        ));
        let q2 = NodeSchema::single(SheetSchema::new(
            "Q2",
            vec![Column::new("revenue", ColumnType::Number)],
        ));

        let combined = combine_schemas(vec![q1, q1_again, q2]);

        assert_eq!(combined.sheet_names(), vec!["Q1", "Q2"]);
        assert_eq!(combined.column_names(Some("Q1")), vec!["region"]);
    }

    #[tokio::test(start_paused = true)]
    async fn linear_workflow_passes() {
        let (graph, _) = linear_workflow();

        let report = run_simulator(graph.snapshot(), config()).await.unwrap();

        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.success, 3);
        assert!(report.notifications.is_empty());
        assert!(report.generate_text().contains("Result: PASS"));
    }

    #[tokio::test(start_paused = true)]
    async fn downstream_edges_wait_for_upstream_delivery() {
        let (graph, ids) = linear_workflow();

        let report = run_simulator(graph.snapshot(), config()).await.unwrap();

        assert!(report.passed(), "{}", report.generate_text());
        // filter and summarise only become ready after receiving their input
        assert!(report
            .tasks
            .iter()
            .filter(|t| t.source != ids[0])
            .all(|t| t.attempts >= 1));
    }

    #[tokio::test(start_paused = true)]
    async fn unready_source_fails_the_whole_chain() {
        let (mut graph, [upload, ..]) = diamond_workflow();
        graph.node_mut(upload).unwrap().config = json!({ "ready": false });
        let mut config = config();
        config.propagation = config.propagation.with_max_attempts(3);

        let report = run_simulator(graph.snapshot(), config).await.unwrap();

        assert!(!report.passed());
        assert_eq!(report.stats.failed, 4);
        assert_eq!(report.stats.success, 0);
        assert_eq!(report.notifications.len(), 4);
        assert!(report
            .tasks
            .iter()
            .all(|t| t.status == TaskStatus::Failed && t.attempts == 3));
        assert!(report.tasks.iter().any(|t| t.source == upload));
        assert!(report.generate_text().contains("Result: FAIL"));
    }

    #[tokio::test(start_paused = true)]
    async fn same_seed_same_outcome() {
        let (graph, _) = diamond_workflow();
        let outcome = |report: SimulatorReport| {
            report
                .tasks
                .into_iter()
                .map(|t| (t.source, t.target, t.status, t.attempts))
                .collect::<Vec<_>>()
        };

        let first = run_simulator(graph.snapshot(), config()).await.unwrap();
        let second = run_simulator(graph.snapshot(), config()).await.unwrap();

        assert_eq!(outcome(first), outcome(second));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported() {
        let (mut graph, [upload, ..]) = diamond_workflow();
        graph.node_mut(upload).unwrap().config = json!({ "ready": false });
        let config = SimulatorConfig {
            timeout_secs: 5,
            ..config()
        };

        let report = run_simulator(graph.snapshot(), config).await.unwrap();

        assert!(report.timed_out);
        assert!(!report.passed());
        assert!(report.generate_text().contains("did not settle"));
    }
}
