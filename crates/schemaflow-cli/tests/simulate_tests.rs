//! Simulator and inspector over workflow files on disk

use schemaflow_cli::{inspect, load_config, read_snapshot, run_simulator, SimulatorConfig};
use schemaflow_test_utils::{diamond_workflow, manual_config};
use std::path::Path;

fn demo(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name)
}

#[test]
fn demo_workflow_inspects() {
    let snapshot = read_snapshot(&demo("sales_pipeline.json")).unwrap();

    let report = inspect(snapshot).unwrap();

    let labels: Vec<_> = report.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["sales_2024.xlsx", "region = EU", "quarterly summary", "eu_report.xlsx"]
    );
    assert_eq!(report.nodes[0].outputs[0].sheet.as_deref(), Some("Q1"));
}

#[test]
fn demo_config_loads() {
    let config = load_config(Some(&demo("propagation.toml"))).unwrap();
    assert_eq!(config.max_attempts, 8);
    assert_eq!(config.retention_secs, 7200);
}

#[tokio::test(start_paused = true)]
async fn demo_workflow_simulates() {
    let snapshot = read_snapshot(&demo("sales_pipeline.json")).unwrap();
    let config = SimulatorConfig {
        seed: 7,
        max_ready_ms: 500,
        propagation: load_config(Some(&demo("propagation.toml"))).unwrap(),
        ..SimulatorConfig::default()
    };

    let report = run_simulator(snapshot, config).await.unwrap();

    assert!(report.passed(), "{}", report.generate_text());
    assert_eq!(report.stats.success, 3);
    assert!(report.tasks.iter().all(|t| t.last_error.is_none()));
}

#[tokio::test(start_paused = true)]
async fn json_report_round_trips_through_serde() {
    let (graph, _) = diamond_workflow();
    let file = tempfile::NamedTempFile::new().unwrap();
    serde_json::to_writer(file.as_file(), &graph.snapshot()).unwrap();

    let snapshot = read_snapshot(file.path()).unwrap();
    let config = SimulatorConfig {
        propagation: manual_config(),
        ..SimulatorConfig::default()
    };
    let report = run_simulator(snapshot, config).await.unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["stats"]["success"], 4);
    assert_eq!(json["tasks"].as_array().unwrap().len(), 4);
    assert_eq!(json["timed_out"], false);
    assert_eq!(json["tasks"][0]["status"], "success");
}

#[test]
fn invalid_workflow_is_rejected() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), r#"{ "nodes": [{ "id": "not-a-uuid" }] }"#).unwrap();

    let err = read_snapshot(file.path()).unwrap_err();
    assert!(err.to_string().contains("failed to parse workflow"));
}
