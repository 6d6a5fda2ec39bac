//! Reading workflows and configuration from disk

use anyhow::Context;
use schemaflow_graph::WorkflowSnapshot;
use schemaflow_propagation::PropagationConfig;
use std::path::Path;

/// Parse a workflow snapshot (JSON)
///
/// # Errors
/// The file is unreadable or not a snapshot.
pub fn read_snapshot(path: &Path) -> anyhow::Result<WorkflowSnapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workflow {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse workflow {}", path.display()))
}

/// Load the propagation config, or the defaults without a path
///
/// # Errors
/// The file is unreadable, malformed, or fails validation.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PropagationConfig> {
    match path {
        Some(path) => PropagationConfig::load(path)
            .with_context(|| format!("invalid config {}", path.display())),
        None => Ok(PropagationConfig::default()),
    }
}
