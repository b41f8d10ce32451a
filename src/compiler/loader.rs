use anyhow::{Result, Context as AnyhowContext};
use std::fs;
use crate::dsl::Process;
use crate::runtime::graph::Graph;

pub fn load_process_from_yaml(file_path: &str) -> Result<Process> {
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read YAML file from {}", file_path))?;

    let process: Process = serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Failed to deserialize YAML content from {}", file_path))?;

    Ok(process)
}

/// Loads an already compiled graph (as printed by `graft splice`). Validation runs on deserialization.
pub fn load_graph_from_yaml(file_path: &str) -> Result<Graph> {
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read YAML file from {}", file_path))?;

    serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Invalid graph in {}", file_path))
}
