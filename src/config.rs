use std::fs;
use std::time::Duration;
use anyhow::{Result, Context as AnyhowContext};
use serde::{Serialize, Deserialize};

/// Engine tuning. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a mutating call waits for the per-instance lock before giving up with `Busy`.
    pub lock_timeout_ms: u64,
    /// Attempts at creating the tasks of new pointers after a commit.
    pub resume_attempts: u32,
    /// Appended to the display name of derived definitions.
    pub derived_name_suffix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
            resume_attempts: 3,
            derived_name_suffix: " (derived)".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

pub fn load_config(file_path: &str) -> Result<EngineConfig> {
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read config file from {}", file_path))?;

    let config: EngineConfig = serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Failed to deserialize config from {}", file_path))?;

    Ok(config)
}
