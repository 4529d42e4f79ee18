// ABOUTME: Agent session configuration shared by backends.
// ABOUTME: Every conversation session is created from one fixed AgentConfig.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options an agent session is opened with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path to the agent binary
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Model identifier passed to the agent
    #[serde(default = "default_model")]
    pub model: String,

    /// Permission mode passed to the agent
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,

    /// Tools the agent may use; empty means none
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// Working directory for the agent process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

fn default_binary() -> String {
    "claude".to_string()
}

fn default_model() -> String {
    "haiku".to_string()
}

fn default_permission_mode() -> String {
    "default".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            model: default_model(),
            permission_mode: default_permission_mode(),
            allowed_tools: Vec::new(),
            working_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.binary, "claude");
        assert_eq!(config.model, "haiku");
        assert_eq!(config.permission_mode, "default");
        assert!(config.allowed_tools.is_empty());
        assert!(config.working_dir.is_none());
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: AgentConfig = serde_json::from_value(serde_json::json!({
            "model": "sonnet"
        }))
        .unwrap();
        assert_eq!(config.binary, "claude");
        assert_eq!(config.model, "sonnet");
    }
}
