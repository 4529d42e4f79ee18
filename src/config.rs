// ABOUTME: Configuration parsing from TOML file with environment variable overrides.
// ABOUTME: Validates required tokens and provides sensible defaults for the rest.

use anyhow::{Context, Result};
use hearsay_agent::AgentConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SlackConfig {
    /// Bot OAuth token (xoxb-...)
    #[serde(default)]
    pub bot_token: String,
    /// App-level token (xapp-...) for Socket Mode
    #[serde(default)]
    pub app_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_port")]
    pub port: u16,
    #[serde(default = "default_health_host")]
    pub host: String,
}

fn default_health_port() -> u16 {
    8080
}

fn default_health_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            port: default_health_port(),
            host: default_health_host(),
        }
    }
}

impl Config {
    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    /// Load configuration from the given TOML path, overriding from the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Config::default()
        };

        // Override with environment variables if present
        if let Ok(val) = std::env::var("SLACK_BOT_TOKEN") {
            config.slack.bot_token = val;
        }
        if let Ok(val) = std::env::var("SLACK_APP_TOKEN") {
            config.slack.app_token = val;
        }
        if let Ok(val) = std::env::var("CLAUDE_WORKING_DIR") {
            config.agent.working_dir = Some(val.into());
        }
        if let Ok(val) = std::env::var("AGENT_BINARY") {
            config.agent.binary = val;
        }
        if let Ok(val) = std::env::var("AGENT_MODEL") {
            config.agent.model = val;
        }
        if let Ok(val) = std::env::var("HEALTH_PORT") {
            config.health.port = val.parse().with_context(|| {
                format!("HEALTH_PORT must be a valid port number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("HEALTH_HOST") {
            config.health.host = val;
        }

        // Validate required fields
        if config.slack.bot_token.trim().is_empty() {
            anyhow::bail!(
                "slack.bot_token is required (set in config.toml or SLACK_BOT_TOKEN env var)"
            );
        }
        if config.slack.app_token.trim().is_empty() {
            anyhow::bail!(
                "slack.app_token is required (set in config.toml or SLACK_APP_TOKEN env var)"
            );
        }

        Ok(config)
    }
}
