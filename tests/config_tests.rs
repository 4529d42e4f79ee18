// ABOUTME: Tests for configuration loading, env overrides, and validation.
// ABOUTME: Serialized because they manipulate process-wide environment variables.

use hearsay::config::Config;
use serial_test::serial;
use std::path::Path;

const ENV_VARS: &[&str] = &[
    "SLACK_BOT_TOKEN",
    "SLACK_APP_TOKEN",
    "CLAUDE_WORKING_DIR",
    "AGENT_BINARY",
    "AGENT_MODEL",
    "HEALTH_PORT",
    "HEALTH_HOST",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_missing_tokens_is_fatal() {
    clear_env();

    let result = Config::load_from(Path::new("/nonexistent/config.toml"));
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("slack.bot_token is required"));
}

#[test]
#[serial]
fn test_missing_app_token_is_fatal() {
    clear_env();
    std::env::set_var("SLACK_BOT_TOKEN", "xoxb-test");

    let result = Config::load_from(Path::new("/nonexistent/config.toml"));
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("slack.app_token is required"));

    clear_env();
}

#[test]
#[serial]
fn test_env_only_config_with_defaults() {
    clear_env();
    std::env::set_var("SLACK_BOT_TOKEN", "xoxb-test");
    std::env::set_var("SLACK_APP_TOKEN", "xapp-test");

    let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
    assert_eq!(config.slack.bot_token, "xoxb-test");
    assert_eq!(config.slack.app_token, "xapp-test");
    assert_eq!(config.agent.binary, "claude");
    assert_eq!(config.agent.model, "haiku");
    assert_eq!(config.agent.permission_mode, "default");
    assert!(config.agent.allowed_tools.is_empty());
    assert!(config.agent.working_dir.is_none());
    assert_eq!(config.health.port, 8080);
    assert_eq!(config.health.host, "127.0.0.1");

    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_take_effect() {
    clear_env();
    std::env::set_var("SLACK_BOT_TOKEN", "xoxb-test");
    std::env::set_var("SLACK_APP_TOKEN", "xapp-test");
    std::env::set_var("CLAUDE_WORKING_DIR", "/srv/agent");
    std::env::set_var("AGENT_MODEL", "sonnet");
    std::env::set_var("HEALTH_PORT", "9999");

    let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
    assert_eq!(
        config.agent.working_dir.unwrap().to_str().unwrap(),
        "/srv/agent"
    );
    assert_eq!(config.agent.model, "sonnet");
    assert_eq!(config.health.port, 9999);

    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[slack]
bot_token = "xoxb-from-file"
app_token = "xapp-from-file"

[agent]
model = "haiku"

[health]
port = 8080
"#,
    )
    .unwrap();

    std::env::set_var("SLACK_BOT_TOKEN", "xoxb-from-env");

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.slack.bot_token, "xoxb-from-env");
    assert_eq!(config.slack.app_token, "xapp-from-file");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_health_port_errors() {
    clear_env();
    std::env::set_var("SLACK_BOT_TOKEN", "xoxb-test");
    std::env::set_var("SLACK_APP_TOKEN", "xapp-test");
    std::env::set_var("HEALTH_PORT", "not-a-port");

    let result = Config::load_from(Path::new("/nonexistent/config.toml"));
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("HEALTH_PORT must be a valid port number"));

    clear_env();
}

#[test]
#[serial]
fn test_malformed_toml_errors() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not toml [").unwrap();

    let result = Config::load_from(&path);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Failed to parse"));
}
