// ABOUTME: CLI backend - keeps one long-lived agent process per session.
// ABOUTME: Speaks stream-json over stdin/stdout, parses JSONL lines into AgentEvents.

use crate::config::AgentConfig;
use crate::event::{AgentEvent, ErrorCode};
use crate::handle::{AgentHandle, Command};
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as ProcessCommand};
use tokio::sync::mpsc;

/// Backend that drives the agent CLI over its streaming JSON interface
pub struct CliBackend {
    config: AgentConfig,
}

/// Live state of one connected agent process
struct CliSession {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    session_id: String,
}

impl CliBackend {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Spawn the session worker and return its handle.
    ///
    /// The worker owns the child process; queries are serialized because the
    /// worker reads each turn to its terminator before taking the next command.
    pub fn into_handle(self) -> AgentHandle {
        let (tx, mut rx) = mpsc::channel::<Command>(32);
        let config = self.config;

        tokio::spawn(async move {
            let mut session: Option<CliSession> = None;

            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Connect { reply } => match open_session(&config).await {
                        Ok(s) => {
                            session = Some(s);
                            let _ = reply.send(Ok(()));
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e));
                        }
                    },
                    Command::Query {
                        text,
                        event_tx,
                        reply,
                    } => {
                        let Some(ref mut s) = session else {
                            let _ = reply.send(Err(anyhow!("Session not connected")));
                            continue;
                        };
                        if let Err(e) = submit_query(&mut s.stdin, &text).await {
                            let _ = reply.send(Err(e));
                            continue;
                        }
                        let _ = reply.send(Ok(()));
                        stream_turn(&mut s.lines, &event_tx).await;
                    }
                    Command::Close { reply } => {
                        let result = match session.take() {
                            Some(s) => close_session(s).await,
                            None => Ok(()),
                        };
                        let _ = reply.send(result);
                    }
                }
            }
        });

        AgentHandle::new(tx, "cli")
    }
}

/// Spawn the agent process and wait for its init announcement
async fn open_session(config: &AgentConfig) -> Result<CliSession> {
    let session_id = uuid::Uuid::new_v4().to_string();

    let mut args = vec![
        "--print".to_string(),
        "--input-format".to_string(),
        "stream-json".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
        "--model".to_string(),
        config.model.clone(),
        "--permission-mode".to_string(),
        config.permission_mode.clone(),
        "--session-id".to_string(),
        session_id.clone(),
    ];
    if !config.allowed_tools.is_empty() {
        args.push("--allowedTools".to_string());
        args.push(config.allowed_tools.join(","));
    }

    tracing::debug!(binary = %config.binary, ?args, "Spawning agent CLI");

    let mut command = ProcessCommand::new(&config.binary);
    command
        .args(&args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    if let Some(ref dir) = config.working_dir {
        if !dir.exists() {
            anyhow::bail!("Working directory does not exist: {}", dir.display());
        }
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to spawn agent binary: {}", config.binary))?;
    let stdin = child.stdin.take().context("Failed to capture stdin")?;
    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let stderr = child.stderr.take().context("Failed to capture stderr")?;

    // Log agent stderr for the session lifetime
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.is_empty() {
                tracing::warn!(stderr = %line, "Agent CLI stderr");
            }
        }
    });

    let mut lines = BufReader::new(stdout).lines();

    // Handshake: the agent announces the session with a system/init line
    loop {
        let line = lines
            .next_line()
            .await
            .context("Failed to read agent output during handshake")?
            .ok_or_else(|| anyhow!("Agent exited before completing the handshake"))?;
        if line.is_empty() {
            continue;
        }
        let Ok(json) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        if json.get("type").and_then(|t| t.as_str()) == Some("system")
            && json.get("subtype").and_then(|s| s.as_str()) == Some("init")
        {
            let announced = json
                .get("session_id")
                .and_then(|s| s.as_str())
                .unwrap_or(&session_id);
            tracing::info!(session_id = %announced, "Agent session connected");
            break;
        }
    }

    Ok(CliSession {
        child,
        stdin,
        lines,
        session_id,
    })
}

/// Write one user message line onto the agent's stdin
async fn submit_query(stdin: &mut ChildStdin, text: &str) -> Result<()> {
    let message = json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{ "type": "text", "text": text }],
        },
    });
    let mut line = serde_json::to_string(&message).context("Failed to encode user message")?;
    line.push('\n');
    stdin
        .write_all(line.as_bytes())
        .await
        .context("Failed to submit query to agent stdin")?;
    stdin
        .flush()
        .await
        .context("Failed to flush agent stdin")?;
    Ok(())
}

/// Read one turn's output, forwarding fragments until the result terminator.
///
/// Keeps reading to the terminator even if the receiver is gone, so the
/// session's stream position stays consistent for the next query.
async fn stream_turn(lines: &mut Lines<BufReader<ChildStdout>>, event_tx: &mpsc::Sender<AgentEvent>) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.is_empty() {
                    continue;
                }
                let Ok(json) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                match json.get("type").and_then(|t| t.as_str()) {
                    Some("assistant") => {
                        for event in parse_assistant_fragments(&json) {
                            if event_tx.send(event).await.is_err() {
                                tracing::debug!("Fragment receiver closed, discarding rest of turn");
                            }
                        }
                    }
                    Some("result") => {
                        let is_error = json
                            .get("is_error")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);
                        if is_error {
                            let message = json
                                .get("error")
                                .and_then(|e| e.as_str())
                                .unwrap_or("Unknown error")
                                .to_string();
                            let code = classify_error(&message);
                            let _ = event_tx.send(AgentEvent::Error { code, message }).await;
                        }
                        return;
                    }
                    _ => {}
                }
            }
            Ok(None) => {
                let _ = event_tx
                    .send(AgentEvent::Error {
                        code: ErrorCode::BackendError,
                        message: "Agent closed the stream mid-turn".to_string(),
                    })
                    .await;
                return;
            }
            Err(e) => {
                let _ = event_tx
                    .send(AgentEvent::Error {
                        code: ErrorCode::BackendError,
                        message: format!("Failed to read agent output: {}", e),
                    })
                    .await;
                return;
            }
        }
    }
}

/// Map assistant content items to fragments: thinking -> Thought, text -> Text
fn parse_assistant_fragments(json: &Value) -> Vec<AgentEvent> {
    let mut events = Vec::new();

    if let Some(content) = json
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
    {
        for item in content {
            match item.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = item.get("text").and_then(|t| t.as_str()) {
                        if !text.is_empty() {
                            events.push(AgentEvent::Text(text.to_string()));
                        }
                    }
                }
                Some("thinking") => {
                    if let Some(thought) = item.get("thinking").and_then(|t| t.as_str()) {
                        if !thought.is_empty() {
                            events.push(AgentEvent::Thought(thought.to_string()));
                        }
                    }
                }
                _ => {}
            }
        }
    }

    events
}

fn classify_error(message: &str) -> ErrorCode {
    if message.contains("timeout") {
        ErrorCode::Timeout
    } else if message.contains("rate limit") {
        ErrorCode::RateLimited
    } else if message.contains("permission") {
        ErrorCode::PermissionDenied
    } else {
        ErrorCode::BackendError
    }
}

/// Close the agent's stdin and wait for it to exit
async fn close_session(session: CliSession) -> Result<()> {
    let CliSession {
        mut child,
        stdin,
        lines: _,
        session_id,
    } = session;

    drop(stdin);
    let status = child
        .wait()
        .await
        .context("Failed to wait for agent process exit")?;
    tracing::info!(session_id = %session_id, exit_code = ?status.code(), "Agent session closed");
    Ok(())
}
