// ABOUTME: Conversation registry mapping (channel, thread) keys to live agent sessions.
// ABOUTME: Sessions are created lazily, exactly once per key, and drained on shutdown.

use anyhow::{Context, Result};
use hearsay_agent::AgentHandle;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Mutex;

use crate::metrics;

/// Factory that builds a fresh, not-yet-connected session handle
pub type SessionFactory = Box<dyn Fn() -> Result<AgentHandle> + Send + Sync>;

/// Identifies one ongoing multi-turn exchange
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub channel: String,
    pub thread: String,
}

impl ConversationKey {
    /// Derive the key for an event; the thread defaults to the event's own ts
    pub fn from_event(channel: &str, thread_ts: Option<&str>, ts: &str) -> Self {
        Self {
            channel: channel.to_string(),
            thread: thread_ts.unwrap_or(ts).to_string(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.thread)
    }
}

struct SessionEntry {
    handle: AgentHandle,
    created_at: String,
}

/// Maps conversation keys to live agent sessions.
///
/// Entries live for the process lifetime; there is no eviction, capacity
/// bound, or TTL. The map lock is held across the connection handshake so at
/// most one handshake runs per key even under concurrent mentions.
pub struct ConversationRegistry {
    sessions: Mutex<HashMap<ConversationKey, SessionEntry>>,
    factory: SessionFactory,
}

impl ConversationRegistry {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// Return the session for this conversation, opening one on first use.
    ///
    /// A failed handshake leaves no entry behind; the next mention in the
    /// conversation attempts the handshake again.
    pub async fn get_or_create(&self, key: &ConversationKey) -> Result<AgentHandle> {
        let mut sessions = self.sessions.lock().await;

        if let Some(entry) = sessions.get(key) {
            return Ok(entry.handle.clone());
        }

        let handle = (self.factory)().context("Failed to build agent session")?;
        handle
            .connect()
            .await
            .with_context(|| format!("Handshake failed for conversation {}", key))?;

        tracing::info!(
            conversation = %key,
            backend = handle.name(),
            "Agent session created"
        );
        sessions.insert(
            key.clone(),
            SessionEntry {
                handle: handle.clone(),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        metrics::set_active_conversations(sessions.len() as u64);

        Ok(handle)
    }

    /// Close every session and clear the registry. Used once, during shutdown.
    ///
    /// Individual close failures are logged and never abort the remaining
    /// drain iterations.
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.lock().await;

        for (key, entry) in sessions.drain() {
            match entry.handle.close().await {
                Ok(()) => tracing::info!(
                    conversation = %key,
                    created_at = %entry.created_at,
                    "Agent session closed"
                ),
                Err(e) => tracing::error!(
                    conversation = %key,
                    created_at = %entry.created_at,
                    error = %e,
                    "Failed to close agent session"
                ),
            }
        }
        metrics::set_active_conversations(0);
        tracing::info!("All agent sessions drained");
    }

    /// Number of live conversations
    pub async fn conversation_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
