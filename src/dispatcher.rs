// ABOUTME: Mention dispatch pipeline - ack, session lookup, query, fragment drain, reply.
// ABOUTME: Maps each stage failure to one user-visible error reply; never kills the process.

use anyhow::Result;
use async_trait::async_trait;
use hearsay_agent::{AgentEvent, EventReceiver};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::metrics;
use crate::registry::{ConversationKey, ConversationRegistry};
use crate::slack::MentionEvent;

/// Fixed reply used when a turn produces no final-text fragments
pub const FALLBACK_REPLY: &str = "No response generated.";

/// Delivers replies into a conversation thread
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, channel: &str, thread_ts: &str, text: &str) -> Result<()>;
}

/// Failure of one stage of mention handling.
///
/// The alternate formatting on the wrapped errors keeps the full context
/// chain in the user-visible message.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("acknowledgment failed: {0:#}")]
    Ack(anyhow::Error),

    #[error("could not reach the agent backend: {0:#}")]
    Connect(anyhow::Error),

    #[error("query submission failed: {0:#}")]
    Query(anyhow::Error),

    #[error("response stream failed: {0}")]
    Stream(String),

    #[error("reply delivery failed: {0:#}")]
    Reply(anyhow::Error),
}

/// Drives mention events through the registry and agent sessions
pub struct Dispatcher {
    registry: Arc<ConversationRegistry>,
    responder: Arc<dyn Responder>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConversationRegistry>, responder: Arc<dyn Responder>) -> Self {
        Self {
            registry,
            responder,
        }
    }

    /// Receive mentions until shutdown, then await in-flight handlers.
    ///
    /// In-flight agent calls are not aborted; shutdown only stops new work,
    /// and the caller drains the registry after this returns.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<MentionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => {
                            let dispatcher = Arc::clone(&self);
                            in_flight.spawn(async move {
                                dispatcher.handle_mention(event).await;
                            });
                            // Reap finished handlers so the set doesn't grow unbounded
                            while in_flight.try_join_next().is_some() {}
                        }
                        None => {
                            tracing::info!("Mention stream closed");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Shutdown requested, no longer accepting mentions");
                    break;
                }
            }
        }

        while in_flight.join_next().await.is_some() {}
    }

    /// Handle one mention; every failure becomes one error reply to the user
    pub async fn handle_mention(&self, event: MentionEvent) {
        metrics::increment_mentions();
        let key = ConversationKey::from_event(&event.channel, event.thread_ts.as_deref(), &event.ts);

        tracing::info!(user = %event.user, conversation = %key, "Processing mention");

        match self.process(&event, &key).await {
            Ok(()) => {
                tracing::info!(conversation = %key, "Mention handled");
            }
            Err(e) => {
                metrics::increment_dispatch_errors();
                tracing::error!(conversation = %key, error = %e, "Failed to handle mention");

                // The error channel is the reply channel: a failed reply
                // delivery cannot be reported back to the user
                if matches!(e, DispatchError::Reply(_)) {
                    return;
                }

                let apology = format!("Sorry <@{}>, I encountered an error: {}", event.user, e);
                if let Err(reply_err) = self
                    .responder
                    .reply(&event.channel, &key.thread, &apology)
                    .await
                {
                    tracing::error!(
                        conversation = %key,
                        error = %reply_err,
                        "Failed to deliver error reply"
                    );
                }
            }
        }
    }

    async fn process(
        &self,
        event: &MentionEvent,
        key: &ConversationKey,
    ) -> Result<(), DispatchError> {
        // Acknowledge before the (potentially slow) agent call
        let ack = format!("Processing your request <@{}>...", event.user);
        self.responder
            .reply(&event.channel, &key.thread, &ack)
            .await
            .map_err(DispatchError::Ack)?;

        let handle = self
            .registry
            .get_or_create(key)
            .await
            .map_err(DispatchError::Connect)?;

        let receiver = handle
            .query(&event.text)
            .await
            .map_err(DispatchError::Query)?;

        let reply = drain_reply(receiver).await?;

        self.responder
            .reply(&event.channel, &key.thread, &reply)
            .await
            .map_err(DispatchError::Reply)?;

        Ok(())
    }
}

/// Drain one turn's fragments into the reply text.
///
/// Final-text fragments are joined with newlines in arrival order, reasoning
/// fragments are dropped, and a turn with no final text yields the fallback.
pub async fn drain_reply(mut receiver: EventReceiver) -> Result<String, DispatchError> {
    let mut texts = Vec::new();

    while let Some(event) = receiver.recv().await {
        match event {
            AgentEvent::Text(text) => texts.push(text),
            AgentEvent::Thought(_) => {}
            AgentEvent::Error { code, message } => {
                return Err(DispatchError::Stream(format!("{:?}: {}", code, message)));
            }
        }
    }

    if texts.is_empty() {
        Ok(FALLBACK_REPLY.to_string())
    } else {
        Ok(texts.join("\n"))
    }
}
