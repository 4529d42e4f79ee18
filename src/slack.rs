// ABOUTME: Slack gateway - Socket Mode listener for app mentions and threaded replies.
// ABOUTME: Normalizes push events into MentionEvents and posts replies via the Web API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use slack_morphism::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::SlackConfig;
use crate::dispatcher::Responder;

/// One inbound app-mention, normalized for dispatch
#[derive(Debug, Clone)]
pub struct MentionEvent {
    pub user: String,
    pub channel: String,
    pub thread_ts: Option<String>,
    pub ts: String,
    pub text: String,
}

/// State shared with Socket Mode callback functions via user state storage.
/// Callbacks are fn pointers (not closures), so they cannot capture variables.
/// This state is registered via `with_user_state()` and retrieved inside
/// callbacks from the `SlackClientEventsUserState` RwLock.
#[derive(Clone)]
struct SlackBridgeState {
    /// Channel for sending incoming mentions to the dispatcher
    tx: Arc<mpsc::Sender<MentionEvent>>,
    /// Bot's user ID (to skip self-messages)
    bot_user_id: String,
}

/// Handle push events from Socket Mode; only app mentions are of interest
async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let bridge = {
        let guard = states.read().await;
        guard
            .get_user_state::<SlackBridgeState>()
            .cloned()
            .ok_or("SlackBridgeState not found in user state")?
    };

    if let SlackEventCallbackBody::AppMention(mention_event) = event.event {
        handle_mention_event(&bridge, &mention_event).await;
    }
    Ok(())
}

/// Process a Slack app mention event into a MentionEvent
async fn handle_mention_event(bridge: &SlackBridgeState, mention_event: &SlackAppMentionEvent) {
    let sender_id = mention_event.user.to_string();

    // Skip bot's own messages
    if sender_id == bridge.bot_user_id {
        return;
    }

    // A bare mention with no extra text still gets an ack and a reply
    let text = mention_event
        .content
        .text
        .as_ref()
        .map(|t| t.to_string())
        .unwrap_or_default();

    let event = MentionEvent {
        user: sender_id,
        channel: mention_event.channel.to_string(),
        thread_ts: mention_event
            .origin
            .thread_ts
            .as_ref()
            .map(|ts| ts.to_string()),
        ts: mention_event.origin.ts.to_string(),
        text,
    };

    if bridge.tx.send(event).await.is_err() {
        tracing::warn!(platform = "slack", "Mention receiver dropped");
    }
}

/// Socket Mode error handler
fn socket_mode_error_handler(
    err: Box<dyn std::error::Error + Send + Sync>,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> HttpStatusCode {
    tracing::error!(platform = "slack", error = %err, "Socket Mode error");
    HttpStatusCode::OK
}

/// Slack gateway using slack-morphism with Socket Mode
pub struct SlackGateway {
    /// Shared Slack client for API calls
    client: Arc<SlackHyperClient>,
    /// Bot OAuth token (xoxb-...) for Web API calls
    bot_token: SlackApiToken,
    /// App-level token (xapp-...) for Socket Mode connections
    app_token: SlackApiToken,
    /// Bot's Slack user ID (resolved via auth.test at startup)
    bot_user_id: String,
}

impl SlackGateway {
    /// Create a gateway from config.
    ///
    /// Resolves the bot's user ID via the `auth.test` API call.
    pub async fn new(config: &SlackConfig) -> Result<Self> {
        let client = Arc::new(SlackClient::new(
            SlackClientHyperConnector::new().context("Failed to create Slack HTTP connector")?,
        ));

        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.bot_token.clone()));
        let app_token = SlackApiToken::new(SlackApiTokenValue(config.app_token.clone()));

        let session = client.open_session(&bot_token);
        let auth_response = session
            .auth_test()
            .await
            .context("Failed to call Slack auth.test — check bot_token")?;

        let bot_user_id = auth_response.user_id.to_string();

        tracing::info!(
            bot_user = %bot_user_id,
            team = %auth_response.team,
            "Slack bot authenticated"
        );

        Ok(Self {
            client,
            bot_token,
            app_token,
            bot_user_id,
        })
    }

    /// Start the Socket Mode listener; mentions arrive on the returned channel.
    ///
    /// The returned task runs for the process lifetime and is aborted by the
    /// lifecycle controller during shutdown.
    pub fn mention_stream(&self) -> (mpsc::Receiver<MentionEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(256);
        let client = Arc::clone(&self.client);
        let app_token = self.app_token.clone();

        let bridge_state = SlackBridgeState {
            tx: Arc::new(tx),
            bot_user_id: self.bot_user_id.clone(),
        };

        let listener_task = tokio::spawn(async move {
            // Socket Mode callbacks must be fn pointers, not closures
            let socket_mode_callbacks =
                SlackSocketModeListenerCallbacks::new().with_push_events(handle_push_event);

            let listener_environment = Arc::new(
                SlackClientEventsListenerEnvironment::new(client)
                    .with_error_handler(socket_mode_error_handler)
                    .with_user_state(bridge_state),
            );

            let socket_mode_listener = SlackClientSocketModeListener::new(
                &SlackClientSocketModeConfig::new(),
                listener_environment,
                socket_mode_callbacks,
            );

            match socket_mode_listener.listen_for(&app_token).await {
                Ok(_) => {
                    tracing::info!(platform = "slack", "Socket Mode connected");

                    // serve() blocks until the listener is shut down
                    socket_mode_listener.serve().await;
                }
                Err(e) => {
                    tracing::error!(
                        platform = "slack",
                        error = %e,
                        "Failed to start Socket Mode listener"
                    );
                }
            }
        });

        (rx, listener_task)
    }

    /// Responder that posts threaded replies through the Web API
    pub fn responder(&self) -> SlackResponder {
        SlackResponder {
            client: Arc::clone(&self.client),
            bot_token: self.bot_token.clone(),
        }
    }
}

/// Posts replies into Slack threads via chat.postMessage
pub struct SlackResponder {
    client: Arc<SlackHyperClient>,
    bot_token: SlackApiToken,
}

#[async_trait]
impl Responder for SlackResponder {
    async fn reply(&self, channel: &str, thread_ts: &str, text: &str) -> Result<()> {
        let session = self.client.open_session(&self.bot_token);

        let req = SlackApiChatPostMessageRequest::new(
            channel.into(),
            SlackMessageContent::new().with_text(text.to_string()),
        )
        .with_thread_ts(thread_ts.into());

        session
            .chat_post_message(&req)
            .await
            .with_context(|| format!("Failed to send threaded Slack message to {}", channel))?;

        Ok(())
    }
}
