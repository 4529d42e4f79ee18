// ABOUTME: AgentHandle provides a Send+Sync wrapper around a per-session worker task.
// ABOUTME: Uses channels to communicate with the worker that owns the backend connection.

use crate::AgentEvent;
use anyhow::Result;
use tokio::sync::{mpsc, oneshot};

/// Commands sent from AgentHandle to the session worker
#[derive(Debug)]
pub enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Query {
        text: String,
        event_tx: mpsc::Sender<AgentEvent>,
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Send + Sync handle for one agent session.
///
/// Internally communicates with a worker task that owns the actual backend
/// connection. The worker processes commands one at a time, so two turns on
/// the same session never overlap: a second query waits until the previous
/// turn's fragments have all been produced.
#[derive(Clone, Debug)]
pub struct AgentHandle {
    tx: mpsc::Sender<Command>,
    name: &'static str,
}

impl AgentHandle {
    /// Create a new AgentHandle with the given command channel and backend name
    pub fn new(tx: mpsc::Sender<Command>, name: &'static str) -> Self {
        Self { tx, name }
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Perform the connection handshake. Must succeed before the first query.
    pub async fn connect(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Connect { reply: reply_tx })
            .await
            .map_err(|_| anyhow::anyhow!("Session worker closed"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Session worker dropped reply channel"))?
    }

    /// Submit a user message and receive this turn's fragments via EventReceiver.
    ///
    /// The returned receiver yields fragments in emission order and ends when
    /// the agent signals completion of the turn.
    pub async fn query(&self, text: &str) -> Result<EventReceiver> {
        let (event_tx, event_rx) = mpsc::channel(2048);
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(Command::Query {
                text: text.to_string(),
                event_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Session worker closed"))?;

        // Wait for the backend to acknowledge the query was submitted
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Session worker dropped reply channel"))??;

        Ok(EventReceiver::new(event_rx))
    }

    /// Release the backend connection. Callers invoke at most once.
    pub async fn close(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Close { reply: reply_tx })
            .await
            .map_err(|_| anyhow::anyhow!("Session worker closed"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("Session worker dropped reply channel"))?
    }
}

/// Receiver for the fragments of one query/response turn.
///
/// This is `Send` so it can be passed across async task boundaries.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<AgentEvent>,
}

impl EventReceiver {
    /// Create a new EventReceiver wrapping the given channel
    pub fn new(rx: mpsc::Receiver<AgentEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next fragment, or None once the turn is complete
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }
}
