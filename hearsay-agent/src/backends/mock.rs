// ABOUTME: Mock backend for testing - returns pre-configured fragment sequences.
// ABOUTME: Allows deterministic tests without spawning a real agent process.
//!
//! # Example
//!
//! ```no_run
//! use hearsay_agent::backends::mock::MockBackend;
//! use hearsay_agent::AgentEvent;
//!
//! # async fn example() {
//! let mock = MockBackend::new()
//!     .on_prompt("hello").respond_text("Hi there!")
//!     .on_prompt("explain").respond_with(vec![
//!         AgentEvent::Thought("working through it".to_string()),
//!         AgentEvent::Text("Here is the answer".to_string()),
//!     ]);
//!
//! let handle = mock.into_handle();
//! handle.connect().await.unwrap();
//! let mut receiver = handle.query("hello").await.unwrap();
//!
//! if let Some(AgentEvent::Text(text)) = receiver.recv().await {
//!     assert_eq!(text, "Hi there!");
//! }
//! # }
//! ```

use crate::event::AgentEvent;
use crate::handle::{AgentHandle, Command};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Mock backend for testing
pub struct MockBackend {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    connect_failure: Option<String>,
}

struct Expectation {
    pattern: String,
    events: Vec<AgentEvent>,
}

impl MockBackend {
    /// Create a new mock backend with no expectations
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            connect_failure: None,
        }
    }

    /// Make connect() fail with the given message, simulating a handshake failure
    pub fn fail_connect(mut self, message: &str) -> Self {
        self.connect_failure = Some(message.to_string());
        self
    }

    /// Set up an expectation for a prompt matching the given pattern
    pub fn on_prompt(self, pattern: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            pattern: pattern.to_string(),
        }
    }

    /// Convert this backend into an AgentHandle
    pub fn into_handle(self) -> AgentHandle {
        let (tx, mut rx) = mpsc::channel::<Command>(32);
        let name = "mock";
        let expectations = self.expectations;
        let connect_failure = self.connect_failure;

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Connect { reply } => {
                        let result = match &connect_failure {
                            Some(message) => Err(anyhow::anyhow!("{}", message)),
                            None => Ok(()),
                        };
                        let _ = reply.send(result);
                    }
                    Command::Query {
                        text,
                        event_tx,
                        reply,
                    } => {
                        let _ = reply.send(Ok(()));

                        // Match expectations with FIFO preference: check the front first,
                        // fall back to searching the queue if front doesn't match.
                        let events = {
                            let mut exp = expectations.lock().unwrap_or_else(|e| e.into_inner());
                            if let Some(front) = exp.front() {
                                if text.contains(&front.pattern) {
                                    exp.pop_front().map(|e| e.events)
                                } else {
                                    exp.iter()
                                        .position(|e| text.contains(&e.pattern))
                                        .and_then(|i| exp.remove(i))
                                        .map(|e| e.events)
                                }
                            } else {
                                None
                            }
                        };

                        if let Some(events) = events {
                            for event in events {
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                        } else {
                            let _ = event_tx
                                .send(AgentEvent::Text(format!(
                                    "Mock: no expectation for '{}'",
                                    text
                                )))
                                .await;
                        }
                    }
                    Command::Close { reply } => {
                        let _ = reply.send(Ok(()));
                    }
                }
            }
        });

        AgentHandle::new(tx, name)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for setting up mock expectations with a fluent API
pub struct ExpectationBuilder {
    backend: MockBackend,
    pattern: String,
}

impl ExpectationBuilder {
    /// Respond with a list of fragments
    pub fn respond_with(self, events: Vec<AgentEvent>) -> MockBackend {
        self.backend
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                pattern: self.pattern,
                events,
            });
        self.backend
    }

    /// Respond with a single final-text fragment
    pub fn respond_text(self, text: &str) -> MockBackend {
        self.respond_with(vec![AgentEvent::Text(text.to_string())])
    }

    /// Respond with an error fragment
    pub fn respond_error(self, code: crate::event::ErrorCode, message: &str) -> MockBackend {
        self.respond_with(vec![AgentEvent::Error {
            code,
            message: message.to_string(),
        }])
    }
}
