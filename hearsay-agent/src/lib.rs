// ABOUTME: Agent session abstraction for hearsay.
// ABOUTME: Channel-based session handles over CLI and mock backends.

pub mod backends;
pub mod config;
pub mod event;
pub mod handle;

pub use config::AgentConfig;
pub use event::{AgentEvent, ErrorCode};
pub use handle::{AgentHandle, EventReceiver};
