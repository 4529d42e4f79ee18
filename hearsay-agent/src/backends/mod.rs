// ABOUTME: Agent backend implementations.
// ABOUTME: cli drives the real agent process, mock provides deterministic test sessions.

pub mod cli;
pub mod mock;

pub use cli::CliBackend;
pub use mock::MockBackend;
