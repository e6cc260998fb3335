//! Worker protocol and transports
//!
//! A worker is one ALFWorld environment process. The gateway talks to it over
//! a JSON-lines protocol: one request object per line on stdin, one reply
//! object per line on stdout. `WorkerTransport` is the seam between session
//! bookkeeping and the actual process: production uses Docker containers via
//! [`docker::DockerTransport`], tests use the scripted [`mock::MockTransport`].

pub mod docker;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default deadline for a single worker reply.
pub const DEFAULT_REPLY_DEADLINE: Duration = Duration::from_secs(60);

/// Errors from spawning or talking to a worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Worker closed its output stream")]
    StreamClosed,

    #[error("Timed out after {0:?} waiting for worker reply")]
    Timeout(Duration),

    #[error("Invalid worker reply: {0}")]
    InvalidReply(#[from] serde_json::Error),

    #[error("I/O error talking to worker: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker error: {0}")]
    Other(String),
}

/// A request line sent to the worker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum WorkerRequest {
    Init { game_file: String },
    Step { action: String },
}

/// A reply line from the worker. Fields beyond `status` are optional so a
/// terse error reply still parses.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerReply {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub observation: String,
    #[serde(default)]
    pub admissible_commands: Vec<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub won: bool,
}

impl WorkerReply {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// The worker's error message, or a placeholder when it sent none.
    pub fn error_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Spawns workers. One transport serves the whole gateway.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn spawn(&self, session_id: &str) -> Result<Box<dyn WorkerHandle>, WorkerError>;
}

/// One live worker process. Exchanges are strictly request/reply; callers
/// serialize access (the session manager holds a per-session lock).
#[async_trait]
pub trait WorkerHandle: Send {
    async fn exchange(
        &mut self,
        request: &WorkerRequest,
        deadline: Duration,
    ) -> Result<WorkerReply, WorkerError>;

    /// Tears the worker down. Idempotent; errors are swallowed since the
    /// process may already be gone.
    async fn kill(&mut self);
}
