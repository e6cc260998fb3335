//! Scripted in-process worker transport for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::worker::{WorkerError, WorkerHandle, WorkerReply, WorkerRequest, WorkerTransport};

/// A canned reply, or an injected failure.
#[derive(Debug, Clone)]
pub enum MockReply {
    Reply(WorkerReply),
    Fail(String),
}

impl MockReply {
    pub fn ok(observation: impl Into<String>) -> Self {
        MockReply::Reply(WorkerReply {
            status: "ok".to_string(),
            message: None,
            observation: observation.into(),
            admissible_commands: vec!["look".to_string(), "inventory".to_string()],
            score: 0.0,
            done: false,
            won: false,
        })
    }

    pub fn done(observation: impl Into<String>, score: f64, won: bool) -> Self {
        MockReply::Reply(WorkerReply {
            status: "ok".to_string(),
            message: None,
            observation: observation.into(),
            admissible_commands: Vec::new(),
            score,
            done: true,
            won,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        MockReply::Reply(WorkerReply {
            status: "error".to_string(),
            message: Some(message.into()),
            observation: String::new(),
            admissible_commands: Vec::new(),
            score: 0.0,
            done: false,
            won: false,
        })
    }
}

#[derive(Default)]
struct MockState {
    replies: Mutex<VecDeque<MockReply>>,
    spawns: AtomicUsize,
    kills: AtomicUsize,
    fail_spawn: AtomicBool,
}

/// Shared transport whose workers pop replies from a single scripted queue.
/// When the queue runs dry, workers answer with a generic "ok" reply so tests
/// only script the exchanges they assert on.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.state.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_replies(&self, replies: impl IntoIterator<Item = MockReply>) {
        let mut queue = self.state.replies.lock().unwrap();
        for reply in replies {
            queue.push_back(reply);
        }
    }

    /// Makes the next `spawn` call fail.
    pub fn fail_next_spawn(&self) {
        self.state.fail_spawn.store(true, Ordering::SeqCst);
    }

    pub fn spawn_count(&self) -> usize {
        self.state.spawns.load(Ordering::SeqCst)
    }

    pub fn kill_count(&self) -> usize {
        self.state.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerTransport for MockTransport {
    async fn spawn(&self, _session_id: &str) -> Result<Box<dyn WorkerHandle>, WorkerError> {
        if self.state.fail_spawn.swap(false, Ordering::SeqCst) {
            return Err(WorkerError::Other("injected spawn failure".to_string()));
        }
        self.state.spawns.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockWorker {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MockWorker {
    state: Arc<MockState>,
}

#[async_trait]
impl WorkerHandle for MockWorker {
    async fn exchange(
        &mut self,
        _request: &WorkerRequest,
        _deadline: Duration,
    ) -> Result<WorkerReply, WorkerError> {
        let next = self
            .state
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::ok("mock observation"));
        match next {
            MockReply::Reply(reply) => Ok(reply),
            MockReply::Fail(message) => Err(WorkerError::Other(message)),
        }
    }

    async fn kill(&mut self) {
        self.state.kills.fetch_add(1, Ordering::SeqCst);
    }
}
