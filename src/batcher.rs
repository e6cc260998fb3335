//! Step-request coalescing
//!
//! Concurrent step requests are funneled through one queue. The flush loop
//! opens a window when the first request arrives, keeps collecting for
//! `batch_window_ms`, then dispatches the whole batch: requests are grouped
//! by session, groups run concurrently, and requests inside a group run
//! sequentially in submission order. A window of zero drains whatever is
//! immediately queued and flushes at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::ApiError;
use crate::session::{SessionManager, StepOutcome};

struct PendingStep {
    session_id: String,
    action: String,
    reply: oneshot::Sender<Result<StepOutcome, ApiError>>,
}

/// Handle for submitting steps into the batching queue. Cheap to clone.
#[derive(Clone)]
pub struct BatchCoordinator {
    queue: mpsc::UnboundedSender<PendingStep>,
}

impl BatchCoordinator {
    /// Spawns the flush loop and returns the submission handle.
    pub fn spawn(manager: Arc<SessionManager>, window: Duration) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(flush_loop(manager, rx, window));
        Self { queue }
    }

    /// Queues a step and waits for its result.
    pub async fn submit(
        &self,
        session_id: &str,
        action: &str,
    ) -> Result<StepOutcome, ApiError> {
        let (reply, result) = oneshot::channel();
        self.queue
            .send(PendingStep {
                session_id: session_id.to_string(),
                action: action.to_string(),
                reply,
            })
            .map_err(|_| ApiError::Internal("batch coordinator is gone".to_string()))?;

        result
            .await
            .map_err(|_| ApiError::Internal("batch coordinator dropped the request".to_string()))?
    }
}

async fn flush_loop(
    manager: Arc<SessionManager>,
    mut rx: mpsc::UnboundedReceiver<PendingStep>,
    window: Duration,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];

        if window.is_zero() {
            while let Ok(next) = rx.try_recv() {
                batch.push(next);
            }
        } else {
            let deadline = tokio::time::sleep(window);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    next = rx.recv() => match next {
                        Some(step) => batch.push(step),
                        None => break,
                    },
                }
            }
        }

        trace!("flushing batch of {} step requests", batch.len());
        dispatch_batch(&manager, batch);
    }
    debug!("batch queue closed, flush loop exiting");
}

/// Groups the batch by session and runs each group on its own task. Requests
/// for the same session execute in submission order.
fn dispatch_batch(manager: &Arc<SessionManager>, batch: Vec<PendingStep>) {
    let mut groups: HashMap<String, Vec<PendingStep>> = HashMap::new();
    for step in batch {
        groups.entry(step.session_id.clone()).or_default().push(step);
    }

    for (_, group) in groups {
        let manager = Arc::clone(manager);
        tokio::spawn(async move {
            for step in group {
                let result = manager.step(&step.session_id, &step.action).await;
                // the requester may have hung up; nothing to do about it
                let _ = step.reply.send(result);
            }
        });
    }
}
