//! Session lifecycle and the container pool
//!
//! A session owns exactly one worker (container). The pool is bounded by a
//! semaphore whose permits live inside the session slots, so every teardown
//! path releases its slot by drop. Container I/O is serialized per session
//! with an async mutex; the idle sweeper evicts sessions that have not
//! stepped within the configured timeout.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::models::task_type_name;
use crate::worker::{WorkerHandle, WorkerRequest, WorkerTransport, DEFAULT_REPLY_DEADLINE};

/// Cadence of the idle sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Done,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Done => "done",
        }
    }
}

/// Mutable per-session state, updated after each successful exchange.
struct SessionState {
    observation: String,
    admissible_commands: Vec<String>,
    status: SessionStatus,
    last_active_at: DateTime<Utc>,
}

/// One live session. Dropping the slot releases its pool permit.
struct SessionSlot {
    id: String,
    game_file: String,
    created_at: DateTime<Utc>,
    state: StdMutex<SessionState>,
    worker: Mutex<Box<dyn WorkerHandle>>,
    _permit: OwnedSemaphorePermit,
}

impl SessionSlot {
    fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().unwrap();
        SessionSnapshot {
            session_id: self.id.clone(),
            game_file: self.game_file.clone(),
            observation: state.observation.clone(),
            admissible_commands: state.admissible_commands.clone(),
            status: state.status,
            created_at: self.created_at,
            last_active_at: state.last_active_at,
        }
    }

    fn status(&self) -> SessionStatus {
        self.state.lock().unwrap().status
    }
}

/// Immutable view of a session, as handed to the HTTP layer.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub game_file: String,
    pub observation: String,
    pub admissible_commands: Vec<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// Result of one step exchange.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub observation: String,
    pub score: f64,
    pub done: bool,
    pub won: bool,
    pub admissible_commands: Vec<String>,
}

pub struct SessionManager {
    transport: Arc<dyn WorkerTransport>,
    config: Arc<ServerConfig>,
    game_files: Arc<Vec<String>>,
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    slots: Arc<Semaphore>,
    sweeper: StdMutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn WorkerTransport>,
        config: Arc<ServerConfig>,
        game_files: Arc<Vec<String>>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_sessions));
        Self {
            transport,
            config,
            game_files,
            sessions: RwLock::new(HashMap::new()),
            slots,
            sweeper: StdMutex::new(None),
        }
    }

    pub async fn active_session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn max_sessions(&self) -> usize {
        self.config.max_sessions
    }

    /// Creates a session: reserve a pool slot, spawn a worker, send `init`.
    /// A full pool is refused immediately rather than queued.
    pub async fn create_session(
        &self,
        game_file: Option<String>,
        task_type: Option<u8>,
    ) -> Result<SessionSnapshot, ApiError> {
        let permit = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| ApiError::NoSlotsAvailable(self.config.max_sessions))?;

        let game_file = self.choose_game_file(game_file, task_type)?;
        let session_id = Uuid::new_v4().to_string();

        let mut worker = self.transport.spawn(&session_id).await?;

        let init = WorkerRequest::Init {
            game_file: self.config.to_container_path(&game_file),
        };
        let reply = match worker.exchange(&init, DEFAULT_REPLY_DEADLINE).await {
            Ok(reply) => reply,
            Err(err) => {
                worker.kill().await;
                return Err(err.into());
            }
        };
        if !reply.is_ok() {
            worker.kill().await;
            return Err(ApiError::Container(format!(
                "Init failed: {}",
                reply.error_message()
            )));
        }

        let now = Utc::now();
        let slot = Arc::new(SessionSlot {
            id: session_id.clone(),
            game_file,
            created_at: now,
            state: StdMutex::new(SessionState {
                observation: reply.observation,
                admissible_commands: reply.admissible_commands,
                status: SessionStatus::Active,
                last_active_at: now,
            }),
            worker: Mutex::new(worker),
            _permit: permit,
        });

        let snapshot = slot.snapshot();
        self.sessions.write().await.insert(session_id.clone(), slot);
        info!(session_id = %session_id, "session created");
        Ok(snapshot)
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, ApiError> {
        Ok(self.get_slot(session_id).await?.snapshot())
    }

    /// Runs one step against the session's worker. Exchanges for the same
    /// session serialize on the worker lock.
    pub async fn step(&self, session_id: &str, action: &str) -> Result<StepOutcome, ApiError> {
        let slot = self.get_slot(session_id).await?;

        let mut worker = slot.worker.lock().await;
        // Re-check under the worker lock: a concurrent step may have finished
        // the episode while we queued.
        if slot.status() == SessionStatus::Done {
            return Err(ApiError::SessionAlreadyDone(session_id.to_string()));
        }

        let request = WorkerRequest::Step {
            action: action.to_string(),
        };
        let reply = worker.exchange(&request, DEFAULT_REPLY_DEADLINE).await?;
        drop(worker);

        if !reply.is_ok() {
            return Err(ApiError::Container(reply.error_message()));
        }

        let mut state = slot.state.lock().unwrap();
        state.observation = reply.observation.clone();
        state.admissible_commands = reply.admissible_commands.clone();
        state.last_active_at = Utc::now();
        if reply.done {
            state.status = SessionStatus::Done;
        }
        drop(state);

        Ok(StepOutcome {
            observation: reply.observation,
            score: reply.score,
            done: reply.done,
            won: reply.won,
            admissible_commands: reply.admissible_commands,
        })
    }

    /// Kills the session's worker and frees its slot.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        let slot = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;

        slot.worker.lock().await.kill().await;
        info!(session_id = %session_id, "session deleted");
        Ok(())
    }

    /// Tears down every session, best effort. Returns the ids deleted.
    pub async fn delete_all_sessions(&self) -> Vec<String> {
        let session_ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        let mut deleted = Vec::with_capacity(session_ids.len());
        for session_id in session_ids {
            match self.delete_session(&session_id).await {
                Ok(()) => deleted.push(session_id),
                Err(err) => warn!(session_id = %session_id, "delete failed: {}", err),
            }
        }
        deleted
    }

    /// Evicts sessions idle beyond the configured timeout. Returns evicted ids.
    pub async fn evict_idle(&self) -> Vec<String> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.config.idle_timeout_s as i64);
        let stale: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, slot)| slot.state.lock().unwrap().last_active_at < cutoff)
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut evicted = Vec::with_capacity(stale.len());
        for session_id in stale {
            info!(session_id = %session_id, "evicting idle session");
            if self.delete_session(&session_id).await.is_ok() {
                evicted.push(session_id);
            }
        }
        evicted
    }

    /// Starts the background idle sweep. Call once at server startup.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let evicted = manager.evict_idle().await;
                if !evicted.is_empty() {
                    debug!("idle sweep evicted {} sessions", evicted.len());
                }
            }
        });
        *self.sweeper.lock().unwrap() = Some(handle);
    }

    /// Stops the sweeper and tears down all sessions.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
        let deleted = self.delete_all_sessions().await;
        info!("shutdown complete, {} sessions removed", deleted.len());
    }

    async fn get_slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, ApiError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))
    }

    /// Picks the game file: explicit request wins, then a random pick among
    /// games matching the task type, then any game.
    fn choose_game_file(
        &self,
        game_file: Option<String>,
        task_type: Option<u8>,
    ) -> Result<String, ApiError> {
        if let Some(file) = game_file {
            return Ok(file);
        }
        if self.game_files.is_empty() {
            return Err(ApiError::Internal("no game files available".to_string()));
        }

        let mut candidates: Vec<&String> = match task_type.and_then(task_type_name) {
            Some(task_name) => self
                .game_files
                .iter()
                .filter(|g| g.contains(task_name))
                .collect(),
            None => Vec::new(),
        };
        if candidates.is_empty() {
            candidates = self.game_files.iter().collect();
        }

        Ok(candidates[fastrand::usize(..candidates.len())].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::mock::{MockReply, MockTransport};
    use std::path::PathBuf;

    fn test_config(max_sessions: usize, idle_timeout_s: u64) -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            alfworld_config_path: PathBuf::from("base_config.yaml"),
            docker_image: "alfworld-text:latest".to_string(),
            data_volume: "/srv/alfworld:/data:ro".to_string(),
            max_sessions,
            batch_window_ms: 0,
            idle_timeout_s,
            host: "127.0.0.1".to_string(),
            port: 0,
        })
    }

    fn test_games() -> Arc<Vec<String>> {
        Arc::new(vec![
            "/srv/alfworld/json/train/pick_and_place_simple-Apple/game.tw-pddl".to_string(),
            "/srv/alfworld/json/train/look_at_obj_in_light-Book/game.tw-pddl".to_string(),
        ])
    }

    fn manager(max_sessions: usize, transport: MockTransport) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            Arc::new(transport),
            test_config(max_sessions, 120),
            test_games(),
        ))
    }

    #[tokio::test]
    async fn create_and_query_session() {
        let transport = MockTransport::new();
        transport.push_reply(MockReply::ok("You are in the kitchen."));
        let manager = manager(4, transport);

        let created = manager.create_session(None, None).await.unwrap();
        assert_eq!(created.status, SessionStatus::Active);
        assert_eq!(created.observation, "You are in the kitchen.");
        assert_eq!(manager.active_session_count().await, 1);

        let snapshot = manager.snapshot(&created.session_id).await.unwrap();
        assert_eq!(snapshot.game_file, created.game_file);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let manager = manager(4, MockTransport::new());
        let err = manager.snapshot("nope").await.unwrap_err();
        assert!(matches!(err, ApiError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn full_pool_refuses_immediately() {
        let transport = MockTransport::new();
        let manager = manager(1, transport);

        let first = manager.create_session(None, None).await.unwrap();
        let err = manager.create_session(None, None).await.unwrap_err();
        assert!(matches!(err, ApiError::NoSlotsAvailable(1)));

        // deleting frees the slot
        manager.delete_session(&first.session_id).await.unwrap();
        assert!(manager.create_session(None, None).await.is_ok());
    }

    #[tokio::test]
    async fn failed_init_releases_slot_and_kills_worker() {
        let transport = MockTransport::new();
        transport.push_reply(MockReply::error("no such game"));
        let manager = manager(1, transport.clone());

        let err = manager.create_session(None, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Container(_)));
        assert_eq!(transport.kill_count(), 1);
        assert_eq!(manager.active_session_count().await, 0);

        // the slot is free again
        assert!(manager.create_session(None, None).await.is_ok());
    }

    #[tokio::test]
    async fn failed_spawn_releases_slot() {
        let transport = MockTransport::new();
        transport.fail_next_spawn();
        let manager = manager(1, transport);

        assert!(manager.create_session(None, None).await.is_err());
        assert!(manager.create_session(None, None).await.is_ok());
    }

    #[tokio::test]
    async fn step_updates_state_and_finishes_episode() {
        let transport = MockTransport::new();
        transport.push_replies([
            MockReply::ok("start"),
            MockReply::ok("You open the fridge."),
            MockReply::done("You win!", 1.0, true),
        ]);
        let manager = manager(4, transport);
        let created = manager.create_session(None, None).await.unwrap();

        let outcome = manager
            .step(&created.session_id, "open fridge 1")
            .await
            .unwrap();
        assert_eq!(outcome.observation, "You open the fridge.");
        assert!(!outcome.done);

        let outcome = manager.step(&created.session_id, "end").await.unwrap();
        assert!(outcome.done);
        assert!(outcome.won);
        assert_eq!(outcome.score, 1.0);

        let snapshot = manager.snapshot(&created.session_id).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Done);

        let err = manager.step(&created.session_id, "look").await.unwrap_err();
        assert!(matches!(err, ApiError::SessionAlreadyDone(_)));
    }

    #[tokio::test]
    async fn step_refreshes_last_active_and_defers_eviction() {
        let transport = MockTransport::new();
        let manager = Arc::new(SessionManager::new(
            Arc::new(transport),
            test_config(4, 1),
            test_games(),
        ));
        let created = manager.create_session(None, None).await.unwrap();

        // age the session past the 1s idle timeout
        let stale = Utc::now() - ChronoDuration::seconds(30);
        {
            let sessions = manager.sessions.read().await;
            let slot = sessions.get(&created.session_id).unwrap();
            slot.state.lock().unwrap().last_active_at = stale;
        }

        manager.step(&created.session_id, "look").await.unwrap();

        let snapshot = manager.snapshot(&created.session_id).await.unwrap();
        assert!(snapshot.last_active_at > stale);

        // the just-stepped session is no longer an eviction candidate
        assert!(manager.evict_idle().await.is_empty());
        assert_eq!(manager.active_session_count().await, 1);
    }

    #[tokio::test]
    async fn worker_error_reply_becomes_container_error() {
        let transport = MockTransport::new();
        transport.push_replies([MockReply::ok("start"), MockReply::error("worker crashed")]);
        let manager = manager(4, transport);
        let created = manager.create_session(None, None).await.unwrap();

        let err = manager.step(&created.session_id, "look").await.unwrap_err();
        assert!(matches!(err, ApiError::Container(_)));

        // the session survives the failed step
        let snapshot = manager.snapshot(&created.session_id).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn explicit_game_file_wins_over_random_pick() {
        let transport = MockTransport::new();
        let manager = manager(4, transport);
        let created = manager
            .create_session(Some("/srv/alfworld/custom/game.tw-pddl".to_string()), None)
            .await
            .unwrap();
        assert_eq!(created.game_file, "/srv/alfworld/custom/game.tw-pddl");
    }

    #[tokio::test]
    async fn task_type_filters_the_random_pick() {
        let transport = MockTransport::new();
        let manager = manager(4, transport);
        let created = manager.create_session(None, Some(2)).await.unwrap();
        assert!(created.game_file.contains("look_at_obj_in_light"));
    }

    #[tokio::test]
    async fn unmatched_task_type_falls_back_to_any_game() {
        let transport = MockTransport::new();
        let manager = manager(4, transport);
        // task type 5 has no matching fixture game
        let created = manager.create_session(None, Some(5)).await.unwrap();
        assert!(!created.game_file.is_empty());
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let transport = MockTransport::new();
        let manager = Arc::new(SessionManager::new(
            Arc::new(transport.clone()),
            test_config(4, 1),
            test_games(),
        ));
        let created = manager.create_session(None, None).await.unwrap();

        // nothing is stale yet
        assert!(manager.evict_idle().await.is_empty());

        // age the session past the timeout
        {
            let sessions = manager.sessions.read().await;
            let slot = sessions.get(&created.session_id).unwrap();
            slot.state.lock().unwrap().last_active_at = Utc::now() - ChronoDuration::seconds(5);
        }

        let evicted = manager.evict_idle().await;
        assert_eq!(evicted, vec![created.session_id]);
        assert_eq!(manager.active_session_count().await, 0);
        assert_eq!(transport.kill_count(), 1);
    }

    #[tokio::test]
    async fn delete_all_reports_every_session() {
        let transport = MockTransport::new();
        let manager = manager(4, transport);
        let a = manager.create_session(None, None).await.unwrap();
        let b = manager.create_session(None, None).await.unwrap();

        let mut deleted = manager.delete_all_sessions().await;
        deleted.sort();
        let mut expected = vec![a.session_id, b.session_id];
        expected.sort();
        assert_eq!(deleted, expected);
        assert_eq!(manager.active_session_count().await, 0);
    }
}
