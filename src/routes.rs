//! HTTP surface
//!
//! Endpoint-per-endpoint mirror of the session gateway API:
//!
//! | Method | Path                     |                               |
//! |--------|--------------------------|-------------------------------|
//! | POST   | /sessions                | create a session              |
//! | GET    | /sessions/{id}           | session state                 |
//! | POST   | /sessions/{id}/step      | step (batched)                |
//! | DELETE | /sessions/{id}           | delete one session            |
//! | DELETE | /sessions                | delete all sessions           |
//! | GET    | /games                   | discovered game files         |
//! | GET    | /task-types              | task type table               |
//! | GET    | /health                  | liveness and pool usage       |

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

use crate::batcher::BatchCoordinator;
use crate::error::ApiError;
use crate::models::{
    CreateSessionRequest, DeletedResponse, DeletedSessionResponse, GameListResponse,
    HealthResponse, SessionResponse, StepRequest, StepResponse, TaskTypesResponse,
};
use crate::session::{SessionManager, SessionSnapshot, SessionStatus};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub batcher: BatchCoordinator,
    pub game_files: Arc<Vec<String>>,
}

/// Builds the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(create_session).delete(delete_all_sessions))
        .route("/sessions/:session_id", get(get_session).delete(delete_session))
        .route("/sessions/:session_id/step", post(step_session))
        .route("/games", get(list_games))
        .route("/task-types", get(list_task_types))
        .route("/health", get(health_check))
        .with_state(state)
}

fn session_response(snapshot: SessionSnapshot) -> SessionResponse {
    SessionResponse {
        session_id: snapshot.session_id,
        game_file: snapshot.game_file,
        observation: snapshot.observation,
        admissible_commands: snapshot.admissible_commands,
        status: snapshot.status.as_str().to_string(),
        created_at: snapshot.created_at,
        last_active_at: snapshot.last_active_at,
    }
}

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<SessionResponse>, ApiError> {
    let request = body.map(|Json(body)| body).unwrap_or_default();
    let snapshot = state
        .manager
        .create_session(request.game_file, request.task_type)
        .await?;
    Ok(Json(session_response(snapshot)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = state.manager.snapshot(&session_id).await?;
    Ok(Json(session_response(snapshot)))
}

async fn step_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<StepRequest>,
) -> Result<Json<StepResponse>, ApiError> {
    // Reject finished sessions before queueing into the batch window.
    let snapshot = state.manager.snapshot(&session_id).await?;
    if snapshot.status == SessionStatus::Done {
        return Err(ApiError::SessionAlreadyDone(session_id));
    }

    let outcome = state.batcher.submit(&session_id, &body.action).await?;
    Ok(Json(StepResponse {
        session_id,
        observation: outcome.observation,
        score: outcome.score,
        done: outcome.done,
        won: outcome.won,
        admissible_commands: outcome.admissible_commands,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DeletedSessionResponse>, ApiError> {
    state.manager.delete_session(&session_id).await?;
    Ok(Json(DeletedSessionResponse {
        status: "ok".to_string(),
        session_id,
    }))
}

async fn delete_all_sessions(State(state): State<AppState>) -> Json<DeletedResponse> {
    let deleted = state.manager.delete_all_sessions().await;
    Json(DeletedResponse {
        status: "ok".to_string(),
        count: deleted.len(),
        deleted,
    })
}

async fn list_games(State(state): State<AppState>) -> Json<GameListResponse> {
    Json(GameListResponse {
        total: state.game_files.len(),
        games: state.game_files.as_ref().clone(),
    })
}

async fn list_task_types() -> Json<TaskTypesResponse> {
    Json(TaskTypesResponse::current())
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_sessions: state.manager.active_session_count().await,
        max_sessions: state.manager.max_sessions(),
        available_games: state.game_files.len(),
    })
}
