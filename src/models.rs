//! Request and response schemas for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ALFWorld task types, keyed by their numeric id.
///
/// Duplicated from the environment's task taxonomy so the gateway does not
/// need ALFWorld installed on the host (it only runs inside the worker image).
pub const TASK_TYPES: &[(u8, &str)] = &[
    (1, "pick_and_place_simple"),
    (2, "look_at_obj_in_light"),
    (3, "pick_clean_then_place_in_recep"),
    (4, "pick_heat_then_place_in_recep"),
    (5, "pick_cool_then_place_in_recep"),
    (6, "pick_two_obj_and_place"),
];

/// Looks up the task name for a numeric task type id.
pub fn task_type_name(task_type: u8) -> Option<&'static str> {
    TASK_TYPES
        .iter()
        .find(|(id, _)| *id == task_type)
        .map(|(_, name)| *name)
}

// -- Requests --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Explicit game file to load; a random one is picked when absent.
    pub game_file: Option<String>,
    /// Restrict the random pick to one task type (1-6).
    pub task_type: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepRequest {
    pub action: String,
}

// -- Responses --

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub game_file: String,
    pub observation: String,
    pub admissible_commands: Vec<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResponse {
    pub session_id: String,
    pub observation: String,
    pub score: f64,
    pub done: bool,
    pub won: bool,
    pub admissible_commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedResponse {
    pub status: String,
    pub deleted: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletedSessionResponse {
    pub status: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameListResponse {
    pub games: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskTypesResponse {
    pub task_types: BTreeMap<u8, String>,
}

impl TaskTypesResponse {
    pub fn current() -> Self {
        Self {
            task_types: TASK_TYPES
                .iter()
                .map(|(id, name)| (*id, name.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
    pub max_sessions: usize,
    pub available_games: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub error_code: String,
}
