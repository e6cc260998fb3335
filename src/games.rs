//! Game file discovery
//!
//! Walks the configured ALFWorld data directories and collects the game files
//! a worker can actually load: a game directory must carry both
//! `traj_data.json` and `game.tw-pddl`, belong to one of the configured task
//! types, and be marked solvable. This re-implements the environment's own
//! collection logic so the host never needs ALFWorld installed.

use ignore::WalkBuilder;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::task_type_name;

#[derive(Debug, Error)]
pub enum GamesError {
    #[error("Failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// The slice of ALFWorld's base config YAML the gateway cares about.
#[derive(Debug, Deserialize)]
struct BaseConfig {
    env: EnvSection,
    dataset: DatasetSection,
}

#[derive(Debug, Deserialize)]
struct EnvSection {
    #[serde(default)]
    task_types: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct DatasetSection {
    #[serde(default)]
    data_path: Option<String>,
    #[serde(default)]
    eval_id_data_path: Option<String>,
    #[serde(default)]
    eval_ood_data_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrajData {
    #[serde(default)]
    task_type: String,
}

#[derive(Debug, Deserialize)]
struct GameData {
    #[serde(default)]
    solvable: bool,
}

/// Discovers solvable game files from the ALFWorld base config.
pub fn discover_game_files(config_path: &Path) -> Result<Vec<String>, GamesError> {
    let raw = std::fs::read_to_string(config_path).map_err(|source| GamesError::ReadConfig {
        path: config_path.to_path_buf(),
        source,
    })?;
    let config: BaseConfig =
        serde_yaml::from_str(&raw).map_err(|source| GamesError::ParseConfig {
            path: config_path.to_path_buf(),
            source,
        })?;

    let task_names: Vec<&str> = config
        .env
        .task_types
        .iter()
        .filter_map(|t| task_type_name(*t))
        .collect();

    let data_paths: Vec<String> = [
        config.dataset.data_path.as_deref(),
        config.dataset.eval_id_data_path.as_deref(),
        config.dataset.eval_ood_data_path.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(expand_env_vars)
    .collect();

    let mut game_files = Vec::new();
    for data_path in &data_paths {
        let root = Path::new(data_path);
        if !root.is_dir() {
            warn!("Data path does not exist: {}", data_path);
            continue;
        }
        collect_from(root, &task_names, &mut game_files);
    }

    debug!(
        "Discovered {} game files across {} data paths",
        game_files.len(),
        data_paths.len()
    );
    game_files.sort();
    Ok(game_files)
}

fn collect_from(root: &Path, task_names: &[&str], out: &mut Vec<String>) {
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build();

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };
        if entry.file_name() != "traj_data.json" {
            continue;
        }
        let Some(game_dir) = entry.path().parent() else {
            continue;
        };

        let game_file = game_dir.join("game.tw-pddl");
        if !game_file.exists() {
            continue;
        }

        // Movable and sliced variants are known-unsolvable layouts
        let dir_str = game_dir.to_string_lossy();
        if dir_str.contains("movable") || dir_str.contains("Sliced") {
            continue;
        }

        if !matches_task_type(entry.path(), task_names) {
            continue;
        }

        if !is_solvable(&game_file) {
            continue;
        }

        out.push(game_file.to_string_lossy().into_owned());
    }
}

fn matches_task_type(traj_path: &Path, task_names: &[&str]) -> bool {
    let Ok(raw) = std::fs::read_to_string(traj_path) else {
        return false;
    };
    let Ok(traj) = serde_json::from_str::<TrajData>(&raw) else {
        return false;
    };
    task_names.iter().any(|name| *name == traj.task_type)
}

fn is_solvable(game_file: &Path) -> bool {
    let Ok(raw) = std::fs::read_to_string(game_file) else {
        return false;
    };
    let Ok(game) = serde_json::from_str::<GameData>(&raw) else {
        return false;
    };
    game.solvable
}

/// Expands `$VAR` and `${VAR}` references from the process environment.
/// Unknown variables are left as written, matching the original behavior.
fn expand_env_vars(input: &str) -> String {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static regex");
    pattern
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or("");
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
