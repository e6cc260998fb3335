//! Host preflight and worker image build
//!
//! The `setup` subcommand checks that Docker is installed, warns when
//! docker-compose is absent, verifies the game data directory, and builds the
//! worker image. The docker-compose probe and the data-directory prompt only
//! gate output and confirmation; the final exit status follows the image
//! build itself.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::cli::commands::SetupArgs;
use crate::config::{dir_is_empty, resolve_data_dir};

/// CLI entry for `setup`. Returns a process exit code.
pub fn handle_setup(args: &SetupArgs) -> i32 {
    run_setup(args, || affirmative(&prompt("Continue anyway? [y/N] ")))
}

/// The setup sequence, with the interactive confirmation injected so the
/// exit-code paths are testable.
fn run_setup(args: &SetupArgs, confirm: impl FnOnce() -> bool) -> i32 {
    if which("docker").is_none() {
        eprintln!("Error: docker is not installed or not on PATH");
        return 1;
    }

    let has_compose = which("docker-compose").is_some();
    if !has_compose {
        warn!("docker-compose not found; parallel multi-container workflows will be unavailable");
    }

    let data_dir = resolve_data_dir();
    if dir_is_empty(&data_dir) {
        println!(
            "Data directory {} is empty or missing; the worker image needs ALFWorld game data.",
            data_dir.display()
        );
        if !args.yes && !confirm() {
            eprintln!("Aborted.");
            return 1;
        }
    }

    let context = args
        .context
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    debug!(
        "Building image {} from context {}",
        args.image_tag,
        context.display()
    );

    let exit_code = build_image(&args.image_tag, &context);
    if exit_code == 0 {
        print_usage_hints(&args.image_tag, &data_dir, has_compose);
    }
    exit_code
}

/// Runs `docker build` and maps its status to an exit code.
fn build_image(tag: &str, context: &Path) -> i32 {
    let status = Command::new("docker")
        .arg("build")
        .arg("-t")
        .arg(tag)
        .arg(context)
        .status();

    match status {
        Ok(status) => status.code().unwrap_or(1),
        Err(err) => {
            eprintln!("Error: failed to run docker build: {}", err);
            1
        }
    }
}

fn print_usage_hints(tag: &str, data_dir: &Path, has_compose: bool) {
    println!();
    println!("Image {} built.", tag);
    println!();
    println!("Run a single interactive environment:");
    println!(
        "  docker run -it --rm -v {}:/data:ro {}",
        data_dir.display(),
        tag
    );
    println!();
    println!("Start the session gateway:");
    println!("  alfworld-api serve --config configs/base_config.yaml --docker-image {}", tag);
    if has_compose {
        println!();
        println!("Run parallel environments with docker-compose:");
        println!("  docker-compose up");
    }
}

/// Locates an executable on PATH, like `command -v`.
pub fn which(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Only `y` and `Y` confirm, matching the original setup script.
pub fn affirmative(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y")
}

fn prompt(question: &str) -> String {
    print!("{}", question);
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    let _ = std::io::stdin().lock().read_line(&mut answer);
    answer
}
