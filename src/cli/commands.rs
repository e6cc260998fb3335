use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Web API gateway for ALFWorld text environments
#[derive(Parser, Debug)]
#[command(
    name = "alfworld-api",
    about = "Web API gateway for ALFWorld text environments with Docker-backed sessions",
    version,
    long_about = "alfworld-api exposes ALFWorld TextWorld environments over HTTP. Each \
                  session is backed by an ephemeral Docker container speaking a JSON-lines \
                  protocol on stdin/stdout; concurrent step requests are coalesced into \
                  batches and idle sessions are evicted automatically."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        short = 'v',
        long,
        global = true,
        help = "Increase verbosity (debug-level logging)"
    )]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run the session gateway server",
        long_about = "Starts the HTTP server that manages Docker-backed ALFWorld sessions.\n\n\
                      Examples:\n  \
                      alfworld-api serve --config configs/base_config.yaml\n  \
                      alfworld-api serve --config configs/base_config.yaml --max-sessions 16\n  \
                      alfworld-api serve --config configs/base_config.yaml --port 9000 --batch-window-ms 0"
    )]
    Serve(ServeArgs),

    #[command(
        about = "Check host prerequisites and build the worker image",
        long_about = "Verifies that Docker is installed, checks the game data directory, and \
                      builds the ALFWorld worker image.\n\n\
                      Examples:\n  \
                      alfworld-api setup\n  \
                      alfworld-api setup --yes --image-tag alfworld-text:dev"
    )]
    Setup(SetupArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to the ALFWorld base config YAML (required)"
    )]
    pub config: PathBuf,

    #[arg(
        long,
        value_name = "IMAGE",
        default_value = "alfworld-text:latest",
        help = "Docker image for worker containers"
    )]
    pub docker_image: String,

    #[arg(
        long,
        value_name = "HOST:CONTAINER[:MODE]",
        default_value = "~/.cache/alfworld:/data:ro",
        help = "Volume mount for game data"
    )]
    pub data_volume: String,

    #[arg(
        long,
        value_name = "N",
        default_value = "64",
        help = "Maximum concurrent sessions"
    )]
    pub max_sessions: usize,

    #[arg(
        long,
        value_name = "MS",
        default_value = "50",
        help = "Batch window in milliseconds (0 disables coalescing)"
    )]
    pub batch_window_ms: u64,

    #[arg(
        long,
        value_name = "SECONDS",
        default_value = "120",
        help = "Idle session timeout in seconds"
    )]
    pub idle_timeout: u64,

    #[arg(long, default_value = "0.0.0.0", help = "Host to bind to")]
    pub host: String,

    #[arg(long, default_value = "8000", help = "Port to listen on")]
    pub port: u16,
}

#[derive(Parser, Debug, Clone)]
pub struct SetupArgs {
    #[arg(long, help = "Skip the confirmation prompt for an empty data directory")]
    pub yes: bool,

    #[arg(
        long,
        value_name = "TAG",
        default_value = "alfworld-text:latest",
        help = "Tag for the built worker image"
    )]
    pub image_tag: String,

    #[arg(
        long,
        value_name = "PATH",
        help = "Docker build context (defaults to the current directory)"
    )]
    pub context: Option<PathBuf>,
}
