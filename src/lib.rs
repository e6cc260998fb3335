//! alfworld-api - Web API gateway for ALFWorld text environments
//!
//! This library fronts a pool of ephemeral Docker containers, each running an
//! ALFWorld TextWorld worker that speaks a JSON-lines protocol on
//! stdin/stdout. Clients interact with plain HTTP: create a session, step it
//! with text actions, read observations and admissible commands, delete it.
//!
//! # Core Concepts
//!
//! - **Session**: one interactive episode, backed by exactly one container.
//!   Sessions are bounded by `--max-sessions` and evicted after
//!   `--idle-timeout` seconds without a step.
//! - **Worker transport**: the seam between session bookkeeping and container
//!   I/O. The production transport drives Docker via bollard; tests swap in a
//!   scripted in-process transport.
//! - **Batch coordinator**: concurrent step requests landing within
//!   `--batch-window-ms` of each other are collected and flushed as one batch,
//!   one container exchange per request.
//!
//! # Example Usage
//!
//! ```ignore
//! use alfworld_api::config::ServerConfig;
//!
//! async fn serve(config: ServerConfig) -> anyhow::Result<()> {
//!     alfworld_api::server::run(config).await
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`session`]: session lifecycle and the container pool
//! - [`batcher`]: step-request coalescing
//! - [`worker`]: the JSON-lines worker protocol and Docker transport
//! - [`routes`]: the HTTP surface
//! - [`setup`]: host preflight and image build

pub mod batcher;
pub mod cli;
pub mod config;
pub mod error;
pub mod games;
pub mod models;
pub mod routes;
pub mod server;
pub mod session;
pub mod setup;
pub mod util;
pub mod worker;

pub use config::ServerConfig;
pub use error::ApiError;
pub use session::SessionManager;

/// Crate version string, exposed for logging and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
