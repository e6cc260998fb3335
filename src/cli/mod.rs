pub mod commands;

pub use commands::{CliArgs, Commands, ServeArgs, SetupArgs};
