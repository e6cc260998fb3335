use alfworld_api::cli::commands::{CliArgs, Commands};
use alfworld_api::util::logging;
use alfworld_api::VERSION;

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    logging::init_from_args(args.log_level.as_deref(), args.verbose, args.quiet);

    debug!("alfworld-api v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Serve(serve_args) => alfworld_api::server::handle_serve(serve_args).await,
        Commands::Setup(setup_args) => alfworld_api::setup::handle_setup(setup_args),
    };

    std::process::exit(exit_code);
}
