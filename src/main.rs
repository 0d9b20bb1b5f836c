//! Tour Guide CLI entry point.

use clap::Parser;

use tour_guide::cli::commands::{self, load_config};
use tour_guide::cli::{handle_error, Cli, Commands};
use tour_guide::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // Config errors surface from the command; logging comes up either way
    let logging = load_config(config_path).ok().map(|config| config.logging);
    let _logger = match LoggerImpl::init_or_fallback(logging.as_ref()) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    let result = match &cli.command {
        Commands::Run { waypoints } => commands::run::execute(waypoints, config_path, cli.json).await,
        Commands::Demo {
            scenario,
            waypoints,
        } => commands::demo::execute(*scenario, *waypoints, config_path, cli.json).await,
        Commands::Config(command) => commands::config::execute(command, config_path, cli.json),
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
