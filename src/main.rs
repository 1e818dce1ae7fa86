//! fnplane - function data plane tools
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use fnplane::cli::{Cli, Commands};
use fnplane::config::{Config, ConfigManager};
use fnplane::error::FnplaneResult;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> FnplaneResult<()> {
    let cli = Cli::parse();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // `config` must stay usable when the file is broken, so it can be fixed
    let (config, load_error) = match manager.load().await {
        Ok(config) => (config, None),
        Err(e) if matches!(cli.command, Commands::Config(_)) => (Config::default(), Some(e)),
        Err(e) => return Err(e),
    };

    init_logging(
        cli.verbose,
        matches!(cli.command, Commands::Builder(_)),
        config.general.log_format == "json",
    );
    if let Some(e) = load_error {
        warn!("ignoring unreadable config: {}", e);
    }

    match cli.command {
        Commands::Builder(args) => fnplane::cli::commands::builder(args, &config).await,
        Commands::Build(args) => fnplane::cli::commands::build(args).await,
        Commands::Version(args) => fnplane::cli::commands::version(args).await,
        Commands::Config(args) => fnplane::cli::commands::config(args, &config, &manager).await,
    }
}

/// 0 = warn (info for the server), 1 = info, 2+ = debug; `RUST_LOG` wins when set
fn init_logging(verbose: u8, serving: bool, json: bool) {
    let default = match (verbose, serving) {
        (0, false) => "fnplane=warn",
        (0, true) | (1, _) => "fnplane=info",
        _ => "fnplane=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        subscriber.json().init();
    } else {
        subscriber.with_target(false).init();
    }
}
