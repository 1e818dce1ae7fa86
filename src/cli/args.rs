//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// fnplane - function data plane tools
///
/// Serves the package builder and submits builds to it.
#[derive(Parser, Debug)]
#[command(name = "fnplane")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FNPLANE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the package builder over HTTP
    Builder(BuilderArgs),

    /// Submit a build to a running builder
    Build(BuildArgs),

    /// Show version and build information
    Version(VersionArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the builder command
#[derive(Parser, Debug)]
pub struct BuilderArgs {
    /// Shared volume holding source packages and artifacts (created if missing)
    pub shared_volume: PathBuf,

    /// Port to listen on [default: builder.port]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind [default: builder.bind]
    #[arg(long)]
    pub bind: Option<String>,

    /// Command run when a request names none [default: builder.default_command]
    #[arg(long)]
    pub default_command: Option<String>,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Source package name, relative to the builder's shared volume
    pub src_pkg: String,

    /// Builder base URL
    #[arg(long, env = "FNPLANE_BUILDER_URL", default_value = "http://127.0.0.1:8000")]
    pub url: String,

    /// Build command to run instead of the builder's default
    #[arg(long)]
    pub command: Option<String>,

    /// Give up after this many seconds (0 = wait forever)
    #[arg(long, default_value = "0")]
    pub timeout: u64,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the version command
#[derive(Parser, Debug)]
pub struct VersionArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., builder.port)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for commands that print results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Table,
    /// JSON output
    Json,
}
