use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pr-dash",
    version,
    about = "Dashboard of the open Bitbucket pull requests you author or review"
)]
pub struct Cli {
    /// Config file (default: <config dir>/pr-dash/config.toml).
    /// A sample is written there when it does not exist.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SQLite file holding ignores and acknowledged changes
    /// (default: state.db next to the config file).
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Log file (default: pr-dash.log next to the config file).
    /// Verbosity follows RUST_LOG.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Parse CLI arguments.
pub fn parse_args() -> Cli {
    Cli::parse()
}
