use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pr_dash::app::Dashboard;
use pr_dash::bitbucket::BitbucketClient;
use pr_dash::cli;
use pr_dash::config::Config;
use pr_dash::state::{PersistedState, StateStore, StateWriter};
use pr_dash::tui::{EffectRunner, run_tui};

fn main() -> Result<()> {
    let args = cli::parse_args();

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let log_path = args
        .log_file
        .unwrap_or_else(|| base_dir.join("pr-dash.log"));
    init_logging(&log_path)?;

    if !config_path.exists() {
        Config::write_sample(&config_path)
            .with_context(|| format!("Failed to create {}", config_path.display()))?;
        println!("Welcome to pr-dash, a command-line pull requests dashboard!");
        println!();
        println!("To get started, please open the following file:");
        println!("  {}", config_path.display());
        println!("and complete your configuration.");
        process::exit(1);
    }

    let config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    let client = match runtime.block_on(BitbucketClient::connect(&config.bitbucket)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("✗ Could not connect to Bitbucket API: {}", e);
            eprintln!("  Make sure that the credentials in {}", config_path.display());
            eprintln!("  are valid and have the permissions 'account' and 'pullrequest'.");
            process::exit(1);
        }
    };
    info!(
        repositories = config.bitbucket.repositories.len(),
        "connected to Bitbucket"
    );

    let state_path = args.state.unwrap_or_else(|| base_dir.join("state.db"));
    let (restored, writer) = open_state(&state_path);

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let dashboard = Dashboard::new(restored, config.update_interval(), Instant::now());
    let runner = EffectRunner::new(
        runtime.handle().clone(),
        Arc::new(client),
        events_tx,
        writer,
        config.local_repository_paths,
    );

    let result = run_tui(dashboard, runner, events_rx);
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

/// Send logs to a file; the terminal belongs to the dashboard.
fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .init();

    Ok(())
}

/// Open the state database. An unusable store just means starting empty.
fn open_state(path: &Path) -> (PersistedState, Option<StateWriter>) {
    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!(error = %e, "could not create state directory");
    }

    let store = match StateStore::open_or_reset(path) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "state unavailable, persistence disabled");
            return (PersistedState::default(), None);
        }
    };

    let restored = store.load().unwrap_or_else(|e| {
        warn!(error = %e, "could not read state, starting empty");
        PersistedState::default()
    });

    (restored, Some(StateWriter::spawn(store)))
}
