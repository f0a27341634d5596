//! Carnet CLI - main entry point.
//!
//! `carnet <CONFIG_JSON> <COMMAND> <VALUE>` logs in (reusing the persisted
//! session when possible), reads the requested vehicle state, changes it when
//! asked, and prints the resulting state as JSON on the last line of stdout.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use carnet_api::{Gateway, VehicleClient};
use carnet_cli::paths::{self, LOG_FILE, STATES_FILE};
use carnet_cli::{Car, CarStates, Cli, Config, LogLevel};
use carnet_login::{CredentialStore, HttpTransport, Session};

/// Keeps the file writer alive until the process exits so buffered lines are flushed.
struct LogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Log to stderr and, without colors, to `carnet.log` in the state directory.
fn setup_logging(state_dir: &Path, level: LogLevel) -> Result<LogGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("cannot create state directory {}", state_dir.display()))?;
    let log_path = state_dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("cannot open {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let level = level.as_filter_str();
    let filter = format!("warn,carnet={level},carnet_cli={level},carnet_api={level},carnet_login={level}");

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(LogGuard { _guard: guard })
}

fn run(cli: Cli) -> Result<()> {
    let state_dir = paths::resolve_state_dir(cli.state_dir.as_deref())?;
    let config = Config::from_arg(&cli.config)?;

    let log_level = cli
        .log_level
        .or_else(|| {
            std::env::var("CARNET_LOG_LEVEL")
                .ok()
                .and_then(|level| LogLevel::from_str_loose(&level))
        })
        .or_else(|| config.log_level())
        .unwrap_or_default();
    let _log_guard = setup_logging(&state_dir, log_level)?;
    info!(command = %cli.command, state_dir = %state_dir.display(), "Starting");

    let credentials = config.credentials()?;
    let transport = HttpTransport::new().context("cannot build HTTP client")?;
    let session = Session::new(
        credentials,
        Box::new(transport),
        CredentialStore::new(&state_dir),
    );
    let gateway = Gateway::new(session).with_market(&config.brand, &config.country);
    let mut car = Car::new(
        VehicleClient::new(gateway),
        CarStates::load(state_dir.join(STATES_FILE)),
        &config,
    );

    let outcome = car.execute(cli.command, cli.value);

    let saved = car.states().save();
    if let Err(e) = &saved {
        warn!(error = %e, "Cannot persist vehicle state");
    }
    println!("{}", serde_json::to_string(&car.state())?);

    match outcome {
        Ok(()) => saved,
        Err(e) if e.is_login() => {
            error!(error = %e, "Failed to login");
            Err(anyhow::Error::new(e).context("failed to login"))
        }
        Err(e) => {
            error!(error = %e, command = %cli.command, "Command failed");
            Err(anyhow::Error::new(e).context(format!("{} command failed", cli.command)))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}
