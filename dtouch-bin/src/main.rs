mod error;
mod logger;
mod settings;
mod sink;

use clap::Parser;
use dtouch_driver::{DTouchDriver, DTouchSupervisor, Device};
use dtouch_sdk::{ConnectionState, Publisher};
use error::{AppError, AppResult};
use logger::{parse_level, Logger};
use settings::{Output, Settings, DEFAULT_CONFIG_FILE_NAME};
use sink::{JsonLinesPublisher, LogPublisher};
use std::{env::current_dir, path::PathBuf, sync::Arc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// dTouch gateway - polls a Logica dTouch kiln controller
///
/// Reads temperature, moisture content, equilibrium moisture content, probe
/// values and actuator levels over the controller's serial protocol and
/// publishes them once per poll cycle.
#[derive(Parser)]
#[command(name = "dtouch-gateway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "dTouch gateway", long_about = None)]
struct Cli {
    /// Sets a custom config file with full path
    ///
    /// If not specified, the gateway will look for 'dtouch.toml'
    /// in the current working directory.
    #[arg(short, long, env = "DTOUCH_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `log.level` from the settings file
    #[arg(short, long, env = "DTOUCH_LOG_LEVEL")]
    log_level: Option<String>,
}

fn build_publisher(output: &Output) -> AppResult<Arc<dyn Publisher>> {
    let publisher: Arc<dyn Publisher> = match output {
        Output::Log => Arc::new(LogPublisher),
        Output::Json { path: None } => Arc::new(JsonLinesPublisher::stdout()),
        Output::Json { path: Some(path) } => Arc::new(JsonLinesPublisher::file(path)?),
    };
    Ok(publisher)
}

/// `kill -HUP` re-reads `log.level` from the settings file.
#[cfg(unix)]
fn reload_level_on_hangup(logger: Arc<Logger>, config_path: PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGHUP, log level is fixed");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            match logger.reload_level(&config_path.to_string_lossy()) {
                Ok((previous, level)) => {
                    tracing::info!(%previous, %level, "Log level reloaded")
                }
                Err(e) => tracing::warn!(error = %e, "Failed to reload log level"),
            }
        }
    });
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(p) => p,
        None => {
            let dir = current_dir()
                .map_err(|e| AppError::from(format!("Failed to get current directory: {e}")))?;
            dir.join(DEFAULT_CONFIG_FILE_NAME)
        }
    };
    let settings = Settings::new(&config_path.to_string_lossy())?;

    let level = parse_level(cli.log_level.as_deref().unwrap_or(&settings.log.level))?;
    let mut logger = Logger::new(Some(level), &settings.log.directory, &settings.log.file_name);
    logger.initialize()?;
    let logger = Arc::new(logger);
    #[cfg(unix)]
    reload_level_on_hangup(Arc::clone(&logger), config_path.clone());

    tracing::info!(
        config = %config_path.display(),
        connection = %settings.connection,
        "Starting dTouch gateway"
    );

    let device = Device::from_config(&settings.device)?;
    device.log_summary();

    let publisher = build_publisher(&settings.output)?;
    let driver = Arc::new(DTouchDriver::new(device, publisher));

    let cancel = CancellationToken::new();
    let (state_tx, mut state_rx) = watch::channel(ConnectionState::Disconnected);
    let supervisor = DTouchSupervisor::new(
        settings.connection.clone(),
        settings.retry,
        cancel.clone(),
        state_tx,
    );

    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            match state {
                ConnectionState::Failed(reason) => {
                    tracing::debug!(reason = %reason, "Connection state: Failed")
                }
                other => tracing::debug!(state = ?other, "Connection state changed"),
            }
        }
    });

    let shutdown = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown requested"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
            }
            cancel.cancel();
        })
    };

    let result = tokio::spawn(supervisor.run(Arc::clone(&driver))).await?;
    shutdown.abort();

    let health = driver.health();
    tracing::info!(
        status = ?health.status,
        cycles = health.cycles,
        failed_cycles = health.failed_cycles,
        published = driver.stats().published(),
        publish_errors = driver.stats().publish_errors(),
        "dTouch gateway stopped"
    );

    result.map_err(AppError::from)
}
