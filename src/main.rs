//! # RC Link
//!
//! Runs one end of the RC control link on a Linux host: the transmitter
//! (sticks, switches and the calibration page) or the receiver (servo and
//! ESC outputs, battery reporting).
//!
//! # Usage
//!
//! ```bash
//! rc-link [config.toml]
//! ```
//!
//! The role, radio bridge, sysfs paths and settings file all come from the
//! configuration; without an argument `config/default.toml` is used.

use anyhow::{Context, Result};
use tokio::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use rc_link::calibration::CalibrationEngine;
use rc_link::config::{Config, LoggingConfig, Role};
use rc_link::hardware::sysfs::{SysfsBattery, SysfsInputs, SysfsPwm};
use rc_link::hardware::SystemClock;
use rc_link::link::{ReceiverSession, TransmitterSession};
use rc_link::runtime::{self, TransmitterNode};
use rc_link::serial::SerialRadio;
use rc_link::settings::{CalibrationStore, FileStorage, LoadOutcome};
use rc_link::telemetry::TelemetryLogger;

/// Configuration used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Base name of the rolling log files
const LOG_FILE_NAME: &str = "rc-link.log";

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes the
/// file writer and must live until exit.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match &logging.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);

    info!(
        "RC Link v{} starting as {:?}",
        env!("CARGO_PKG_VERSION"),
        config.link.role
    );

    let mut radio = SerialRadio::open_with_paths(
        config.radio.ports.as_slice(),
        config.radio.baud_rate,
        Duration::from_millis(config.radio.timeout_ms),
    )
    .context("Failed to open radio bridge")?;
    info!("Radio bridge opened at: {}", radio.device_path());

    let mut storage = FileStorage::new(&config.storage.settings_path);
    let (store, outcome) = CalibrationStore::open(&mut storage);
    match outcome {
        LoadOutcome::Loaded => info!("Loaded calibration from {}", storage.path().display()),
        LoadOutcome::Reset => warn!("Calibration reset to factory defaults"),
    }

    let clock = SystemClock::new();
    let cycle_interval = Duration::from_millis(config.link.cycle_interval_ms);

    match config.link.role {
        Role::Transmitter => {
            let telemetry = if config.telemetry.enabled {
                Some(TelemetryLogger::new(
                    &config.telemetry.log_dir,
                    config.telemetry.max_records_per_file,
                    config.telemetry.max_files_to_keep,
                )?)
            } else {
                None
            };

            let mut node = TransmitterNode::new(
                TransmitterSession::new(config.transmitter_config(), config.estimator()),
                CalibrationEngine::new(config.engine_config()),
                store,
                config.inputs.button,
                telemetry,
            );
            node.sync_remote();

            let mut inputs = SysfsInputs::new(
                config.inputs.analog.clone(),
                config.inputs.digital.clone(),
                config.inputs.active_low,
            );

            info!("Press Ctrl+C to exit");
            runtime::run_transmitter(
                &mut node,
                &mut radio,
                &clock,
                &mut inputs,
                &mut storage,
                cycle_interval,
                shutdown_signal(),
            )
            .await;
        }
        Role::Receiver => {
            let mut session = ReceiverSession::new(
                config.receiver_config(),
                config.estimator(),
                store,
                storage,
            );
            let mut outputs = SysfsPwm::new(config.outputs.pwm_channels.clone());
            let mut battery = SysfsBattery::new(config.battery.path.clone().into(), config.battery.scale);

            info!("Press Ctrl+C to exit");
            runtime::run_receiver(
                &mut session,
                &mut radio,
                &clock,
                &mut outputs,
                &mut battery,
                cycle_interval,
                shutdown_signal(),
            )
            .await;
        }
    }

    Ok(())
}
