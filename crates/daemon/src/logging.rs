//! Logging setup
//!
//! Console output (pretty or JSON), optional daily rolling JSON file, optional
//! OpenTelemetry layer. RUST_LOG wins over `log.filter`.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LogSection};
use crate::telemetry;

const LOG_FILE_PREFIX: &str = "pyrunner.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the file writer flushing; drop it last
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn init(config: &LogSection) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .context("Invalid log filter")?;

    let mut layers: Vec<BoxedLayer> = Vec::new();

    layers.push(match config.format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    });

    let file_guard = match config.directory() {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    // Telemetry problems never stop the daemon
    let telemetry_error = match telemetry::layer() {
        Ok(Some(layer)) => {
            layers.push(layer);
            None
        }
        Ok(None) => None,
        Err(e) => Some(e),
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(e) = telemetry_error {
        tracing::warn!(error = ?e, "Failed to initialize OpenTelemetry (continuing without it)");
    }

    Ok(LogGuard { _file: file_guard })
}
