use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE: &str = "client-registry.log";

/// Send logs to a file, the terminal belongs to the UI
///
/// Keep the returned guard alive until exit so buffered lines get flushed.
pub fn init(log_dir: &str) -> Result<WorkerGuard> {
    let appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(guard)
}
