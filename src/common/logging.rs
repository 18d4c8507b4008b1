use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use super::config::Config;

/// Install the global tracing subscriber.
///
/// Stderr logging is on with `--verbose` or when `RUST_LOG` is set. With
/// `log_file`, events also go to a daily rolling file under
/// `~/.nuget-sweep/logs`; keep the returned guard alive until exit so
/// buffered lines are flushed.
pub fn init(verbose: bool, log_file: bool) -> Result<Option<WorkerGuard>> {
    let env_filter = std::env::var("RUST_LOG").ok();
    let filter = if verbose {
        EnvFilter::new("nuget_sweep=debug")
    } else {
        env_filter
            .as_deref()
            .map(EnvFilter::new)
            .unwrap_or_else(|| EnvFilter::new("nuget_sweep=info"))
    };

    let stderr_layer = (verbose || env_filter.is_some())
        .then(|| fmt::layer().with_writer(std::io::stderr).with_target(false));

    let (file_layer, guard) = if log_file {
        let dir = Config::logs_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create logs dir: {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(&dir, "nuget-sweep.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    if stderr_layer.is_none() && file_layer.is_none() {
        return Ok(None);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
