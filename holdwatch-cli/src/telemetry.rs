use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Logging options collected from the command line.
#[derive(Clone, Debug, Default)]
pub struct TelemetryOptions<'a> {
    /// Directive used when `RUST_LOG` is unset, e.g. `info` or `holdwatch_data=debug`.
    pub level: &'a str,
    pub json: bool,
    pub log_dir: Option<&'a Path>,
}

/// Installs the global subscriber. Console output goes to stderr so stdout stays machine
/// readable; the returned guard flushes the file writer and must outlive the run.
pub fn init_tracing(options: TelemetryOptions<'_>) -> Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(options.level))
            .map_err(|err| anyhow!("invalid log filter '{}': {err}", options.level))
    };

    let console = if options.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter()?)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter()?)
            .boxed()
    };

    let (file, guard) = match options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "holdwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter()?)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;
    Ok(guard)
}
