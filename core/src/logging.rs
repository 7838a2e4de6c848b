// Subscriber setup for the binary. The library itself only emits events.

use crate::config::LoggingSettings;
use crate::{WipeError, WipeResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Rolling log file name prefix
pub const LOG_FILE_PREFIX: &str = "freewipe.log";

/// Parse filter directives such as `info` or `freewipe=debug,warn`.
pub fn parse_filter(directives: &str) -> WipeResult<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| WipeError::InvalidConfig(format!("invalid log filter '{}': {}", directives, e)))
}

/// `RUST_LOG` when set and valid, otherwise the configured level.
pub fn build_filter(level: &str) -> WipeResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => parse_filter(level),
    }
}

/// Install the global subscriber.
///
/// Events go to stderr (plain or JSON) and, when a directory is configured,
/// to a daily-rolling JSON file. The returned guard must be kept alive for
/// the file writer to flush.
pub fn init_tracing(settings: &LoggingSettings) -> WipeResult<Option<WorkerGuard>> {
    let filter = build_filter(&settings.level)?;

    let stderr_layer = if settings.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match &settings.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| WipeError::InvalidConfig(format!("logging already initialized: {}", e)))?;

    Ok(guard)
}
