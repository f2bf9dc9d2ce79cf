//! Tracing setup for the CLI.
//!
//! Warnings go to stderr so they don't fight with the progress line; the
//! daily log file in the platform log directory gets `info` and up.
//! `RUST_LOG` overrides both.

use subforge_common::logging::{ensure_log_dir, CLI_LOG_PREFIX};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber. Keep the guard alive until exit so the
/// file writer flushes.
pub fn init(verbose: bool) -> Option<WorkerGuard> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter(if verbose { "debug" } else { "warn" }));

    let file_appender = ensure_log_dir().ok().and_then(|dir| {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(CLI_LOG_PREFIX)
            .filename_suffix("log")
            .build(dir)
            .ok()
    });

    let (file, guard) = match file_appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter(if verbose { "debug" } else { "info" }));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // A second init (tests) is not an error worth reporting
    let _ = tracing_subscriber::registry().with(console).with(file).try_init();
    guard
}
