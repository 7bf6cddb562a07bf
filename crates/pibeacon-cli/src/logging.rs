//! Logging initialization.
//!
//! Stdout always gets a compact layer. When the configuration file's
//! `logging.directory` is set, a daily-rolling JSON file layer is added so
//! long unattended runs keep a structured trail. Filter precedence:
//! `PIBEACON_LOG` environment variable, then the configuration file's
//! `logging.level`, then `info`.

use std::sync::OnceLock;

use pibeacon_core::LoggingSection;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer alive for the process lifetime.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the tracing subscriber from the environment and the optional
/// `logging` configuration section.
///
/// # Errors
///
/// Returns an error if the filter cannot be parsed or the log directory
/// cannot be created.
pub fn init(section: Option<&LoggingSection>) -> anyhow::Result<()> {
    let level = std::env::var("PIBEACON_LOG")
        .ok()
        .or_else(|| section.and_then(|s| s.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&level))?;

    match section.and_then(|s| s.directory.as_deref()) {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, "pibeacon");
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);

            let stdout_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(stdout_layer)
                .init();

            let _ = FILE_GUARD.set(guard);
        }
        None => {
            let stdout_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .init();
        }
    }

    Ok(())
}
