//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding the log filter directive.
pub const LOG_ENV_VAR: &str = "ABUDDY_LOG";

const LOG_FILE_NAME: &str = "abuddy.log";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/android-buddy/logs/`.
/// Log level is controlled by the `ABUDDY_LOG` environment variable.
/// With `verbose` set, logs are also mirrored to stderr.
///
/// # Examples
/// ```bash
/// ABUDDY_LOG=debug abuddy devices
/// ABUDDY_LOG=buddy_adb=trace abuddy pull R5CT638F8ST /sdcard/x.iso .
/// ```
pub fn init(verbose: bool) -> Result<()> {
    let log_dir = get_log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    // Default to info for our crates, allow override via ABUDDY_LOG
    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("android_buddy=debug,buddy_app=debug,buddy_adb=debug,warn")
        } else {
            EnvFilter::new("android_buddy=info,buddy_app=info,buddy_adb=info,warn")
        }
    });

    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .with(stderr_layer)
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Android Buddy starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("android-buddy").join("logs")
}
