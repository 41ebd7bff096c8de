use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;

const LOG_FILE_NAME: &str = "session-gate.log";

/// Set up application logging based on configuration.
///
/// The returned guard must be kept alive for file output to be flushed.
pub fn setup_logging(
    config: &Config,
    log_to_file: bool,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    // RUST_LOG wins over the configured level
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    if !log_to_file && config.log_file_path().is_none() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(None);
    }

    let (file_writer, guard) = create_file_logger(config.log_file_path())?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(file_writer)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(Some(guard))
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("session-gate")
        .join("logs")
}

// Custom paths get a plain appender, the default location rotates daily
fn create_file_logger(
    log_file_path: &Option<String>,
) -> Result<(NonBlocking, WorkerGuard), std::io::Error> {
    if let Some(path) = log_file_path {
        let log_path = PathBuf::from(path);
        let log_dir = log_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(default_log_dir);
        std::fs::create_dir_all(&log_dir)?;

        let log_file_name = log_path
            .file_name()
            .unwrap_or(std::ffi::OsStr::new(LOG_FILE_NAME));

        let file_appender = tracing_appender::rolling::never(&log_dir, log_file_name);
        Ok(tracing_appender::non_blocking(file_appender))
    } else {
        let log_dir = default_log_dir();
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
        Ok(tracing_appender::non_blocking(file_appender))
    }
}
