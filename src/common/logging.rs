//! Logging and tracing configuration
//!
//! Stdout usually carries the protocol itself, so log output never goes
//! there: it is written to stderr and, optionally, to a log file.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

/// Default filter when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "dap_session=info,warn";

/// Initialize tracing for an adapter process
///
/// Logs go to stderr and, when `log_file` is given, to that file through a
/// non-blocking writer. The returned guard must be kept alive for the file
/// writer to flush.
pub fn init(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file = log_file.and_then(|path| {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: Could not open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    match file {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .compact(),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .compact(),
                )
                .init();
            None
        }
    }
}

/// Default location for the adapter log file
pub fn default_log_path() -> Option<PathBuf> {
    paths::log_dir().map(|d| d.join("adapter.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("adapter.log");

        let guard = init(Some(&path));
        assert!(guard.is_some());
        tracing::info!("logging initialized");
        drop(guard);

        assert!(path.exists());
    }
}
