//! Tracing setup: a compact stdout layer plus an optional append-only log file.
//!
//! The file target comes from [`crate::config::Config::log_file`] (falling back to
//! `logs/ingestd.log`), so log routing is configured the same way as everything else
//! in this service. File writes go through a non-blocking writer whose guard is held
//! for the process lifetime; if the file cannot be opened the service simply runs
//! with stdout logging only.

use crate::config::get_config;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_PATH: &str = "logs/ingestd.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the tracing subscribers. Call after `init_config`.
///
/// `RUST_LOG` controls filtering and defaults to `info`. The stdout layer is always
/// present; the file layer is added only when the log file opens successfully.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let base = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact());

    match file_writer(get_config().log_file.as_deref()) {
        Some(writer) => base
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact(),
            )
            .init(),
        None => base.init(),
    }
}

/// Open the configured (or default) log file for appending, creating missing parent
/// directories, and wrap it in a non-blocking writer.
fn file_writer(configured: Option<&str>) -> Option<NonBlocking> {
    let path = configured.map_or_else(|| PathBuf::from(DEFAULT_LOG_PATH), PathBuf::from);

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            // Tracing is not installed yet; stderr is all we have.
            eprintln!("cannot create log directory {}: {err}", parent.display());
            return None;
        }
    }

    let file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("cannot open log file {}: {err}", path.display());
            return None;
        }
    };

    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = FILE_GUARD.set(guard);
    Some(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_writer_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/service.log");
        let writer = file_writer(Some(path.to_str().unwrap()));
        assert!(writer.is_some());
        assert!(path.exists());
    }

    #[test]
    fn unwritable_targets_disable_the_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        // A directory path cannot be opened as a file.
        let writer = file_writer(Some(dir.path().to_str().unwrap()));
        assert!(writer.is_none());
    }
}
