//! Connection monitoring core of a packet capture service.
//!
//! - [`core`]: connection filtering, per-app stats and payload chunking
//! - [`session`]: applies capture pipeline events to stats and payload history
//! - [`blocklist`] / [`actions`]: persisted app blocklist and the unblock action
//! - [`db`]: SQLite persistence

pub mod actions;
pub mod blocklist;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod session;

use std::path::Path;
use std::sync::{Arc, Once};

pub use actions::{BlocklistActionHandler, UnblockOutcome, UnblockRequest};
pub use blocklist::{Blocklist, SqliteBlocklist};
pub use error::AppError;
pub use session::{CaptureEvent, CaptureSession};

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`, falling back to [`config::DEFAULT_LOG_FILTER`]. Calling it
/// again after a subscriber is installed is a no-op.
pub fn init_tracing() {
    static PANIC_HOOK: Once = Once::new();
    PANIC_HOOK.call_once(|| {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!("PANIC in capture core: {info}");
            default_hook(info);
        }));
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config::DEFAULT_LOG_FILTER.into()),
        )
        .try_init();
}

/// Open the blocklist persisted in `data_dir`, creating the directory and
/// database as needed.
pub fn open_blocklist(data_dir: &Path) -> Result<Arc<SqliteBlocklist>, AppError> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(config::BLOCKLIST_DB_FILE);
    let database = Arc::new(db::Database::open(&db_path)?);
    tracing::info!("Database opened at {}", db_path.display());
    Ok(Arc::new(SqliteBlocklist::load(database)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn test_open_blocklist_persists_across_opens() {
        let dir = std::env::temp_dir().join(format!("netguard-core-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let blocklist = open_blocklist(&dir).unwrap();
        blocklist.add_app("com.example.app");
        blocklist.save_and_reload().unwrap();
        drop(blocklist);

        let reopened = open_blocklist(&dir).unwrap();
        assert!(reopened.contains("com.example.app"));
        assert!(dir.join(config::BLOCKLIST_DB_FILE).exists());

        drop(reopened);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_open_blocklist_reports_sqlite_failure_as_database_error() {
        let dir = std::env::temp_dir().join(format!("netguard-core-baddb-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        // a directory where the database file should be
        std::fs::create_dir_all(dir.join(config::BLOCKLIST_DB_FILE)).unwrap();

        let err = open_blocklist(&dir).unwrap_err();
        assert_eq!(err.kind(), "Database");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
