//! Shared set of applications whose traffic the capture pipeline blocks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use crate::db::Database;

/// Mutable, persisted blocklist shared with the capture pipeline.
pub trait Blocklist: Send + Sync {
    /// Returns whether the app was newly added.
    fn add_app(&self, app: &str) -> bool;
    /// Returns whether the app was present. Removing an absent app is a no-op.
    fn remove_app(&self, app: &str) -> bool;
    fn contains(&self, app: &str) -> bool;
    /// Persist the in-memory set, then reload it from storage.
    fn save_and_reload(&self) -> Result<()>;
}

/// Blocklist kept in memory and persisted to SQLite.
#[derive(Debug)]
pub struct SqliteBlocklist {
    apps: Mutex<HashSet<String>>,
    database: Arc<Database>,
}

impl SqliteBlocklist {
    /// Load the persisted blocklist.
    pub fn load(database: Arc<Database>) -> Result<Self> {
        let apps: HashSet<String> = database.load_blocked_apps()?.into_iter().collect();
        tracing::info!("Loaded blocklist with {} apps", apps.len());
        Ok(Self {
            apps: Mutex::new(apps),
            database,
        })
    }

    /// Sorted copy of the blocked applications.
    pub fn apps(&self) -> Vec<String> {
        let mut apps: Vec<String> = self.lock().iter().cloned().collect();
        apps.sort();
        apps
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // A panic while holding the lock cannot leave the set half-updated.
        self.apps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn reload(&self, apps: &mut HashSet<String>) -> Result<()> {
        *apps = self.database.load_blocked_apps()?.into_iter().collect();
        Ok(())
    }
}

impl Blocklist for SqliteBlocklist {
    fn add_app(&self, app: &str) -> bool {
        self.lock().insert(app.to_string())
    }

    fn remove_app(&self, app: &str) -> bool {
        self.lock().remove(app)
    }

    fn contains(&self, app: &str) -> bool {
        self.lock().contains(app)
    }

    fn save_and_reload(&self) -> Result<()> {
        let mut apps = self.lock();
        let saved = self
            .database
            .replace_blocked_apps(apps.iter().map(String::as_str));

        if let Err(e) = saved {
            tracing::warn!("Blocklist save failed, restoring persisted state: {e:#}");
            if let Err(reload_err) = self.reload(&mut apps) {
                return Err(anyhow!(
                    "blocklist save failed ({e:#}); reload also failed: {reload_err:#}"
                ));
            }
            return Err(e.context("failed to save blocklist"));
        }

        self.reload(&mut apps)?;
        tracing::debug!("Blocklist saved ({} apps)", apps.len());
        Ok(())
    }
}
