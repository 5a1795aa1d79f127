//! Blocked applications table.

use anyhow::Result;
use rusqlite::params;

use super::Database;

impl Database {
    /// Load all blocked application identifiers, sorted.
    pub fn load_blocked_apps(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT app FROM blocked_apps ORDER BY app")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Replace the persisted blocklist in a single transaction.
    ///
    /// On error the previous contents are left untouched.
    pub fn replace_blocked_apps<'a, I>(&self, apps: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM blocked_apps", [])?;

        let mut written = 0;
        {
            let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO blocked_apps (app) VALUES (?1)")?;
            for app in apps {
                written += stmt.execute(params![app])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }
}
