use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::models::RawIssue;

const SCHEMA_VERSION: i32 = 1;

/// Local cache of every issue fetched for one repository.
///
/// Each row keeps the raw tracker record as JSON; `position` preserves the
/// order of the collection.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cache at {}", path.display()))?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("Failed to read cache schema version")?;

        if version > SCHEMA_VERSION {
            tracing::warn!(
                version,
                supported = SCHEMA_VERSION,
                "cache was written by a newer ghantt; reading known columns only"
            );
        }

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS issues (
                    position INTEGER NOT NULL,
                    number INTEGER PRIMARY KEY,
                    state TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    data TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_issues_position ON issues(position);
                "#,
            )?;

            self.conn
                .execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        }

        Ok(())
    }

    /// The whole collection, in stored order.
    pub fn load_issues(&self) -> Result<Vec<RawIssue>> {
        let mut stmt = self
            .conn
            .prepare("SELECT number, data FROM issues ORDER BY position")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(number, data)| {
                serde_json::from_str(&data)
                    .with_context(|| format!("Corrupt cache entry for issue #{}", number))
            })
            .collect()
    }

    /// Overwrite the stored collection with `issues`, in one transaction.
    pub fn replace_issues(&mut self, issues: &[RawIssue]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM issues", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO issues (position, number, state, created_at, updated_at, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, issue) in issues.iter().enumerate() {
                let data = serde_json::to_string(issue)?;
                stmt.execute(params![
                    position as i64,
                    issue.number as i64,
                    issue.state.to_string(),
                    issue.created_at.to_rfc3339(),
                    issue.updated_at.to_rfc3339(),
                    data,
                ])
                .with_context(|| format!("Failed to store issue #{}", issue.number))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn set_last_synced(&self, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('last_synced_at', ?1)",
            params![at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn last_synced(&self) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'last_synced_at'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }))
    }
}

/// Load the cached collection, treating a missing cache as empty.
pub fn load_collection(path: &Path) -> Result<Vec<RawIssue>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no cache yet");
        return Ok(Vec::new());
    }
    Database::open(path)?.load_issues()
}

/// When the cache at `path` was last written by a sync, if ever.
pub fn last_synced_at(path: &Path) -> Result<Option<DateTime<Utc>>> {
    if !path.exists() {
        return Ok(None);
    }
    Database::open(path)?.last_synced()
}
