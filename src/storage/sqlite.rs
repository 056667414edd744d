//! SQLite ledger backend.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{AppError, Result};
use crate::models::{Article, SeenRecord};
use crate::storage::{Ledger, schema};

const INSERT_SEEN: &str = "INSERT OR IGNORE INTO seen(source, article_id, title, first_seen_ts)
     VALUES (?1, ?2, ?3, ?4)";

/// Ledger stored in a single SQLite table.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger file and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>, legacy_source: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, legacy_source)
    }

    /// In-memory ledger, used by tests and dry runs.
    pub fn in_memory(legacy_source: &str) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, legacy_source)
    }

    /// Wrap an existing connection, migrating it if needed.
    pub fn from_connection(mut conn: Connection, legacy_source: &str) -> Result<Self> {
        schema::initialize(&mut conn, legacy_source)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            AppError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    /// Record an article with an explicit first-seen timestamp.
    pub fn mark_seen_at(
        &self,
        source: &str,
        article_id: &str,
        title: &str,
        first_seen_ts: i64,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(INSERT_SEEN, params![source, article_id, title, first_seen_ts])?;
        Ok(inserted > 0)
    }

    /// Fetch a single record.
    pub fn record(&self, source: &str, article_id: &str) -> Result<Option<SeenRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT source, article_id, title, first_seen_ts
                 FROM seen WHERE source = ?1 AND article_id = ?2",
                params![source, article_id],
                |row| {
                    Ok(SeenRecord {
                        source: row.get(0)?,
                        article_id: row.get(1)?,
                        title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        first_seen_ts: row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Number of records for one source.
    pub fn count(&self, source: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM seen WHERE source = ?1",
            params![source],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Record counts grouped by source, ordered by key.
    pub fn source_counts(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT source, COUNT(*) FROM seen GROUP BY source ORDER BY source")?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}

impl Ledger for SqliteLedger {
    fn is_seen(&self, source: &str, article_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM seen WHERE source = ?1 AND article_id = ?2",
                params![source, article_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_seen(&self, source: &str, article_id: &str, title: &str) -> Result<bool> {
        self.mark_seen_at(source, article_id, title, Utc::now().timestamp())
    }

    fn mark_all_seen(&self, source: &str, articles: &[Article]) -> Result<usize> {
        let mut conn = self.conn()?;
        let now = Utc::now().timestamp();

        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(INSERT_SEEN)?;
            for article in articles {
                inserted += stmt.execute(params![source, article.article_id, article.title, now])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}
