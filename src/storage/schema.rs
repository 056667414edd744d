//! Ledger schema detection and migration.
//!
//! ```text
//! Absent ──create──▶ V1
//! Unversioned ──migrate──▶ V1
//! V1 (no-op)
//! ```
//!
//! Everything runs inside one transaction so a crash mid-migration leaves
//! the legacy table untouched.

use rusqlite::{Connection, params};

use crate::error::{AppError, Result};

/// `PRAGMA user_version` written once the table is in V1 shape.
pub const CURRENT_VERSION: i64 = 1;

const CREATE_SEEN: &str = "
    CREATE TABLE seen (
        source TEXT,
        article_id TEXT,
        title TEXT,
        first_seen_ts INTEGER,
        PRIMARY KEY(source, article_id)
    )";

/// Observed shape of the `seen` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// No `seen` table yet
    Absent,
    /// Single-source table keyed by `article_id` alone
    Unversioned,
    /// Multi-source table keyed by `(source, article_id)`
    V1,
}

impl SchemaVersion {
    /// Inspect the `seen` table's columns.
    pub fn detect(conn: &Connection) -> Result<Self> {
        let columns = table_columns(conn, "seen")?;
        if columns.is_empty() {
            return Ok(Self::Absent);
        }

        let has = |name: &str| columns.iter().any(|c| c == name);
        let has_payload = has("article_id") && has("title") && has("first_seen_ts");

        match (has("source"), has_payload) {
            (true, true) => Ok(Self::V1),
            (false, true) => Ok(Self::Unversioned),
            _ => Err(AppError::migration(format!(
                "unrecognized seen table columns: [{}]",
                columns.join(", ")
            ))),
        }
    }
}

/// Bring the ledger schema to V1.
///
/// Legacy rows are copied under `legacy_source`. Returns the shape found
/// before any change was made.
pub fn initialize(conn: &mut Connection, legacy_source: &str) -> Result<SchemaVersion> {
    let tx = conn.transaction()?;
    let found = SchemaVersion::detect(&tx)?;

    match found {
        SchemaVersion::Absent => {
            tx.execute_batch(CREATE_SEEN)?;
            log::debug!("Created seen table");
        }
        SchemaVersion::Unversioned => {
            log::info!("Legacy ledger schema detected, migrating to multi-source schema");
            let migrated = migrate_unversioned(&tx, legacy_source)
                .map_err(|e| AppError::migration(e.to_string()))?;
            log::info!(
                "Ledger migration complete: {} row(s) assigned to source '{}'",
                migrated,
                legacy_source
            );
        }
        SchemaVersion::V1 => {}
    }

    tx.pragma_update(None, "user_version", CURRENT_VERSION)?;
    tx.commit()?;
    Ok(found)
}

fn migrate_unversioned(conn: &Connection, legacy_source: &str) -> rusqlite::Result<usize> {
    conn.execute_batch("ALTER TABLE seen RENAME TO seen_old")?;
    conn.execute_batch(CREATE_SEEN)?;
    let migrated = conn.execute(
        "INSERT OR IGNORE INTO seen(source, article_id, title, first_seen_ts)
         SELECT ?1, article_id, title, first_seen_ts FROM seen_old",
        params![legacy_source],
    )?;
    conn.execute_batch("DROP TABLE seen_old")?;
    Ok(migrated)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE seen (article_id TEXT PRIMARY KEY, title TEXT, first_seen_ts INTEGER);
             INSERT INTO seen VALUES ('10', 'A', 100);",
        )
        .unwrap();
        conn
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            > 0
    }

    fn user_version(conn: &Connection) -> i64 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_detect_absent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(SchemaVersion::detect(&conn).unwrap(), SchemaVersion::Absent);
    }

    #[test]
    fn test_initialize_creates_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        let found = initialize(&mut conn, "bs").unwrap();

        assert_eq!(found, SchemaVersion::Absent);
        assert_eq!(SchemaVersion::detect(&conn).unwrap(), SchemaVersion::V1);
        assert_eq!(user_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn test_migrates_legacy_rows() {
        let mut conn = legacy_conn();
        assert_eq!(
            SchemaVersion::detect(&conn).unwrap(),
            SchemaVersion::Unversioned
        );

        let found = initialize(&mut conn, "bs").unwrap();
        assert_eq!(found, SchemaVersion::Unversioned);

        let rows: Vec<(String, String, String, i64)> = conn
            .prepare("SELECT source, article_id, title, first_seen_ts FROM seen")
            .unwrap()
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();

        assert_eq!(
            rows,
            vec![("bs".to_string(), "10".to_string(), "A".to_string(), 100)]
        );
        assert!(!table_exists(&conn, "seen_old"));
        assert_eq!(user_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut conn = legacy_conn();
        initialize(&mut conn, "bs").unwrap();
        let again = initialize(&mut conn, "bs").unwrap();

        assert_eq!(again, SchemaVersion::V1);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM seen", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unrecognized_schema_fails() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE seen (url TEXT PRIMARY KEY, seen_at INTEGER)")
            .unwrap();

        let err = initialize(&mut conn, "bs").unwrap_err();
        assert!(matches!(err, AppError::Migration(_)));
        assert!(table_exists(&conn, "seen"));
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let mut conn = legacy_conn();
        // A stale table blocks the rename.
        conn.execute_batch("CREATE TABLE seen_old (x TEXT)").unwrap();

        let err = initialize(&mut conn, "bs").unwrap_err();
        assert!(matches!(err, AppError::Migration(_)));
        assert_eq!(
            SchemaVersion::detect(&conn).unwrap(),
            SchemaVersion::Unversioned
        );
    }
}
