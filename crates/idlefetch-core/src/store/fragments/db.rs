//! SQLite fragment table.
//!
//! Handles connection, migrations and the per-key record operations used by
//! [`super::FragmentStore`].

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::store::StoreError;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the fragment table. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct FragmentDb {
    pool: Pool<Sqlite>,
}

impl FragmentDb {
    /// Open (or create) the database at `path`, creating parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let db = FragmentDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fragments (
                resource_key TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                data BLOB NOT NULL,
                written_at INTEGER NOT NULL,
                PRIMARY KEY (resource_key, start_offset)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Store one record; a record already at `(key, start)` is replaced.
    pub async fn put_fragment(&self, key: &str, start: u64, data: &[u8]) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO fragments (resource_key, start_offset, data, written_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(key)
        .bind(start as i64)
        .bind(data)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `(start, length)` of every record for `key`, ordered by start.
    pub async fn list_spans(&self, key: &str) -> Result<Vec<(u64, u64)>, sqlx::Error> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT start_offset, length(data) FROM fragments
            WHERE resource_key = ?1
            ORDER BY start_offset ASC
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(start, len)| (start.max(0) as u64, len.max(0) as u64))
            .collect())
    }

    pub async fn fragment_data(&self, key: &str, start: u64) -> Result<Option<Vec<u8>>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT data FROM fragments
            WHERE resource_key = ?1 AND start_offset = ?2
            "#,
        )
        .bind(key)
        .bind(start as i64)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete records for `key` starting at or after `offset`. Returns the number removed.
    pub async fn delete_from(&self, key: &str, offset: u64) -> Result<u64, sqlx::Error> {
        let done = sqlx::query("DELETE FROM fragments WHERE resource_key = ?1 AND start_offset >= ?2")
            .bind(key)
            .bind(offset as i64)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// Delete every record for `key`. Returns the number removed.
    pub async fn purge(&self, key: &str) -> Result<u64, sqlx::Error> {
        let done = sqlx::query("DELETE FROM fragments WHERE resource_key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
/// Open an in-memory database for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<FragmentDb, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let db = FragmentDb { pool };
    db.migrate().await?;
    Ok(db)
}
