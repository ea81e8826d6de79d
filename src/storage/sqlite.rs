//! SQLite document store implementation.
//!
//! Provides persistent storage using SQLite database. Every write draws a
//! fresh version from the collection's sequence inside the same transaction
//! that checks the expected version.
//!
//! Several processes may share one database file. Each write transaction
//! starts with a write, so it takes SQLite's write lock before reading
//! anything and concurrent writers queue on the busy timeout instead of
//! failing a lock upgrade. A write that still finds the database busy is
//! reported as a version conflict: the caller lost the race.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::{DeleteOutcome, DocVersion, Document, DocumentStore, StorageError};

const PRIMARY_TERM: i64 = 1;

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Primary result codes `SQLITE_BUSY` and `SQLITE_LOCKED`.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// SQLite document store backend.
///
/// Provides persistent storage with automatic schema migration.
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Create a new SQLite store with the given database path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| StorageError::Other(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Other(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_document_store.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn begin(&self) -> Result<Transaction<'_, Sqlite>, StorageError> {
        self.pool.begin().await.map_err(db_error)
    }
}

fn is_busy(e: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = e else {
        return false;
    };
    // Extended result codes carry the primary code in the low byte.
    db.code()
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

fn db_error(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Unavailable(e.to_string())
        }
        ref busy if is_busy(busy) => StorageError::Unavailable(e.to_string()),
        other => StorageError::Other(other.to_string()),
    }
}

/// Error mapping for writes to `collection/id`: a busy database means
/// another writer got there first.
fn write_error(collection: &str, id: &str) -> impl Fn(sqlx::Error) -> StorageError + use<> {
    let collection = collection.to_string();
    let id = id.to_string();
    move |e| {
        if is_busy(&e) {
            StorageError::conflict(&collection, &id)
        } else {
            db_error(e)
        }
    }
}

/// Draw the next version for a write to `collection`.
async fn next_version(
    conn: &mut SqliteConnection,
    collection: &str,
    on_error: impl Fn(sqlx::Error) -> StorageError,
) -> Result<DocVersion, StorageError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "UPDATE collections SET next_seq = next_seq + 1 WHERE name = ? RETURNING next_seq",
    )
    .bind(collection)
    .fetch_optional(&mut *conn)
    .await
    .map_err(on_error)?;

    let (next,) = row.ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
    Ok(DocVersion::new(next - 1, PRIMARY_TERM))
}

async fn require_collection(
    conn: &mut SqliteConnection,
    collection: &str,
) -> Result<(), StorageError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT name FROM collections WHERE name = ?")
        .bind(collection)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    match row {
        Some(_) => Ok(()),
        None => Err(StorageError::CollectionNotFound(collection.to_string())),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn collection_exists(&self, name: &str) -> Result<bool, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.is_some())
    }

    async fn create_collection(&self, name: &str, schema: &Value) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "INSERT INTO collections (name, schema) VALUES (?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(schema.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<DocVersion, StorageError> {
        let conflict = write_error(collection, id);
        let mut tx = self.begin().await?;
        let version = next_version(&mut tx, collection, &conflict).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, seq_no, primary_term)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(body.to_string())
        .bind(version.seq_no())
        .bind(version.primary_term())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StorageError::conflict(collection, id));
            }
            Err(e) => return Err(conflict(e)),
        }

        tx.commit().await.map_err(conflict)?;
        Ok(version)
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        require_collection(&mut conn, collection).await?;

        let row: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT body, seq_no, primary_term FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;

        row.map(|(body, seq_no, primary_term)| {
            Ok(Document {
                id: id.to_string(),
                body: serde_json::from_str(&body)?,
                version: DocVersion::new(seq_no, primary_term),
            })
        })
        .transpose()
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected: DocVersion,
    ) -> Result<DocVersion, StorageError> {
        let conflict = write_error(collection, id);
        let mut tx = self.begin().await?;
        // Must write before reading so the write lock is held for the check.
        let version = next_version(&mut tx, collection, &conflict).await?;

        let current: Option<(i64, i64)> = sqlx::query_as(
            "SELECT seq_no, primary_term FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(&conflict)?;

        match current {
            None => return Err(StorageError::NotFound(format!("{}/{}", collection, id))),
            Some((seq_no, primary_term)) if DocVersion::new(seq_no, primary_term) != expected => {
                return Err(StorageError::conflict(collection, id));
            }
            Some(_) => {}
        }

        let result = sqlx::query(
            r#"
            UPDATE documents SET body = ?, seq_no = ?, primary_term = ?
            WHERE collection = ? AND id = ? AND seq_no = ? AND primary_term = ?
            "#,
        )
        .bind(body.to_string())
        .bind(version.seq_no())
        .bind(version.primary_term())
        .bind(collection)
        .bind(id)
        .bind(expected.seq_no())
        .bind(expected.primary_term())
        .execute(&mut *tx)
        .await
        .map_err(&conflict)?;
        if result.rows_affected() != 1 {
            return Err(StorageError::conflict(collection, id));
        }

        tx.commit().await.map_err(conflict)?;
        Ok(version)
    }

    async fn delete_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<DeleteOutcome, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        require_collection(&mut conn, collection).await?;

        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;

        Ok(if result.rows_affected() > 0 {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }
}
