//! SQLite-backed chunk store using the sqlite-vec extension.
//!
//! Two tables per collection: a plain `{table}` row store keyed by chunk id,
//! and a `{table}_embeddings` vec0 virtual table joined on rowid. Embeddings
//! are bound as JSON arrays, which sqlite-vec accepts for `float[N]` columns.
//! The extension is registered process-wide exactly once.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::OnceLock;

use tokio_rusqlite::{ffi, Connection};
use tracing::debug;

use crate::stores::{ChunkRecord, VectorBackend};
use crate::types::SiteChatError;

fn register_sqlite_vec() {
    static REGISTERED: OnceLock<()> = OnceLock::new();

    REGISTERED.get_or_init(|| {
        unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit = transmute::<_, SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != ffi::SQLITE_OK {
                panic!("failed to register sqlite-vec extension (code {rc})");
            }
        }
    });
}

fn storage_err(err: impl std::fmt::Display) -> SiteChatError {
    SiteChatError::Storage(err.to_string())
}

fn validate_table_name(table: &str) -> Result<(), SiteChatError> {
    let valid = !table.is_empty()
        && table.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SiteChatError::Configuration(format!(
            "invalid collection name '{table}'"
        )))
    }
}

/// Chunk store over one SQLite database file (or `:memory:`).
#[derive(Clone)]
pub struct SqliteChunkStore {
    conn: Connection,
    table: String,
    dimensions: usize,
}

impl SqliteChunkStore {
    /// Opens (creating if needed) the store at `path`.
    pub async fn open(
        path: impl AsRef<Path>,
        table: &str,
        dimensions: usize,
    ) -> Result<Self, SiteChatError> {
        validate_table_name(table)?;
        register_sqlite_vec();
        let conn = Connection::open(path).await.map_err(storage_err)?;
        let store = Self {
            conn,
            table: table.to_string(),
            dimensions,
        };
        store.create_tables().await?;
        Ok(store)
    }

    /// Opens an in-memory store, used by tests.
    pub async fn in_memory(table: &str, dimensions: usize) -> Result<Self, SiteChatError> {
        validate_table_name(table)?;
        register_sqlite_vec();
        let conn = Connection::open_in_memory().await.map_err(storage_err)?;
        let store = Self {
            conn,
            table: table.to_string(),
            dimensions,
        };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), SiteChatError> {
        let table = self.table.clone();
        let dimensions = self.dimensions;
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "CREATE TABLE IF NOT EXISTS {table} (
                            id TEXT PRIMARY KEY,
                            url TEXT NOT NULL,
                            title TEXT NOT NULL,
                            heading TEXT NOT NULL,
                            chunk_index INTEGER NOT NULL,
                            content TEXT NOT NULL
                        )"
                    ),
                    [],
                )?;
                conn.execute(
                    &format!("CREATE INDEX IF NOT EXISTS idx_{table}_url ON {table}(url)"),
                    [],
                )?;
                conn.execute(
                    &format!(
                        "CREATE VIRTUAL TABLE IF NOT EXISTS {table}_embeddings \
                         USING vec0(embedding float[{dimensions}])"
                    ),
                    [],
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)?;
        debug!(table = %self.table, dimensions = self.dimensions, "chunk store ready");
        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorBackend for SqliteChunkStore {
    async fn insert_chunks(&self, records: &[ChunkRecord]) -> Result<(), SiteChatError> {
        // Serialize embeddings up front; a record without one is a bug in
        // the caller, not a database failure.
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let embedding = record.embedding.as_ref().ok_or_else(|| {
                SiteChatError::Storage(format!("chunk '{}' has no embedding", record.id))
            })?;
            if embedding.len() != self.dimensions {
                return Err(SiteChatError::Storage(format!(
                    "chunk '{}' embedding has {} dimensions, store expects {}",
                    record.id,
                    embedding.len(),
                    self.dimensions
                )));
            }
            let embedding_json = serde_json::to_string(embedding).map_err(storage_err)?;
            rows.push((
                record.id.clone(),
                record.url.clone(),
                record.title.clone(),
                record.heading.clone(),
                record.chunk_index as i64,
                record.content.clone(),
                embedding_json,
            ));
        }

        let table = self.table.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let insert_chunk = format!(
                    "INSERT OR REPLACE INTO {table} \
                     (id, url, title, heading, chunk_index, content) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                );
                let insert_embedding = format!(
                    "INSERT INTO {table}_embeddings (rowid, embedding) VALUES (?1, ?2)"
                );
                for (id, url, title, heading, chunk_index, content, embedding_json) in rows {
                    tx.execute(
                        &insert_chunk,
                        (&id, &url, &title, &heading, chunk_index, &content),
                    )?;
                    let rowid = tx.last_insert_rowid();
                    tx.execute(&insert_embedding, (rowid, &embedding_json))?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn search_similar(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, SiteChatError> {
        if query.len() != self.dimensions {
            return Err(SiteChatError::Storage(format!(
                "query vector has {} dimensions, store expects {}",
                query.len(),
                self.dimensions
            )));
        }
        let query_json = serde_json::to_string(query).map_err(storage_err)?;
        let table = self.table.clone();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT c.id, c.url, c.title, c.heading, c.chunk_index, c.content,
                            vec_distance_cosine(e.embedding, vec_f32(?1)) AS distance
                     FROM   {table}            AS c
                     JOIN   {table}_embeddings AS e
                            ON e.rowid = c.rowid
                     ORDER BY distance
                     LIMIT {top_k}"
                ))?;

                let rows = stmt.query_map([&query_json], |row| {
                    let record = ChunkRecord {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        title: row.get(2)?,
                        heading: row.get(3)?,
                        chunk_index: row.get::<_, i64>(4)? as usize,
                        content: row.get(5)?,
                        embedding: None,
                    };
                    let distance: f64 = row.get(6)?;
                    Ok((record, 1.0 - distance as f32))
                })?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(storage_err)
    }

    async fn count(&self) -> Result<usize, SiteChatError> {
        let table = self.table.clone();
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
                Ok(count)
            })
            .await
            .map_err(storage_err)?;
        Ok(count as usize)
    }

    async fn clear(&self) -> Result<(), SiteChatError> {
        let table = self.table.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(&format!("DELETE FROM {table}_embeddings"), [])?;
                tx.execute(&format!("DELETE FROM {table}"), [])?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }
}
