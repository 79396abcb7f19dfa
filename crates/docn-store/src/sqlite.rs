//! SQLite-based vector store.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};
use ulid::Ulid;

use docn_core::{
    DocnError, IndexKind, Metadata, Result, ScoredEntry, VectorEntry, VectorStore,
};
use docn_vector::cosine_similarity;

use crate::schema::{SCHEMA, SCHEMA_VERSION};

/// Dimension cache value meaning "no vectors stored yet".
const UNKNOWN_DIMENSION: usize = 0;

/// SQLite-backed vector store.
///
/// Searches are exact scans over all stored vectors; only
/// [`IndexKind::Flat`] indexes can be created.
pub struct SqliteVectorStore {
    /// Connection wrapped in blocking Mutex.
    conn: Arc<Mutex<Connection>>,

    /// Cached shared dimension, or `UNKNOWN_DIMENSION`.
    dimension: AtomicUsize,
}

impl SqliteVectorStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| DocnError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DocnError::database(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| DocnError::database(format!("Failed to initialize schema: {}", e)))?;
        conn.execute(
            "INSERT OR IGNORE INTO store_meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(|e| DocnError::database(e.to_string()))?;

        let dimension: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| DocnError::database(e.to_string()))?;
        let dimension = match dimension {
            Some(value) => value
                .parse::<usize>()
                .map_err(|e| DocnError::database(format!("Corrupt dimension '{}': {}", value, e)))?,
            None => UNKNOWN_DIMENSION,
        };

        info!("Vector store opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension: AtomicUsize::new(dimension),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .map_err(|e| DocnError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().map_err(|e| DocnError::database(e.to_string()))?;
        f(&conn)
    }

    /// Number of stored vectors.
    pub fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))
                .map_err(|e| DocnError::database(e.to_string()))?;
            Ok(count as usize)
        })
    }

    /// Kind of a named index, if it exists.
    pub fn index_kind(&self, name: &str) -> Result<Option<IndexKind>> {
        let name = name.to_string();
        self.with_conn(|conn| {
            let kind: Option<String> = conn
                .query_row(
                    "SELECT kind FROM vector_indexes WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| DocnError::database(e.to_string()))?;
            kind.map(|k| k.parse()).transpose()
        })
    }

    fn known_dimension(&self) -> Option<usize> {
        match self.dimension.load(Ordering::SeqCst) {
            UNKNOWN_DIMENSION => None,
            d => Some(d),
        }
    }

    /// Check entries against each other and the stored dimension.
    fn validate(&self, entries: &[VectorEntry]) -> Result<Option<usize>> {
        let mut expected = self.known_dimension();
        for entry in entries {
            if entry.embedding.is_empty() || entry.embedding.iter().any(|v| !v.is_finite()) {
                return Err(DocnError::invalid_configuration(format!(
                    "vector {} is empty or has non-finite components",
                    entry.id
                )));
            }
            match expected {
                Some(d) if d != entry.dimension() => {
                    return Err(DocnError::DimensionMismatch {
                        expected: d,
                        actual: entry.dimension(),
                    })
                }
                _ => expected = Some(entry.dimension()),
            }
        }
        Ok(expected)
    }

    /// Upsert entries in one transaction.
    ///
    /// Validation runs under the connection lock so concurrent first writes
    /// cannot settle on different dimensions.
    fn write_entries(&self, entries: &[VectorEntry]) -> Result<usize> {
        let now = now_secs();

        self.with_conn(|conn| {
            let dimension = self.validate(entries)?;
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| DocnError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO vectors (id, embedding, dimension, metadata, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                        ON CONFLICT(id) DO UPDATE SET
                            embedding = excluded.embedding,
                            dimension = excluded.dimension,
                            metadata = excluded.metadata,
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .map_err(|e| DocnError::database(e.to_string()))?;

                for entry in entries {
                    let metadata = serde_json::to_string(&entry.metadata)?;
                    stmt.execute(params![
                        entry.id.to_string(),
                        vec_to_bytes(&entry.embedding),
                        entry.dimension() as i64,
                        metadata,
                        now,
                    ])
                    .map_err(|e| DocnError::database(format!("Failed to store vector: {}", e)))?;
                }
            }

            if let Some(d) = dimension {
                tx.execute(
                    "INSERT OR IGNORE INTO store_meta (key, value) VALUES ('dimension', ?1)",
                    params![d.to_string()],
                )
                .map_err(|e| DocnError::database(e.to_string()))?;
            }

            tx.commit().map_err(|e| DocnError::database(e.to_string()))?;

            if let Some(d) = dimension {
                self.dimension.store(d, Ordering::SeqCst);
            }
            Ok(entries.len())
        })
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, Vec<u8>, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn decode_entry(id: String, blob: Vec<u8>, metadata: String) -> Result<VectorEntry> {
        let id = Ulid::from_string(&id)
            .map_err(|e| DocnError::database(format!("Corrupt vector id '{}': {}", id, e)))?;
        let embedding = bytes_to_vec(&blob)?;
        let metadata: Metadata = serde_json::from_str(&metadata)?;
        Ok(VectorEntry {
            id,
            embedding,
            metadata,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn store_vector(&self, entry: VectorEntry) -> Result<()> {
        self.write_entries(std::slice::from_ref(&entry))?;
        debug!("Stored vector: {}", entry.id);
        Ok(())
    }

    async fn get_vector(&self, id: Ulid) -> Result<Option<VectorEntry>> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, embedding, metadata FROM vectors WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_entry,
            )
            .optional()
            .map_err(|e| DocnError::database(e.to_string()))
        })?;

        row.map(|(id, blob, metadata)| Self::decode_entry(id, blob, metadata))
            .transpose()
    }

    async fn delete_vector(&self, id: Ulid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM vectors WHERE id = ?1", params![id.to_string()])
                .map_err(|e| DocnError::database(e.to_string()))?;

            debug!("Deleted vector {}: {}", id, deleted > 0);
            Ok(deleted > 0)
        })
    }

    async fn batch_store_vectors(&self, entries: &[VectorEntry]) -> Result<usize> {
        let stored = self
            .write_entries(entries)
            .map_err(|e| DocnError::batch_rejected(entries.len(), e.to_string()))?;

        debug!("Stored batch of {} vectors", stored);
        Ok(stored)
    }

    async fn create_or_update_index(&self, name: &str, kind: IndexKind) -> Result<()> {
        if kind != IndexKind::Flat {
            return Err(DocnError::UnsupportedIndex {
                kind: kind.to_string(),
            });
        }

        let name = name.to_string();
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| DocnError::database(e.to_string()))?;

            tx.execute("DELETE FROM vector_indexes WHERE name = ?1", params![name])
                .map_err(|e| DocnError::database(e.to_string()))?;
            let entry_count: i64 = tx
                .query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))
                .map_err(|e| DocnError::database(e.to_string()))?;
            tx.execute(
                "INSERT INTO vector_indexes (name, kind, entry_count, built_at) VALUES (?1, ?2, ?3, ?4)",
                params![name, kind.to_string(), entry_count, now_secs()],
            )
            .map_err(|e| DocnError::database(e.to_string()))?;

            tx.commit().map_err(|e| DocnError::database(e.to_string()))?;

            info!("Index '{}' ({}) recorded over {} vectors", name, kind, entry_count);
            Ok(())
        })
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        if let Some(expected) = self.known_dimension() {
            if query.len() != expected {
                return Err(DocnError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let rows = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, embedding, metadata FROM vectors")
                .map_err(|e| DocnError::database(e.to_string()))?;

            let rows = stmt
                .query_map([], Self::row_to_entry)
                .map_err(|e| DocnError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| DocnError::database(e.to_string()))?;

            Ok(rows)
        })?;

        let mut scored = Vec::with_capacity(rows.len());
        for (id, blob, metadata) in rows {
            let entry = Self::decode_entry(id, blob, metadata)?;
            scored.push(ScoredEntry {
                similarity: cosine_similarity(query, &entry.embedding),
                entry,
            });
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn dimension(&self) -> Option<usize> {
        self.known_dimension()
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Convert f32 vector to bytes (little-endian).
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert little-endian bytes back to an f32 vector.
fn bytes_to_vec(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(DocnError::database(format!(
            "Corrupt embedding blob of {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
