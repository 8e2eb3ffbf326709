use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

use anyhow::{anyhow, bail, Result};
use docbot_schema::DocumentChunk;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tokio::task;

use crate::migrations::run_migrations;

pub const DEFAULT_COLLECTION: &str = "legal_documents";

/// A chunk returned by nearest-neighbour search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: DocumentChunk,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f64,
}

/// Chunk embeddings persisted in one SQLite file, searched through `sqlite-vec`.
#[derive(Clone)]
pub struct VectorIndex {
    db: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

static SQLITE_VEC: Once = Once::new();

/// Registers sqlite-vec for every connection opened afterwards.
fn init_sqlite_vec() {
    use rusqlite::ffi::{sqlite3, sqlite3_api_routines, sqlite3_auto_extension};

    type Sqlite3AutoExtFn =
        unsafe extern "C" fn(*mut sqlite3, *mut *mut i8, *const sqlite3_api_routines) -> i32;

    SQLITE_VEC.call_once(|| unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute::<*const (), Sqlite3AutoExtFn>(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

impl VectorIndex {
    /// Creates a fresh index at `path`, replacing any previous file.
    pub fn create(path: &Path, collection: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::prepare(conn, Some(path.to_path_buf()), Some(collection))
    }

    /// Opens an existing index file. Fails if the file is absent or was never
    /// stamped with a collection name.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("index file not found: {}", path.display());
        }
        init_sqlite_vec();
        let conn = Connection::open(path)?;
        // Checked before migrating so a foreign file is never written to.
        let has_meta: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'meta')",
                [],
                |r| r.get(0),
            )
            .map_err(|e| anyhow!("{} is not a document index: {e}", path.display()))?;
        if !has_meta {
            bail!("{} is not a document index", path.display());
        }
        let index = Self::prepare(conn, Some(path.to_path_buf()), None)?;
        if index.collection_blocking()?.is_none() {
            bail!("{} is not a document index", path.display());
        }
        Ok(index)
    }

    pub fn open_in_memory(collection: &str) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::prepare(conn, None, Some(collection))
    }

    fn prepare(conn: Connection, path: Option<PathBuf>, collection: Option<&str>) -> Result<Self> {
        run_migrations(&conn)?;
        if let Some(name) = collection {
            conn.execute(
                "INSERT INTO meta(key, value) VALUES('collection', ?1) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![name],
            )?;
        }
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn collection_blocking(&self) -> Result<Option<String>> {
        let db = self
            .db
            .lock()
            .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
        Ok(db
            .query_row("SELECT value FROM meta WHERE key = 'collection'", [], |r| {
                r.get(0)
            })
            .optional()?)
    }

    pub async fn collection(&self) -> Result<Option<String>> {
        let this = self.clone();
        task::spawn_blocking(move || this.collection_blocking()).await?
    }

    /// Creates (or rebuilds, when the embedding width changes) the vec0 table.
    /// Vectors are compared by cosine distance so both search paths agree.
    pub fn ensure_vec_table(&self, dimensions: usize) -> Result<()> {
        let db = self
            .db
            .lock()
            .map_err(|_| anyhow!("failed to lock sqlite connection"))?;

        let layout = vec_layout(dimensions);
        let stored: Option<String> = db
            .query_row("SELECT value FROM meta WHERE key = 'vec_layout'", [], |r| {
                r.get(0)
            })
            .optional()?;
        if stored.as_deref() == Some(layout.as_str()) {
            return Ok(());
        }

        let tx = db.unchecked_transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS chunks_vec;
             CREATE VIRTUAL TABLE chunks_vec USING vec0(
                 chunk_id TEXT PRIMARY KEY,
                 embedding float[{dimensions}] distance_metric=cosine
             );"
        ))?;
        for (key, value) in [("vec_layout", layout), ("vec_dimensions", dimensions.to_string())] {
            tx.execute(
                "INSERT INTO meta(key, value) VALUES(?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        tracing::info!(dimensions, "chunk vector table ready");
        Ok(())
    }

    /// Inserts or replaces one chunk and its embedding.
    pub async fn upsert(&self, chunk: &DocumentChunk, embedding: &[f32], model: &str) -> Result<()> {
        if embedding.is_empty() {
            bail!("refusing to index {} with an empty embedding", chunk.chunk_id());
        }
        self.ensure_vec_table(embedding.len())?;

        let db = Arc::clone(&self.db);
        let chunk = chunk.clone();
        let embedding_json = embedding_to_json(embedding);
        let model = model.to_owned();
        let hash = content_hash(&chunk.text);
        let now = chrono::Utc::now().to_rfc3339();

        task::spawn_blocking(move || {
            let chunk_id = chunk.chunk_id();
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                r#"
                INSERT INTO chunks(id, source, chunk_index, text, hash, model, embedding, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    hash = excluded.hash,
                    model = excluded.model,
                    embedding = excluded.embedding,
                    updated_at = excluded.updated_at
                "#,
                params![
                    chunk_id,
                    chunk.source_key,
                    chunk.chunk_index,
                    chunk.text,
                    hash,
                    model,
                    embedding_json,
                    now,
                ],
            )?;
            tx.execute("DELETE FROM chunks_vec WHERE chunk_id = ?1", params![chunk_id])?;
            tx.execute(
                "INSERT INTO chunks_vec(chunk_id, embedding) VALUES (?1, ?2)",
                params![chunk_id, embedding_json],
            )?;
            tx.execute(
                "INSERT INTO meta(key, value) VALUES('embedding_model', ?1) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![model],
            )?;
            tx.commit()?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }

    /// The `k` chunks closest to `query_embedding`, best first.
    pub async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query_embedding.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let db = Arc::clone(&self.db);
        let query_embedding = query_embedding.to_vec();
        let query_json = embedding_to_json(&query_embedding);

        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;

            let indexed_dims: Option<String> = conn
                .query_row(
                    "SELECT value FROM meta WHERE key = 'vec_dimensions'",
                    [],
                    |r| r.get(0),
                )
                .optional()?;
            let vec_usable = indexed_dims.and_then(|d| d.parse::<usize>().ok())
                == Some(query_embedding.len());

            let mut hits = Vec::new();
            if vec_usable {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT c.source, c.chunk_index, c.text, v.distance
                    FROM chunks_vec v
                    JOIN chunks c ON c.id = v.chunk_id
                    WHERE v.embedding MATCH ?1 AND k = ?2
                    ORDER BY v.distance
                    "#,
                )?;
                let rows = stmt.query_map(params![query_json, k as i64], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, u32>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, f64>(3)?,
                    ))
                })?;
                for row in rows {
                    let (source, chunk_index, text, distance) = row?;
                    hits.push(SearchHit {
                        chunk: DocumentChunk::new(source, chunk_index, text),
                        score: similarity_from_distance(distance),
                    });
                }
                return Ok::<Vec<SearchHit>, anyhow::Error>(hits);
            }

            let mut stmt = conn.prepare("SELECT source, chunk_index, text, embedding FROM chunks")?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, u32>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?;
            for row in rows {
                let (source, chunk_index, text, embedding_json) = row?;
                let embedding = json_to_embedding(&embedding_json)?;
                if embedding.len() != query_embedding.len() {
                    continue;
                }
                hits.push(SearchHit {
                    chunk: DocumentChunk::new(source, chunk_index, text),
                    score: similarity_from_distance(cosine_distance(&query_embedding, &embedding)),
                });
            }
            hits.sort_by(|a, b| b.score.total_cmp(&a.score));
            hits.truncate(k);
            Ok(hits)
        })
        .await?
    }

    pub async fn count(&self) -> Result<usize> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
            Ok::<usize, anyhow::Error>(n as usize)
        })
        .await?
    }

    pub async fn get(&self, source: &str, chunk_index: u32) -> Result<Option<DocumentChunk>> {
        let db = Arc::clone(&self.db);
        let source = source.to_owned();
        task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow!("failed to lock sqlite connection"))?;
            let text: Option<String> = conn
                .query_row(
                    "SELECT text FROM chunks WHERE source = ?1 AND chunk_index = ?2",
                    params![source, chunk_index],
                    |r| r.get(0),
                )
                .optional()?;
            Ok::<_, anyhow::Error>(text.map(|t| DocumentChunk::new(source, chunk_index, t)))
        })
        .await?
    }
}

pub(crate) fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn embedding_to_json(embedding: &[f32]) -> String {
    match serde_json::to_string(embedding) {
        Ok(json) => json,
        Err(_) => "[]".to_owned(),
    }
}

fn json_to_embedding(json: &str) -> Result<Vec<f32>> {
    Ok(serde_json::from_str::<Vec<f32>>(json)?)
}

fn vec_layout(dimensions: usize) -> String {
    format!("cosine:{dimensions}")
}

/// Same quantity vec0 reports for `distance_metric=cosine`. Zero vectors sit at
/// distance 1 from everything.
fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold((0.0_f64, 0.0_f64, 0.0_f64), |acc, (x, y)| {
        let (x, y) = (f64::from(*x), f64::from(*y));
        (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
    });
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn similarity_from_distance(distance: f64) -> f64 {
    (1.0 - distance).clamp(-1.0, 1.0)
}
