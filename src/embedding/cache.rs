//! Persistent embedding cache
//!
//! SQLite-backed, keyed by (text hash, model name).

use crate::embedding::{Embedder, Embedding};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Embedding cache backed by SQLite.
pub struct EmbeddingCache {
    conn: Connection,
    model_name: String,
}

impl EmbeddingCache {
    /// Open (or create) a cache database.
    pub fn open(db_path: &Path, model_name: impl Into<String>) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open embedding cache {:?}", db_path))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS embeddings (
                text_hash  TEXT NOT NULL,
                model_name TEXT NOT NULL,
                embedding  BLOB NOT NULL,
                dimension  INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (text_hash, model_name)
            )",
            [],
        )?;

        Ok(Self {
            conn,
            model_name: model_name.into(),
        })
    }

    fn hash_text(text: &str) -> String {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    fn to_bytes(embedding: &Embedding) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Embedding> {
        if bytes.len() % 4 != 0 {
            anyhow::bail!("corrupt embedding blob: {} bytes", bytes.len());
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Look up a cached embedding.
    pub fn get(&self, text: &str) -> Result<Option<Embedding>> {
        let row = self.conn.query_row(
            "SELECT embedding FROM embeddings WHERE text_hash = ?1 AND model_name = ?2",
            params![Self::hash_text(text), self.model_name],
            |row| row.get::<_, Vec<u8>>(0),
        );

        match row {
            Ok(bytes) => Ok(Some(Self::from_bytes(&bytes)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store an embedding.
    pub fn put(&self, text: &str, embedding: &Embedding) -> Result<()> {
        let created_at = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT OR REPLACE INTO embeddings
             (text_hash, model_name, embedding, dimension, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Self::hash_text(text),
                self.model_name,
                Self::to_bytes(embedding),
                embedding.len() as i64,
                created_at
            ],
        )?;
        Ok(())
    }

    /// Return the cached embedding or compute and store it.
    pub fn get_or_compute<F>(&self, text: &str, compute: F) -> Result<Embedding>
    where
        F: FnOnce(&str) -> Result<Embedding>,
    {
        if let Some(hit) = self.get(text)? {
            tracing::trace!("embedding cache hit");
            return Ok(hit);
        }
        let embedding = compute(text)?;
        self.put(text, &embedding)?;
        Ok(embedding)
    }

    /// Number of entries stored for this cache's model.
    pub fn len(&self) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE model_name = ?1",
            params![self.model_name],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Embedder wrapper that reads through an [`EmbeddingCache`].
///
/// SQLite connections are not `Sync`, so the cache sits behind a mutex;
/// embedding is the expensive side of the lock.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<EmbeddingCache>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: EmbeddingCache) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
        }
    }

    /// Open the cache at `db_path` keyed by the inner embedder's model.
    pub fn open(inner: Arc<dyn Embedder>, db_path: &Path) -> Result<Self> {
        let cache = EmbeddingCache::open(db_path, inner.model_name())?;
        Ok(Self::new(inner, cache))
    }
}

impl Embedder for CachedEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let cache = self
            .cache
            .lock()
            .map_err(|_| anyhow::anyhow!("embedding cache lock poisoned"))?;
        cache.get_or_compute(text, |t| self.inner.embed(t))
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_put_get_roundtrip() {
        let db = NamedTempFile::new().unwrap();
        let cache = EmbeddingCache::open(db.path(), "m1").unwrap();

        assert!(cache.get("hello").unwrap().is_none());
        cache.put("hello", &vec![0.25, -1.5, 3.0]).unwrap();
        assert_eq!(cache.get("hello").unwrap().unwrap(), vec![0.25, -1.5, 3.0]);
    }

    #[test]
    fn test_get_or_compute_computes_once() {
        let db = NamedTempFile::new().unwrap();
        let cache = EmbeddingCache::open(db.path(), "m1").unwrap();

        let mut calls = 0;
        let first = cache
            .get_or_compute("text", |_| {
                calls += 1;
                Ok(vec![1.0])
            })
            .unwrap();
        let second = cache
            .get_or_compute("text", |_| {
                calls += 1;
                Ok(vec![2.0])
            })
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls, 1);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_cached_embedder_reads_through() {
        use crate::embedding::{EmbeddingOptions, HashingEmbedder};

        let db = NamedTempFile::new().unwrap();
        let inner = Arc::new(HashingEmbedder::new(EmbeddingOptions::default()));
        let cached = CachedEmbedder::open(inner.clone(), db.path()).unwrap();

        let through_cache = cached.embed("hello world").unwrap();
        assert_eq!(through_cache, inner.embed("hello world").unwrap());
        assert_eq!(cached.cache.lock().unwrap().len().unwrap(), 1);

        // Second read hits the cache, same vector.
        assert_eq!(cached.embed("hello world").unwrap(), through_cache);
    }

    #[test]
    fn test_model_isolation() {
        let db = NamedTempFile::new().unwrap();
        let a = EmbeddingCache::open(db.path(), "model-a").unwrap();
        a.put("shared text", &vec![1.0]).unwrap();

        let b = EmbeddingCache::open(db.path(), "model-b").unwrap();
        assert!(b.get("shared text").unwrap().is_none());
    }
}
