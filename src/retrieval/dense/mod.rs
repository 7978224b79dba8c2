//! Dense retrieval
//!
//! Approximate nearest-neighbor search over chunk embeddings via
//! hnsw_rs with cosine distance.

use crate::data::Chunk;
use crate::embedding::{Embedder, Embedding};
use crate::retrieval::{IndexMetadata, Retriever, ScoredNode};
use anyhow::{Context, Result};
use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// HNSW build parameters.
#[derive(Debug, Clone)]
pub struct HnswParams {
    /// Max connections per layer
    pub max_connections: usize,
    /// Candidate list size during construction
    pub ef_construction: usize,
    /// Candidate list size during search
    pub ef_search: usize,
    /// Number of layers
    pub max_layers: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            max_connections: 16,
            ef_construction: 200,
            ef_search: 48,
            max_layers: 16,
        }
    }
}

/// Vector retriever over an HNSW index.
pub struct VectorRetriever {
    hnsw: Hnsw<'static, f32, DistCosine>,
    ordered: Vec<(Chunk, Embedding)>,
    embedder: Arc<dyn Embedder>,
    params: HnswParams,
    metadata: IndexMetadata,
}

impl VectorRetriever {
    /// Build an index from chunks, embedding each chunk's content.
    pub fn build(chunks: Vec<Chunk>, embedder: Arc<dyn Embedder>, params: HnswParams) -> Result<Self> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts)?;
        Self::from_embeddings(chunks, embeddings, embedder, params)
    }

    /// Build an index from chunks with precomputed embeddings.
    pub fn from_embeddings(
        chunks: Vec<Chunk>,
        embeddings: Vec<Embedding>,
        embedder: Arc<dyn Embedder>,
        params: HnswParams,
    ) -> Result<Self> {
        if chunks.is_empty() {
            anyhow::bail!("cannot build a vector index from zero chunks");
        }
        if chunks.len() != embeddings.len() {
            anyhow::bail!(
                "chunk count ({}) does not match embedding count ({})",
                chunks.len(),
                embeddings.len()
            );
        }

        let dimension = embeddings[0].len();
        tracing::debug!("building HNSW index: {} chunks, dim {}", chunks.len(), dimension);

        let hnsw: Hnsw<f32, DistCosine> = Hnsw::new(
            params.max_connections,
            chunks.len(),
            params.max_layers,
            params.ef_construction,
            DistCosine,
        );
        for (i, embedding) in embeddings.iter().enumerate() {
            hnsw.insert((embedding.as_slice(), i));
        }

        let metadata = IndexMetadata {
            model_name: embedder.model_name().to_string(),
            dimension,
            num_chunks: chunks.len(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        Ok(Self {
            hnsw,
            ordered: chunks.into_iter().zip(embeddings).collect(),
            embedder,
            params,
            metadata,
        })
    }

    /// Persist chunks, embeddings, and metadata. The HNSW graph itself
    /// is rebuilt from the stored vectors on load.
    pub fn save(&self, index_dir: &Path) -> Result<()> {
        fs::create_dir_all(index_dir)
            .with_context(|| format!("failed to create {:?}", index_dir))?;

        let chunks: Vec<&Chunk> = self.ordered.iter().map(|(c, _)| c).collect();
        let embeddings: Vec<&Embedding> = self.ordered.iter().map(|(_, e)| e).collect();
        fs::write(index_dir.join("chunks.json"), serde_json::to_string(&chunks)?)?;
        fs::write(
            index_dir.join("embeddings.json"),
            serde_json::to_string(&embeddings)?,
        )?;
        fs::write(
            index_dir.join("metadata.json"),
            serde_json::to_string_pretty(&self.metadata)?,
        )?;
        tracing::debug!("vector index saved to {:?}", index_dir);
        Ok(())
    }

    /// Load a persisted index, rebuilding the HNSW graph from the
    /// stored vectors.
    pub fn load(index_dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let chunks: Vec<Chunk> = serde_json::from_str(
            &fs::read_to_string(index_dir.join("chunks.json"))
                .context("failed to read chunks.json")?,
        )?;
        let embeddings: Vec<Embedding> = serde_json::from_str(
            &fs::read_to_string(index_dir.join("embeddings.json"))
                .context("failed to read embeddings.json")?,
        )?;
        let metadata: IndexMetadata = serde_json::from_str(
            &fs::read_to_string(index_dir.join("metadata.json"))
                .context("failed to read metadata.json")?,
        )?;

        if embedder.model_name() != metadata.model_name {
            tracing::warn!(
                "embedder mismatch: index built with '{}', querying with '{}'",
                metadata.model_name,
                embedder.model_name()
            );
        }

        Self::from_embeddings(chunks, embeddings, embedder, HnswParams::default())
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// Embedding stored for a chunk id, if present. Used by retrievers
    /// that re-rank against the same vector space.
    pub fn embedding_of(&self, chunk_id: &str) -> Option<&Embedding> {
        self.ordered
            .iter()
            .find(|(c, _)| c.id == chunk_id)
            .map(|(_, e)| e)
    }
}

impl Retriever for VectorRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        let query_embedding = self.embedder.embed(query).context("failed to embed query")?;

        let neighbours = self.hnsw.search(
            query_embedding.as_slice(),
            top_k.min(self.ordered.len()),
            self.params.ef_search,
        );

        let mut results = Vec::with_capacity(neighbours.len());
        for (rank, neighbour) in neighbours.iter().enumerate() {
            if let Some((chunk, _)) = self.ordered.get(neighbour.d_id) {
                // hnsw_rs reports cosine distance; flip to similarity.
                let score = 1.0 - neighbour.distance;
                results.push(ScoredNode::new(chunk.clone(), score, rank + 1));
            }
        }

        Ok(results)
    }

    fn name(&self) -> &str {
        "vector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingOptions, HashingEmbedder};
    use crate::retrieval::testing::corpus;
    use tempfile::TempDir;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(EmbeddingOptions::default()))
    }

    #[test]
    fn test_build_and_search() {
        let retriever = VectorRetriever::build(corpus(), embedder(), HnswParams::default()).unwrap();

        let results = retriever.retrieve("memory safety in systems programming", 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.document_id, "doc_lang");
        assert!(results[0].score.is_finite());
    }

    #[test]
    fn test_mismatched_embeddings_rejected() {
        let err = VectorRetriever::from_embeddings(
            corpus(),
            vec![vec![0.0; 8]],
            embedder(),
            HnswParams::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let built = VectorRetriever::build(corpus(), embedder(), HnswParams::default()).unwrap();
        built.save(dir.path()).unwrap();

        let loaded = VectorRetriever::load(dir.path(), embedder()).unwrap();
        assert_eq!(loaded.metadata().num_chunks, 5);

        let results = loaded.retrieve("dough and gluten", 2).unwrap();
        assert!(!results.is_empty());
    }
}
