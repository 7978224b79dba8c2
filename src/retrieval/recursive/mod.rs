//! Recursive (small-to-big) retrieval
//!
//! Base chunks are re-split at several smaller sizes; the small pieces
//! are what gets matched, but every hit resolves back to the base chunk
//! it was cut from, deduplicated by base id.

use crate::data::{sub_chunks, Chunk};
use crate::embedding::Embedder;
use crate::retrieval::{rank_nodes, HnswParams, Retriever, ScoredNode, VectorRetriever};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Sub-chunking parameters.
#[derive(Debug, Clone)]
pub struct RecursiveOptions {
    /// Sizes the base chunks are re-split at
    pub sub_chunk_sizes: Vec<usize>,
    /// Overlap between sub-chunks, in characters
    pub chunk_overlap: usize,
}

impl Default for RecursiveOptions {
    fn default() -> Self {
        Self {
            sub_chunk_sizes: vec![128, 256, 512],
            chunk_overlap: 20,
        }
    }
}

/// Small-to-big retriever.
pub struct RecursiveRetriever {
    inner: VectorRetriever,
    base_chunks: HashMap<String, Chunk>,
}

impl RecursiveRetriever {
    pub fn build(
        base: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        opts: RecursiveOptions,
    ) -> Result<Self> {
        if base.is_empty() {
            anyhow::bail!("cannot build a recursive index from zero chunks");
        }
        if opts.sub_chunk_sizes.is_empty() {
            anyhow::bail!("recursive retrieval needs at least one sub-chunk size");
        }

        let nodes = sub_chunks(&base, &opts.sub_chunk_sizes, opts.chunk_overlap);
        tracing::debug!(
            "recursive index: {} base chunks expanded to {} nodes",
            base.len(),
            nodes.len()
        );

        let inner = VectorRetriever::build(nodes, embedder, HnswParams::default())?;
        Ok(Self {
            inner,
            base_chunks: base.into_iter().map(|c| (c.id.clone(), c)).collect(),
        })
    }
}

impl Retriever for RecursiveRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        // Over-fetch: several sub-chunks may resolve to one base chunk.
        let hits = self.inner.retrieve(query, top_k * 4)?;

        let mut best: HashMap<&str, f32> = HashMap::new();
        for hit in &hits {
            let base_id = hit
                .chunk
                .extra
                .get("base_id")
                .map(String::as_str)
                .unwrap_or(hit.id.as_str());
            let entry = best.entry(base_id).or_insert(hit.score);
            if hit.score > *entry {
                *entry = hit.score;
            }
        }

        let scored = best
            .into_iter()
            .filter_map(|(base_id, score)| {
                self.base_chunks.get(base_id).map(|c| (c.clone(), score))
            })
            .collect();

        Ok(rank_nodes(scored, top_k))
    }

    fn name(&self) -> &str {
        "recursive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingOptions, HashingEmbedder};
    use crate::retrieval::testing::corpus;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(EmbeddingOptions::default()))
    }

    #[test]
    fn test_hits_resolve_to_base_chunks() {
        let base = corpus();
        let base_ids: Vec<String> = base.iter().map(|c| c.id.clone()).collect();

        let retriever = RecursiveRetriever::build(
            base,
            embedder(),
            RecursiveOptions {
                sub_chunk_sizes: vec![16, 32],
                chunk_overlap: 4,
            },
        )
        .unwrap();

        let results = retriever.retrieve("gluten dough kneading", 3).unwrap();
        assert!(!results.is_empty());
        // Every result is a base chunk, not a sub-chunk.
        assert!(results.iter().all(|n| base_ids.contains(&n.id)));
        // No base id appears twice.
        let mut seen = std::collections::HashSet::new();
        assert!(results.iter().all(|n| seen.insert(n.id.clone())));
    }

    #[test]
    fn test_empty_sub_sizes_rejected() {
        let err = RecursiveRetriever::build(
            corpus(),
            embedder(),
            RecursiveOptions {
                sub_chunk_sizes: Vec::new(),
                chunk_overlap: 0,
            },
        );
        assert!(err.is_err());
    }
}
