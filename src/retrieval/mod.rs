//! Retrieval engines
//!
//! Every retriever implements [`Retriever`] and returns ranked
//! [`ScoredNode`] lists. Families:
//!
//! - `sparse` - BM25 full-text search (tantivy)
//! - `dense` - vector search (HNSW)
//! - `keyword` - keyword-table lookup
//! - `summary` - list index and per-document summaries
//! - `tree` - hierarchical summarized tree
//! - `fusion` - AND/OR set fusion of two retrievers
//! - `query_fusion` - multi-retriever, multi-query rank fusion
//! - `auto_merging` - leaf results merged into hierarchical parents
//! - `recursive` - small-to-big sub-chunk retrieval
//! - `sentence_window` - sentence hits widened to their window
//! - `factory` - string-keyed dispatch over all of the above

use crate::data::Chunk;
use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod auto_merging;
pub mod dense;
pub mod factory;
pub mod fusion;
pub mod keyword;
pub mod query_fusion;
pub mod recursive;
pub mod sentence_window;
pub mod sparse;
pub mod summary;
pub mod tree;

pub use auto_merging::*;
pub use dense::*;
pub use factory::*;
pub use fusion::*;
pub use keyword::*;
pub use query_fusion::*;
pub use recursive::*;
pub use sentence_window::*;
pub use sparse::*;
pub use summary::*;
pub use tree::*;

/// A retrieved chunk with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredNode {
    /// Chunk id, unique within a result list after fusion
    pub id: String,
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Relevance score, higher is better; not comparable across
    /// retrieval methods
    pub score: f32,
    /// 1-indexed rank within the result list
    pub rank: usize,
}

impl ScoredNode {
    pub fn new(chunk: Chunk, score: f32, rank: usize) -> Self {
        Self {
            id: chunk.id.clone(),
            chunk,
            score,
            rank,
        }
    }
}

/// Metadata persisted alongside a built index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Embedding model name, or the scoring scheme for sparse indexes
    pub model_name: String,
    /// Embedding dimension; 0 for sparse indexes
    pub dimension: usize,
    /// Number of chunks indexed
    pub num_chunks: usize,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

/// Trait for retrieval engines.
pub trait Retriever: Send + Sync {
    /// Retrieve the top-k most relevant chunks for a query.
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>>;

    /// Short name of this retriever, used in logs.
    fn name(&self) -> &str;
}

/// Sort scored chunks best-first, assign 1-indexed ranks, keep top-k.
pub(crate) fn rank_nodes(mut scored: Vec<(Chunk, f32)>, top_k: usize) -> Vec<ScoredNode> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
        .into_iter()
        .enumerate()
        .map(|(i, (chunk, score))| ScoredNode::new(chunk, score, i + 1))
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared test fixtures for the retrieval modules.

    use super::*;

    /// Fixed-response retriever for wiring tests.
    pub struct StaticRetriever {
        pub label: String,
        pub nodes: Vec<ScoredNode>,
    }

    impl StaticRetriever {
        pub fn new(label: &str, items: &[(&str, f32)]) -> Self {
            let nodes = items
                .iter()
                .enumerate()
                .map(|(i, (id, score))| {
                    ScoredNode::new(
                        Chunk::new(*id, "doc", format!("content of {}", id), 0, 0, i),
                        *score,
                        i + 1,
                    )
                })
                .collect();
            Self {
                label: label.to_string(),
                nodes,
            }
        }
    }

    impl Retriever for StaticRetriever {
        fn retrieve(&self, _query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
            Ok(self.nodes.iter().take(top_k).cloned().collect())
        }

        fn name(&self) -> &str {
            &self.label
        }
    }

    /// Build a small corpus of chunks for index tests.
    pub fn corpus() -> Vec<Chunk> {
        let texts = [
            ("doc_lang", "Rust is a systems programming language focused on safety."),
            ("doc_lang", "The borrow checker enforces memory safety at compile time."),
            ("doc_cook", "Sourdough bread needs a mature starter and patience."),
            ("doc_cook", "Knead the dough until the gluten develops fully."),
            ("doc_sea", "Tidal currents around the headland are strongest at noon."),
        ];
        texts
            .iter()
            .enumerate()
            .map(|(i, (doc, text))| {
                Chunk::new(format!("{}_{}", doc, i), *doc, *text, 0, text.len(), i)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_nodes_orders_and_truncates() {
        let scored = vec![
            (Chunk::new("a", "d", "", 0, 0, 0), 0.2),
            (Chunk::new("b", "d", "", 0, 0, 1), 0.9),
            (Chunk::new("c", "d", "", 0, 0, 2), 0.5),
        ];

        let ranked = rank_nodes(scored, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "b");
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].id, "c");
        assert_eq!(ranked[1].rank, 2);
    }
}
