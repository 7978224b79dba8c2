//! Tree-index retrieval
//!
//! Builds a hierarchy bottom-up: leaves are the corpus chunks, each
//! parent summarizes a group of children through the generation seam.
//! Retrieval modes read the tree at different depths: the root
//! summaries, every leaf, or a guided descent from root to leaf.

use crate::data::Chunk;
use crate::embedding::{cosine_similarity, Embedder, Embedding};
use crate::error::ConfigError;
use crate::generation::{GenerationParams, Generator};
use crate::retrieval::{rank_nodes, Retriever, ScoredNode};
use crate::selection::Selector;
use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;

/// Tree read strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeMode {
    /// Return the root-level summaries
    Root,
    /// Return leaves in corpus order
    AllLeaf,
    /// Descend root-to-leaf choosing children by token overlap
    SelectLeaf,
    /// Descend root-to-leaf choosing children by embedding similarity
    SelectLeafEmbedding,
}

impl FromStr for TreeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "root" => Ok(TreeMode::Root),
            "allleaf" => Ok(TreeMode::AllLeaf),
            "selectleaf" => Ok(TreeMode::SelectLeaf),
            "selectleafembedding" => Ok(TreeMode::SelectLeafEmbedding),
            _ => Err(ConfigError::InvalidMode {
                field: "tree mode",
                value: s.to_string(),
                expected: "root, all-leaf, select-leaf, select-leaf-embedding",
            }),
        }
    }
}

struct TreeNode {
    chunk: Chunk,
    embedding: Embedding,
    /// Indices into the level below; empty for leaves
    children: Vec<usize>,
}

/// Hierarchical summarized tree over a chunk corpus.
pub struct TreeRetriever {
    /// levels[0] are the leaves; the last level is the root layer
    levels: Vec<Vec<TreeNode>>,
    embedder: Arc<dyn Embedder>,
    selector: Arc<dyn Selector>,
    mode: TreeMode,
}

impl TreeRetriever {
    /// Build the tree with `branching` children per parent.
    pub fn build(
        chunks: Vec<Chunk>,
        mode: TreeMode,
        branching: usize,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        selector: Arc<dyn Selector>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            anyhow::bail!("cannot build a tree index from zero chunks");
        }
        if branching < 2 {
            anyhow::bail!("tree branching factor must be at least 2, got {}", branching);
        }

        let mut leaves = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = embedder.embed(&chunk.content)?;
            leaves.push(TreeNode {
                chunk,
                embedding,
                children: Vec::new(),
            });
        }

        let mut levels = vec![leaves];
        let mut depth = 0;
        while levels.last().unwrap().len() > 1 {
            depth += 1;
            let below = levels.last().unwrap();
            let mut parents = Vec::new();

            for (seq, group) in below.chunks(branching).enumerate() {
                let start = seq * branching;
                let joined: String = group
                    .iter()
                    .map(|n| n.chunk.content.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let prompt = format!("Context:\n{}\n\nSummarize the context briefly.", joined);
                let summary = generator.generate(&prompt, &GenerationParams::default())?;
                let embedding = embedder.embed(&summary)?;

                let id = format!("tree_d{}_{}", depth, seq);
                parents.push(TreeNode {
                    chunk: Chunk::new(id, "tree", summary, 0, 0, seq),
                    embedding,
                    children: (start..start + group.len()).collect(),
                });
            }

            tracing::debug!("tree level {}: {} nodes", depth, parents.len());
            levels.push(parents);
        }

        Ok(Self {
            levels,
            embedder,
            selector,
            mode,
        })
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn mode(&self) -> TreeMode {
        self.mode
    }

    /// Score a set of nodes at one level against the query.
    fn score_level(
        &self,
        query: &str,
        query_embedding: Option<&Embedding>,
        level: &[TreeNode],
        candidates: &[usize],
        top_k: usize,
    ) -> Result<Vec<(usize, f32)>> {
        match query_embedding {
            Some(qe) => {
                let mut scored: Vec<(usize, f32)> = candidates
                    .iter()
                    .map(|&i| (i, cosine_similarity(qe, &level[i].embedding)))
                    .collect();
                scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                scored.truncate(top_k);
                Ok(scored)
            }
            None => {
                let texts: Vec<&str> = candidates
                    .iter()
                    .map(|&i| level[i].chunk.content.as_str())
                    .collect();
                let picks = self.selector.select(query, &texts, top_k)?;
                Ok(picks
                    .into_iter()
                    .map(|(local, score)| (candidates[local], score))
                    .collect())
            }
        }
    }

    /// Descend from the root layer to the leaves, narrowing to the best
    /// child at each level, then rank the final leaf candidates.
    fn descend(&self, query: &str, by_embedding: bool, top_k: usize) -> Result<Vec<ScoredNode>> {
        let query_embedding = if by_embedding {
            Some(self.embedder.embed(query)?)
        } else {
            None
        };

        let mut level_idx = self.levels.len() - 1;
        let mut candidates: Vec<usize> = (0..self.levels[level_idx].len()).collect();

        while level_idx > 0 {
            let level = &self.levels[level_idx];
            let keep = if level_idx == 1 { top_k } else { 1 };
            let picked =
                self.score_level(query, query_embedding.as_ref(), level, &candidates, keep)?;

            // A query with no overlap anywhere gives an empty pick;
            // descend through every candidate instead of going blind.
            let chosen: Vec<usize> = if picked.is_empty() {
                candidates.clone()
            } else {
                picked.into_iter().map(|(idx, _)| idx).collect()
            };

            let mut next: Vec<usize> = Vec::new();
            for idx in chosen {
                next.extend(&level[idx].children);
            }
            candidates = next;
            level_idx -= 1;
        }

        let leaves = &self.levels[0];
        let picked = self.score_level(query, query_embedding.as_ref(), leaves, &candidates, top_k)?;
        let scored = picked
            .into_iter()
            .map(|(i, score)| (leaves[i].chunk.clone(), score))
            .collect();
        Ok(rank_nodes(scored, top_k))
    }
}

impl Retriever for TreeRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        match self.mode {
            TreeMode::Root => {
                let roots = self.levels.last().unwrap();
                Ok(roots
                    .iter()
                    .take(top_k)
                    .enumerate()
                    .map(|(i, n)| ScoredNode::new(n.chunk.clone(), 1.0, i + 1))
                    .collect())
            }
            TreeMode::AllLeaf => Ok(self.levels[0]
                .iter()
                .take(top_k)
                .enumerate()
                .map(|(i, n)| ScoredNode::new(n.chunk.clone(), 1.0, i + 1))
                .collect()),
            TreeMode::SelectLeaf => self.descend(query, false, top_k),
            TreeMode::SelectLeafEmbedding => self.descend(query, true, top_k),
        }
    }

    fn name(&self) -> &str {
        "tree"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingOptions, HashingEmbedder};
    use crate::generation::ExtractiveGenerator;
    use crate::retrieval::testing::corpus;
    use crate::selection::TokenOverlapSelector;

    fn build(mode: TreeMode) -> TreeRetriever {
        TreeRetriever::build(
            corpus(),
            mode,
            2,
            Arc::new(HashingEmbedder::new(EmbeddingOptions::default())),
            Arc::new(ExtractiveGenerator::default()),
            Arc::new(TokenOverlapSelector),
        )
        .unwrap()
    }

    #[test]
    fn test_tree_mode_parsing() {
        assert_eq!("root".parse::<TreeMode>().unwrap(), TreeMode::Root);
        assert_eq!("all-leaf".parse::<TreeMode>().unwrap(), TreeMode::AllLeaf);
        assert_eq!("selectleaf".parse::<TreeMode>().unwrap(), TreeMode::SelectLeaf);
        assert_eq!(
            "select-leaf-embedding".parse::<TreeMode>().unwrap(),
            TreeMode::SelectLeafEmbedding
        );
        assert!("trunk".parse::<TreeMode>().is_err());
    }

    #[test]
    fn test_tree_collapses_to_single_root() {
        let tree = build(TreeMode::Root);
        // 5 leaves, branching 2: 5 -> 3 -> 2 -> 1
        assert_eq!(tree.depth(), 4);

        let roots = tree.retrieve("anything", 5).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].chunk.document_id, "tree");
    }

    #[test]
    fn test_all_leaf_returns_corpus_chunks() {
        let tree = build(TreeMode::AllLeaf);
        let leaves = tree.retrieve("anything", 10).unwrap();

        assert_eq!(leaves.len(), 5);
        assert!(leaves.iter().all(|n| n.chunk.document_id != "tree"));
    }

    #[test]
    fn test_select_leaf_descends_to_relevant_leaf() {
        let tree = build(TreeMode::SelectLeaf);
        let results = tree.retrieve("borrow checker compile time safety", 1).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.document_id, "doc_lang");
    }

    #[test]
    fn test_select_leaf_embedding_descends() {
        let tree = build(TreeMode::SelectLeafEmbedding);
        let results = tree.retrieve("tidal currents at the headland", 1).unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].score.is_finite());
    }

    #[test]
    fn test_branching_validated() {
        let err = TreeRetriever::build(
            corpus(),
            TreeMode::Root,
            1,
            Arc::new(HashingEmbedder::new(EmbeddingOptions::default())),
            Arc::new(ExtractiveGenerator::default()),
            Arc::new(TokenOverlapSelector),
        );
        assert!(err.is_err());
    }
}
