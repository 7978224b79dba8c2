//! Auto-merging retrieval
//!
//! Documents are split into a hierarchy of progressively smaller
//! chunks; retrieval runs over the leaves, and whenever enough children
//! of one parent show up in the results they are replaced by the parent
//! chunk, widening the context handed to synthesis.

use crate::data::{Chunk, Document};
use crate::embedding::Embedder;
use crate::retrieval::{rank_nodes, HnswParams, Retriever, ScoredNode, VectorRetriever};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Hierarchy build parameters.
#[derive(Debug, Clone)]
pub struct HierarchyOptions {
    /// Chunk sizes per level, largest first
    pub level_sizes: Vec<usize>,
    /// Overlap within a level, in characters
    pub chunk_overlap: usize,
    /// Fraction of a parent's children that must be retrieved before
    /// the parent replaces them
    pub merge_ratio: f32,
}

impl Default for HierarchyOptions {
    fn default() -> Self {
        Self {
            level_sizes: vec![2048, 512, 128],
            chunk_overlap: 20,
            merge_ratio: 0.5,
        }
    }
}

/// Multi-level chunk store with parent/child links.
pub struct HierarchicalCorpus {
    chunks: HashMap<String, Chunk>,
    parent_of: HashMap<String, String>,
    child_count: HashMap<String, usize>,
    leaves: Vec<Chunk>,
}

impl HierarchicalCorpus {
    /// Split documents level by level; each chunk of level n+1 is cut
    /// from the content of one level-n chunk and linked to it through
    /// `extra["parent_id"]`.
    pub fn build(documents: &[Document], opts: &HierarchyOptions) -> Result<Self> {
        if documents.is_empty() {
            anyhow::bail!("cannot build a hierarchy from zero documents");
        }
        if opts.level_sizes.len() < 2 {
            anyhow::bail!(
                "hierarchy needs at least two level sizes, got {}",
                opts.level_sizes.len()
            );
        }
        if opts.level_sizes.windows(2).any(|w| w[1] >= w[0]) {
            anyhow::bail!("hierarchy level sizes must be strictly decreasing");
        }

        let mut chunks = HashMap::new();
        let mut parent_of = HashMap::new();
        let mut child_count: HashMap<String, usize> = HashMap::new();

        // Top level is cut from the documents themselves.
        let mut current: Vec<Chunk> = Vec::new();
        for doc in documents {
            for (seq, piece) in split_chars(&doc.content, opts.level_sizes[0], opts.chunk_overlap)
                .into_iter()
                .enumerate()
            {
                let chunk = Chunk::new(
                    format!("{}_h0_{}", doc.id, seq),
                    &doc.id,
                    piece,
                    0,
                    0,
                    seq,
                );
                chunks.insert(chunk.id.clone(), chunk.clone());
                current.push(chunk);
            }
        }

        for (level, &size) in opts.level_sizes.iter().enumerate().skip(1) {
            let mut next: Vec<Chunk> = Vec::new();
            for parent in &current {
                for (seq, piece) in split_chars(&parent.content, size, opts.chunk_overlap)
                    .into_iter()
                    .enumerate()
                {
                    let chunk = Chunk::new(
                        format!("{}_h{}_{}", parent.id, level, seq),
                        &parent.document_id,
                        piece,
                        0,
                        0,
                        seq,
                    )
                    .with_extra("parent_id", &parent.id);

                    parent_of.insert(chunk.id.clone(), parent.id.clone());
                    *child_count.entry(parent.id.clone()).or_default() += 1;
                    chunks.insert(chunk.id.clone(), chunk.clone());
                    next.push(chunk);
                }
            }
            current = next;
        }

        tracing::debug!(
            "hierarchy built: {} chunks total, {} leaves",
            chunks.len(),
            current.len()
        );

        Ok(Self {
            chunks,
            parent_of,
            child_count,
            leaves: current,
        })
    }

    pub fn leaves(&self) -> &[Chunk] {
        &self.leaves
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }
}

/// Character window split without chunk bookkeeping.
fn split_chars(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    if chars.is_empty() || size == 0 {
        return out;
    }
    let step = size.saturating_sub(overlap).max(1);
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        start += step;
    }
    out
}

/// Retriever that merges leaf hits into their hierarchical parents.
pub struct AutoMergingRetriever {
    base: Arc<dyn Retriever>,
    corpus: HierarchicalCorpus,
    merge_ratio: f32,
}

impl AutoMergingRetriever {
    /// Wrap an existing leaf retriever.
    pub fn new(base: Arc<dyn Retriever>, corpus: HierarchicalCorpus, merge_ratio: f32) -> Self {
        Self {
            base,
            corpus,
            merge_ratio,
        }
    }

    /// Build the hierarchy and a vector retriever over its leaves.
    pub fn build(
        documents: &[Document],
        embedder: Arc<dyn Embedder>,
        opts: HierarchyOptions,
    ) -> Result<Self> {
        let corpus = HierarchicalCorpus::build(documents, &opts)?;
        let base = VectorRetriever::build(
            corpus.leaves().to_vec(),
            embedder,
            HnswParams::default(),
        )?;
        Ok(Self::new(Arc::new(base), corpus, opts.merge_ratio))
    }

    /// One merge pass. Returns the merged list and whether anything
    /// changed.
    fn merge_once(&self, nodes: Vec<ScoredNode>) -> (Vec<ScoredNode>, bool) {
        let mut grouped: HashMap<&str, Vec<&ScoredNode>> = HashMap::new();
        for node in &nodes {
            if let Some(parent_id) = self.corpus.parent_of.get(&node.id) {
                grouped.entry(parent_id.as_str()).or_default().push(node);
            }
        }

        let mut promote: HashMap<String, f32> = HashMap::new();
        for (parent_id, children) in &grouped {
            let total = *self.corpus.child_count.get(*parent_id).unwrap_or(&usize::MAX);
            let fraction = children.len() as f32 / total as f32;
            if fraction >= self.merge_ratio {
                let mean = children.iter().map(|n| n.score).sum::<f32>() / children.len() as f32;
                promote.insert((*parent_id).to_string(), mean);
            }
        }

        if promote.is_empty() {
            return (nodes, false);
        }

        let mut merged: Vec<ScoredNode> = nodes
            .into_iter()
            .filter(|n| {
                self.corpus
                    .parent_of
                    .get(&n.id)
                    .map_or(true, |p| !promote.contains_key(p))
            })
            .collect();

        for (parent_id, score) in promote {
            if let Some(parent) = self.corpus.chunks.get(&parent_id) {
                tracing::debug!("merging children into parent {}", parent_id);
                merged.push(ScoredNode::new(parent.clone(), score, 0));
            }
        }

        (merged, true)
    }
}

impl Retriever for AutoMergingRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        let mut nodes = self.base.retrieve(query, top_k)?;

        // Merging can make new sibling groups eligible; iterate to a
        // fixpoint. Depth bounds the iteration count.
        loop {
            let (merged, changed) = self.merge_once(nodes);
            nodes = merged;
            if !changed {
                break;
            }
        }

        let scored = nodes.into_iter().map(|n| (n.chunk, n.score)).collect();
        Ok(rank_nodes(scored, top_k))
    }

    fn name(&self) -> &str {
        "auto-merging"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::testing::StaticRetriever;

    fn tiny_hierarchy() -> HierarchicalCorpus {
        // One document, two levels: one parent of ~4 leaves.
        let doc = Document::new("d1", "d1", "abcdefghijklmnopqrstuvwxyz0123456789");
        HierarchicalCorpus::build(
            &[doc],
            &HierarchyOptions {
                level_sizes: vec![40, 10],
                chunk_overlap: 0,
                merge_ratio: 0.5,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_hierarchy_shape() {
        let corpus = tiny_hierarchy();
        assert_eq!(corpus.leaves().len(), 4);
        assert_eq!(corpus.num_chunks(), 5);
        assert!(corpus
            .leaves()
            .iter()
            .all(|l| l.extra.contains_key("parent_id")));
    }

    #[test]
    fn test_merges_when_enough_children_hit() {
        let corpus = tiny_hierarchy();
        let leaf_ids: Vec<String> = corpus.leaves().iter().map(|c| c.id.clone()).collect();

        // Three of four children retrieved: above the 0.5 ratio.
        let base = StaticRetriever {
            label: "static".to_string(),
            nodes: corpus
                .leaves()
                .iter()
                .take(3)
                .enumerate()
                .map(|(i, c)| ScoredNode::new(c.clone(), 0.9 - i as f32 * 0.1, i + 1))
                .collect(),
        };

        let retriever = AutoMergingRetriever::new(Arc::new(base), corpus, 0.5);
        let results = retriever.retrieve("q", 10).unwrap();

        assert_eq!(results.len(), 1);
        assert!(!leaf_ids.contains(&results[0].id));
        assert_eq!(results[0].chunk.content.len(), 36);
        // Parent score is the mean of its merged children.
        assert!((results[0].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_no_merge_below_ratio() {
        let corpus = tiny_hierarchy();

        let base = StaticRetriever {
            label: "static".to_string(),
            nodes: corpus
                .leaves()
                .iter()
                .take(1)
                .map(|c| ScoredNode::new(c.clone(), 0.9, 1))
                .collect(),
        };

        let retriever = AutoMergingRetriever::new(Arc::new(base), corpus, 0.5);
        let results = retriever.retrieve("q", 10).unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].id.contains("_h1_"));
    }

    #[test]
    fn test_level_sizes_validated() {
        let doc = Document::new("d1", "d1", "text");
        assert!(HierarchicalCorpus::build(
            &[doc.clone()],
            &HierarchyOptions {
                level_sizes: vec![100],
                chunk_overlap: 0,
                merge_ratio: 0.5,
            }
        )
        .is_err());
        assert!(HierarchicalCorpus::build(
            &[doc],
            &HierarchyOptions {
                level_sizes: vec![100, 200],
                chunk_overlap: 0,
                merge_ratio: 0.5,
            }
        )
        .is_err());
    }
}
