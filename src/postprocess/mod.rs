//! Node postprocessors
//!
//! Applied to a result list between retrieval and synthesis: filter by
//! score, reorder for long-context models, or swap chunk content for a
//! metadata field.

use crate::retrieval::ScoredNode;

/// Transform applied to retrieved nodes before synthesis.
pub trait NodePostprocessor: Send + Sync {
    fn process(&self, nodes: Vec<ScoredNode>) -> Vec<ScoredNode>;

    fn name(&self) -> &str;
}

/// Drop nodes scoring below a cutoff.
#[derive(Debug, Clone)]
pub struct SimilarityCutoff {
    pub min_score: f32,
}

impl NodePostprocessor for SimilarityCutoff {
    fn process(&self, nodes: Vec<ScoredNode>) -> Vec<ScoredNode> {
        nodes
            .into_iter()
            .filter(|n| n.score >= self.min_score)
            .collect()
    }

    fn name(&self) -> &str {
        "similarity-cutoff"
    }
}

/// Reorder so the strongest nodes sit at both ends of the context.
///
/// Long-context models attend most to the beginning and end of their
/// input; burying the best evidence in the middle wastes it. Best
/// node first, second-best last, and so on inward.
#[derive(Debug, Clone, Default)]
pub struct LongContextReorder;

impl NodePostprocessor for LongContextReorder {
    fn process(&self, mut nodes: Vec<ScoredNode>) -> Vec<ScoredNode> {
        nodes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut front = Vec::with_capacity(nodes.len());
        let mut back = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            if i % 2 == 0 {
                front.push(node);
            } else {
                back.push(node);
            }
        }
        back.reverse();
        front.extend(back);
        front
    }

    fn name(&self) -> &str {
        "long-context-reorder"
    }
}

/// Replace each node's content with one of its metadata fields, when
/// present. Used by sentence-window retrieval to widen hits.
#[derive(Debug, Clone)]
pub struct MetadataReplacement {
    pub target_key: String,
}

impl MetadataReplacement {
    pub fn new(target_key: &str) -> Self {
        Self {
            target_key: target_key.to_string(),
        }
    }
}

impl NodePostprocessor for MetadataReplacement {
    fn process(&self, mut nodes: Vec<ScoredNode>) -> Vec<ScoredNode> {
        for node in &mut nodes {
            if let Some(replacement) = node.chunk.extra.get(&self.target_key) {
                node.chunk.content = replacement.clone();
            }
        }
        nodes
    }

    fn name(&self) -> &str {
        "metadata-replacement"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Chunk;

    fn node(id: &str, score: f32) -> ScoredNode {
        ScoredNode::new(Chunk::new(id, "d", format!("text {}", id), 0, 0, 0), score, 1)
    }

    #[test]
    fn test_similarity_cutoff() {
        let nodes = vec![node("a", 0.9), node("b", 0.4), node("c", 0.6)];
        let kept = SimilarityCutoff { min_score: 0.5 }.process(nodes);

        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|n| n.score >= 0.5));
    }

    #[test]
    fn test_long_context_reorder_edges() {
        let nodes = vec![node("a", 0.5), node("b", 0.9), node("c", 0.1), node("d", 0.7)];
        let reordered = LongContextReorder.process(nodes);

        // Best first, second-best last, weakest in the middle.
        assert_eq!(reordered.first().unwrap().id, "b");
        assert_eq!(reordered.last().unwrap().id, "d");
        assert_eq!(reordered[1].id, "a");
        assert_eq!(reordered[2].id, "c");
    }

    #[test]
    fn test_metadata_replacement() {
        let mut n = node("a", 1.0);
        n.chunk.extra.insert("window".to_string(), "wider context".to_string());
        let plain = node("b", 1.0);

        let out = MetadataReplacement::new("window").process(vec![n, plain]);
        assert_eq!(out[0].chunk.content, "wider context");
        assert_eq!(out[1].chunk.content, "text b");
    }
}
