//! Retriever configuration bundle
//!
//! One struct with a section per retriever type, serde-deserializable
//! so a JSON file can drive the factory. Mode fields stay strings here
//! and are parsed into their enums fail-fast when a retriever is built.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Config {
    pub top_k: usize,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub top_k: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub top_k: usize,
    /// Keywords contributed per chunk at build time
    pub max_keywords_per_chunk: usize,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_keywords_per_chunk: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// "normal", "embed", or "llm"
    pub mode: String,
    pub top_k: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            mode: "normal".to_string(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocSummaryConfig {
    /// "embed" or "llm"
    pub mode: String,
    pub choice_batch_size: usize,
    pub choice_top_k: usize,
}

impl Default for DocSummaryConfig {
    fn default() -> Self {
        Self {
            mode: "embed".to_string(),
            choice_batch_size: 10,
            choice_top_k: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// "root", "all-leaf", "select-leaf", or "select-leaf-embedding"
    pub mode: String,
    /// Children per parent when building the tree
    pub branching: usize,
    pub top_k: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            mode: "root".to_string(),
            branching: 10,
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetFusionConfig {
    /// "and" or "or"
    pub mode: String,
    /// Second leg next to the vector retriever: "bm25" or "keyword"
    pub partner: String,
    pub top_k: usize,
}

impl Default for SetFusionConfig {
    fn default() -> Self {
        Self {
            mode: "and".to_string(),
            partner: "bm25".to_string(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFusionConfig {
    /// "simple" or "reciprocal-rank"
    pub strategy: String,
    /// Query variants fanned out per retriever
    pub num_queries: usize,
    /// Per-retriever weights; uniform when absent
    pub weights: Option<Vec<f32>>,
    pub top_k: usize,
}

impl Default for QueryFusionConfig {
    fn default() -> Self {
        Self {
            strategy: "simple".to_string(),
            num_queries: 4,
            weights: None,
            top_k: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoMergingConfig {
    /// Hierarchy chunk sizes, largest first
    pub level_sizes: Vec<usize>,
    pub chunk_overlap: usize,
    /// Fraction of siblings that must hit before merging into the parent
    pub merge_ratio: f32,
    pub top_k: usize,
}

impl Default for AutoMergingConfig {
    fn default() -> Self {
        Self {
            level_sizes: vec![2048, 512, 128],
            chunk_overlap: 20,
            merge_ratio: 0.5,
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecursiveConfig {
    pub sub_chunk_sizes: Vec<usize>,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for RecursiveConfig {
    fn default() -> Self {
        Self {
            sub_chunk_sizes: vec![128, 256, 512],
            chunk_overlap: 20,
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentenceWindowConfig {
    /// Sentences of context on each side of a hit
    pub window_size: usize,
    pub top_k: usize,
}

impl Default for SentenceWindowConfig {
    fn default() -> Self {
        Self {
            window_size: 3,
            top_k: default_top_k(),
        }
    }
}

/// Configuration bundle read by the retriever factory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub bm25: Bm25Config,
    pub vector: VectorConfig,
    pub keyword: KeywordConfig,
    pub summary: SummaryConfig,
    pub doc_summary: DocSummaryConfig,
    pub tree: TreeConfig,
    pub set_fusion: SetFusionConfig,
    pub query_fusion: QueryFusionConfig,
    pub auto_merging: AutoMergingConfig,
    pub recursive: RecursiveConfig,
    pub sentence_window: SentenceWindowConfig,
}

impl RetrieverConfig {
    /// Load from a JSON file. Missing sections take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {:?}", path))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse config {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RetrieverConfig::default();
        assert_eq!(config.bm25.top_k, 3);
        assert_eq!(config.query_fusion.num_queries, 4);
        assert_eq!(config.recursive.sub_chunk_sizes, vec![128, 256, 512]);
        assert_eq!(config.doc_summary.choice_top_k, 1);
        assert_eq!(config.set_fusion.mode, "and");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: RetrieverConfig =
            serde_json::from_str(r#"{"bm25": {"top_k": 7}, "tree": {"mode": "select-leaf"}}"#)
                .unwrap();

        assert_eq!(config.bm25.top_k, 7);
        assert_eq!(config.tree.mode, "select-leaf");
        assert_eq!(config.tree.branching, 10);
        assert_eq!(config.vector.top_k, 3);
    }
}
