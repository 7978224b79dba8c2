//! Query-fusion retrieval
//!
//! Expands the query into several variants through a transform seam,
//! runs every (retriever, variant) pair, and fuses the result lists
//! either by best weighted score or by reciprocal-rank fusion. The
//! sub-queries fan out on scoped threads and join before fusion.

use crate::error::ConfigError;
use crate::generation::{GenerationParams, Generator};
use crate::retrieval::{rank_nodes, Retriever, ScoredNode};
use crate::selection::content_tokens;
use anyhow::Result;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Standard RRF constant.
const RRF_K: f32 = 60.0;

/// How result lists are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionStrategy {
    /// Deduplicate by id, keep the best weighted score
    Simple,
    /// Reciprocal-rank fusion: score(d) = sum(w / (k + rank(d)))
    ReciprocalRank,
}

impl FromStr for FusionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "simple" => Ok(FusionStrategy::Simple),
            "reciprocal-rank" => Ok(FusionStrategy::ReciprocalRank),
            _ => Err(ConfigError::InvalidMode {
                field: "fusion strategy",
                value: s.to_string(),
                expected: "simple, reciprocal-rank",
            }),
        }
    }
}

/// Produces query variants for fan-out.
pub trait QueryTransform: Send + Sync {
    /// Return up to `num_queries` variants. The original query should
    /// be among them.
    fn expand(&self, query: &str, num_queries: usize) -> Result<Vec<String>>;
}

/// No expansion: the original query only.
#[derive(Debug, Default)]
pub struct IdentityTransform;

impl QueryTransform for IdentityTransform {
    fn expand(&self, query: &str, _num_queries: usize) -> Result<Vec<String>> {
        Ok(vec![query.to_string()])
    }
}

/// Deterministic model-free expansion: the original query, its content
/// tokens, and per-token probes for the rarest-looking terms.
#[derive(Debug, Default)]
pub struct KeywordVariantTransform;

impl QueryTransform for KeywordVariantTransform {
    fn expand(&self, query: &str, num_queries: usize) -> Result<Vec<String>> {
        let mut variants = vec![query.to_string()];

        let tokens = content_tokens(query);
        let stripped = tokens.join(" ");
        if !stripped.is_empty() && stripped != query.to_lowercase() {
            variants.push(stripped);
        }

        // Longest tokens first as single-term probes.
        let mut by_len = tokens;
        by_len.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        for token in by_len {
            if variants.len() == num_queries {
                break;
            }
            if !variants.contains(&token) {
                variants.push(token);
            }
        }

        variants.truncate(num_queries.max(1));
        Ok(variants)
    }
}

/// Expansion through the generation seam: one variant per output line.
pub struct GenerativeQueryTransform {
    generator: Arc<dyn Generator>,
}

impl GenerativeQueryTransform {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

impl QueryTransform for GenerativeQueryTransform {
    fn expand(&self, query: &str, num_queries: usize) -> Result<Vec<String>> {
        if num_queries <= 1 {
            return Ok(vec![query.to_string()]);
        }

        let prompt = format!(
            "Generate {} search queries, one per line, related to the \
             following input query.\nQuery: {}\nQueries:\n",
            num_queries - 1,
            query
        );
        let output = self.generator.generate(&prompt, &GenerationParams::default())?;

        let mut variants = vec![query.to_string()];
        for line in output.lines() {
            let line = line.trim();
            if !line.is_empty() && !variants.iter().any(|v| v == line) {
                variants.push(line.to_string());
            }
            if variants.len() == num_queries {
                break;
            }
        }
        Ok(variants)
    }
}

/// Multi-retriever, multi-query fusion retriever.
pub struct QueryFusionRetriever {
    retrievers: Vec<Arc<dyn Retriever>>,
    weights: Vec<f32>,
    transform: Arc<dyn QueryTransform>,
    strategy: FusionStrategy,
    num_queries: usize,
}

impl QueryFusionRetriever {
    /// Uniform weights over `retrievers`.
    pub fn new(
        retrievers: Vec<Arc<dyn Retriever>>,
        transform: Arc<dyn QueryTransform>,
        strategy: FusionStrategy,
        num_queries: usize,
    ) -> Result<Self, ConfigError> {
        let n = retrievers.len();
        Self::with_weights(retrievers, vec![1.0 / n.max(1) as f32; n], transform, strategy, num_queries)
    }

    /// Explicit per-retriever weights.
    pub fn with_weights(
        retrievers: Vec<Arc<dyn Retriever>>,
        weights: Vec<f32>,
        transform: Arc<dyn QueryTransform>,
        strategy: FusionStrategy,
        num_queries: usize,
    ) -> Result<Self, ConfigError> {
        if retrievers.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "query fusion retrievers",
                reason: "at least one retriever is required".to_string(),
            });
        }
        if weights.len() != retrievers.len() {
            return Err(ConfigError::InvalidValue {
                field: "query fusion weights",
                reason: format!(
                    "{} weights for {} retrievers",
                    weights.len(),
                    retrievers.len()
                ),
            });
        }
        if num_queries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "num_queries",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            retrievers,
            weights,
            transform,
            strategy,
            num_queries,
        })
    }

    /// Fuse per-(retriever, variant) result lists.
    fn fuse(&self, lists: Vec<(usize, Vec<ScoredNode>)>, top_k: usize) -> Vec<ScoredNode> {
        let mut fused: HashMap<String, (ScoredNode, f32)> = HashMap::new();

        for (retriever_idx, nodes) in lists {
            let weight = self.weights[retriever_idx];
            for node in nodes {
                let contribution = match self.strategy {
                    FusionStrategy::Simple => weight * node.score,
                    FusionStrategy::ReciprocalRank => weight / (RRF_K + node.rank as f32),
                };
                fused
                    .entry(node.id.clone())
                    .and_modify(|(_, score)| match self.strategy {
                        FusionStrategy::Simple => *score = score.max(contribution),
                        FusionStrategy::ReciprocalRank => *score += contribution,
                    })
                    .or_insert((node, contribution));
            }
        }

        let scored = fused
            .into_values()
            .map(|(node, score)| (node.chunk, score))
            .collect();
        rank_nodes(scored, top_k)
    }
}

impl Retriever for QueryFusionRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        let variants = self.transform.expand(query, self.num_queries)?;
        tracing::debug!(
            "query fusion: {} retrievers x {} variants",
            self.retrievers.len(),
            variants.len()
        );

        // Over-fetch per sub-query so fusion has candidates to work with.
        let fetch_k = top_k * 2;

        let mut lists: Vec<(usize, Vec<ScoredNode>)> = Vec::new();
        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for (idx, retriever) in self.retrievers.iter().enumerate() {
                for variant in &variants {
                    let retriever = Arc::clone(retriever);
                    handles.push((
                        idx,
                        scope.spawn(move || retriever.retrieve(variant, fetch_k)),
                    ));
                }
            }
            for (idx, handle) in handles {
                match handle.join() {
                    Ok(Ok(nodes)) => lists.push((idx, nodes)),
                    Ok(Err(e)) => {
                        tracing::warn!("sub-query against retriever {} failed: {}", idx, e)
                    }
                    Err(_) => tracing::warn!("sub-query thread panicked"),
                }
            }
        });

        if lists.is_empty() {
            anyhow::bail!("every query-fusion sub-query failed");
        }

        Ok(self.fuse(lists, top_k))
    }

    fn name(&self) -> &str {
        "query-fusion"
    }
}
