//! Retriever dispatch
//!
//! Maps a retriever-type label plus a [`RetrieverConfig`] bundle onto a
//! built retriever over a chunk corpus. Labels and every sub-mode
//! string parse fail-fast; an unknown label is an error, not a default.

use crate::config::RetrieverConfig;
use crate::data::{documents_from_chunks, Chunk};
use crate::embedding::Embedder;
use crate::error::ConfigError;
use crate::generation::Generator;
use crate::retrieval::{
    AutoMergingRetriever, Bm25Retriever, DocSummaryOptions, DocumentSummaryRetriever,
    FusionStrategy, HierarchyOptions, HnswParams, KeywordTableRetriever, KeywordVariantTransform,
    QueryFusionRetriever, RecursiveOptions, RecursiveRetriever, Retriever,
    SentenceWindowRetriever, SetFusionRetriever, SummaryMode, SummaryRetriever, TreeRetriever,
    VectorRetriever,
};
use crate::selection::{GenerativeSelector, Selector, TokenOverlapSelector};
use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;

/// Supported retriever-type labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieverKind {
    Bm25,
    Vector,
    Keyword,
    Summary,
    DocumentSummary,
    Tree,
    SetFusion,
    QueryFusion,
    AutoMerging,
    Recursive,
    SentenceWindow,
}

impl RetrieverKind {
    pub const ALL: [RetrieverKind; 11] = [
        RetrieverKind::Bm25,
        RetrieverKind::Vector,
        RetrieverKind::Keyword,
        RetrieverKind::Summary,
        RetrieverKind::DocumentSummary,
        RetrieverKind::Tree,
        RetrieverKind::SetFusion,
        RetrieverKind::QueryFusion,
        RetrieverKind::AutoMerging,
        RetrieverKind::Recursive,
        RetrieverKind::SentenceWindow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrieverKind::Bm25 => "bm25",
            RetrieverKind::Vector => "vector",
            RetrieverKind::Keyword => "keyword",
            RetrieverKind::Summary => "summary",
            RetrieverKind::DocumentSummary => "document-summary",
            RetrieverKind::Tree => "tree",
            RetrieverKind::SetFusion => "set-fusion",
            RetrieverKind::QueryFusion => "query-fusion",
            RetrieverKind::AutoMerging => "auto-merging",
            RetrieverKind::Recursive => "recursive",
            RetrieverKind::SentenceWindow => "sentence-window",
        }
    }
}

impl FromStr for RetrieverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .find(|k| k.as_str() == normalized)
            .copied()
            .ok_or_else(|| ConfigError::UnsupportedRetriever(s.to_string()))
    }
}

impl std::fmt::Display for RetrieverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds retrievers over one chunk corpus.
///
/// Holds the corpus together with the embedding, generation, and
/// selection seams so each label maps to a fully wired retriever.
pub struct RetrieverFactory {
    chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    config: RetrieverConfig,
}

impl RetrieverFactory {
    pub fn new(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            chunks,
            embedder,
            generator,
            config,
        }
    }

    /// The retrieve-time depth configured for a retriever kind.
    pub fn default_top_k(&self, kind: RetrieverKind) -> usize {
        match kind {
            RetrieverKind::Bm25 => self.config.bm25.top_k,
            RetrieverKind::Vector => self.config.vector.top_k,
            RetrieverKind::Keyword => self.config.keyword.top_k,
            RetrieverKind::Summary => self.config.summary.top_k,
            RetrieverKind::DocumentSummary => self.config.summary.top_k,
            RetrieverKind::Tree => self.config.tree.top_k,
            RetrieverKind::SetFusion => self.config.set_fusion.top_k,
            RetrieverKind::QueryFusion => self.config.query_fusion.top_k,
            RetrieverKind::AutoMerging => self.config.auto_merging.top_k,
            RetrieverKind::Recursive => self.config.recursive.top_k,
            RetrieverKind::SentenceWindow => self.config.sentence_window.top_k,
        }
    }

    /// Selector used by the generative modes: token overlap unless the
    /// mode string asks for the generation seam.
    fn selector_for(&self, mode: SummaryMode) -> Arc<dyn Selector> {
        match mode {
            SummaryMode::Generative => Arc::new(GenerativeSelector::new(Arc::clone(&self.generator))),
            _ => Arc::new(TokenOverlapSelector),
        }
    }

    fn bm25(&self) -> Result<Arc<dyn Retriever>> {
        Ok(Arc::new(Bm25Retriever::build_in_memory(self.chunks.clone())?))
    }

    fn vector(&self) -> Result<Arc<dyn Retriever>> {
        Ok(Arc::new(VectorRetriever::build(
            self.chunks.clone(),
            Arc::clone(&self.embedder),
            HnswParams::default(),
        )?))
    }

    fn keyword(&self) -> Result<Arc<dyn Retriever>> {
        Ok(Arc::new(KeywordTableRetriever::build(
            self.chunks.clone(),
            self.config.keyword.max_keywords_per_chunk,
        )?))
    }

    /// Build the retriever for a label.
    pub fn build(&self, kind: RetrieverKind) -> Result<Arc<dyn Retriever>> {
        tracing::info!("building {} retriever over {} chunks", kind, self.chunks.len());

        match kind {
            RetrieverKind::Bm25 => self.bm25(),
            RetrieverKind::Vector => self.vector(),
            RetrieverKind::Keyword => self.keyword(),

            RetrieverKind::Summary => {
                let mode: SummaryMode = self.config.summary.mode.parse()?;
                Ok(Arc::new(SummaryRetriever::build(
                    self.chunks.clone(),
                    mode,
                    Arc::clone(&self.embedder),
                    self.selector_for(mode),
                )?))
            }

            RetrieverKind::DocumentSummary => {
                let mode: SummaryMode = self.config.doc_summary.mode.parse()?;
                Ok(Arc::new(DocumentSummaryRetriever::build(
                    self.chunks.clone(),
                    Arc::clone(&self.embedder),
                    Arc::clone(&self.generator),
                    self.selector_for(mode),
                    DocSummaryOptions {
                        mode,
                        choice_batch_size: self.config.doc_summary.choice_batch_size,
                        choice_top_k: self.config.doc_summary.choice_top_k,
                        ..Default::default()
                    },
                )?))
            }

            RetrieverKind::Tree => {
                let mode = self.config.tree.mode.parse()?;
                Ok(Arc::new(TreeRetriever::build(
                    self.chunks.clone(),
                    mode,
                    self.config.tree.branching,
                    Arc::clone(&self.embedder),
                    Arc::clone(&self.generator),
                    Arc::new(TokenOverlapSelector),
                )?))
            }

            RetrieverKind::SetFusion => {
                let partner: Arc<dyn Retriever> =
                    match self.config.set_fusion.partner.to_ascii_lowercase().as_str() {
                        "bm25" => self.bm25()?,
                        "keyword" => self.keyword()?,
                        other => {
                            return Err(ConfigError::InvalidMode {
                                field: "set fusion partner",
                                value: other.to_string(),
                                expected: "bm25, keyword",
                            }
                            .into())
                        }
                    };
                Ok(Arc::new(SetFusionRetriever::with_mode_str(
                    self.vector()?,
                    partner,
                    &self.config.set_fusion.mode,
                )?))
            }

            RetrieverKind::QueryFusion => {
                let strategy: FusionStrategy = self.config.query_fusion.strategy.parse()?;
                let retrievers = vec![self.vector()?, self.bm25()?];
                let fusion = match &self.config.query_fusion.weights {
                    Some(weights) => QueryFusionRetriever::with_weights(
                        retrievers,
                        weights.clone(),
                        Arc::new(KeywordVariantTransform),
                        strategy,
                        self.config.query_fusion.num_queries,
                    )?,
                    None => QueryFusionRetriever::new(
                        retrievers,
                        Arc::new(KeywordVariantTransform),
                        strategy,
                        self.config.query_fusion.num_queries,
                    )?,
                };
                Ok(Arc::new(fusion))
            }

            RetrieverKind::AutoMerging => {
                let documents = documents_from_chunks(&self.chunks);
                Ok(Arc::new(AutoMergingRetriever::build(
                    &documents,
                    Arc::clone(&self.embedder),
                    HierarchyOptions {
                        level_sizes: self.config.auto_merging.level_sizes.clone(),
                        chunk_overlap: self.config.auto_merging.chunk_overlap,
                        merge_ratio: self.config.auto_merging.merge_ratio,
                    },
                )?))
            }

            RetrieverKind::Recursive => Ok(Arc::new(RecursiveRetriever::build(
                self.chunks.clone(),
                Arc::clone(&self.embedder),
                RecursiveOptions {
                    sub_chunk_sizes: self.config.recursive.sub_chunk_sizes.clone(),
                    chunk_overlap: self.config.recursive.chunk_overlap,
                },
            )?)),

            RetrieverKind::SentenceWindow => {
                let documents = documents_from_chunks(&self.chunks);
                Ok(Arc::new(SentenceWindowRetriever::build(
                    &documents,
                    self.config.sentence_window.window_size,
                    Arc::clone(&self.embedder),
                )?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingOptions, HashingEmbedder};
    use crate::generation::ExtractiveGenerator;
    use crate::retrieval::testing::corpus;

    fn factory(config: RetrieverConfig) -> RetrieverFactory {
        RetrieverFactory::new(
            corpus(),
            Arc::new(HashingEmbedder::new(EmbeddingOptions::default())),
            Arc::new(ExtractiveGenerator::default()),
            config,
        )
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!("bm25".parse::<RetrieverKind>().unwrap(), RetrieverKind::Bm25);
        assert_eq!(
            "query_fusion".parse::<RetrieverKind>().unwrap(),
            RetrieverKind::QueryFusion
        );
        assert_eq!(
            "Sentence-Window".parse::<RetrieverKind>().unwrap(),
            RetrieverKind::SentenceWindow
        );

        let err = "bm42".parse::<RetrieverKind>().err().unwrap();
        assert_eq!(err, ConfigError::UnsupportedRetriever("bm42".to_string()));
    }

    #[test]
    fn test_every_label_builds_and_retrieves() {
        let f = factory(RetrieverConfig::default());
        for kind in RetrieverKind::ALL {
            let retriever = f.build(kind).unwrap();
            let results = retriever
                .retrieve("borrow checker memory safety", f.default_top_k(kind))
                .unwrap();
            // Mode defaults make some retrievers return summaries or
            // nothing for an off-corpus query; building and running
            // without error is the contract here.
            for node in results {
                assert!(node.score.is_finite());
            }
        }
    }

    #[test]
    fn test_bad_submode_fails_before_build() {
        let mut config = RetrieverConfig::default();
        config.summary.mode = "psychic".to_string();
        let err = factory(config).build(RetrieverKind::Summary).err().unwrap();
        assert!(err.to_string().contains("summary mode"));
    }

    #[test]
    fn test_bad_fusion_mode_fails() {
        let mut config = RetrieverConfig::default();
        config.set_fusion.mode = "xor".to_string();
        let err = factory(config).build(RetrieverKind::SetFusion).err().unwrap();
        assert!(err.to_string().contains("fusion mode"));
    }

    #[test]
    fn test_set_fusion_keyword_partner() {
        let mut config = RetrieverConfig::default();
        config.set_fusion.partner = "keyword".to_string();
        config.set_fusion.mode = "or".to_string();
        let retriever = factory(config).build(RetrieverKind::SetFusion).unwrap();
        assert_eq!(retriever.name(), "set-fusion-or");
    }
}
