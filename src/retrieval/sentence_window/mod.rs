//! Sentence-window retrieval
//!
//! Indexes one node per sentence so matching stays precise, then swaps
//! each hit's content for the window of surrounding sentences stored in
//! its metadata, so synthesis sees enough context.

use crate::data::{sentence_window_chunks, Document};
use crate::embedding::Embedder;
use crate::postprocess::{MetadataReplacement, NodePostprocessor};
use crate::retrieval::{HnswParams, Retriever, ScoredNode, VectorRetriever};
use anyhow::Result;
use std::sync::Arc;

/// Sentence-window retriever over a vector index of sentences.
pub struct SentenceWindowRetriever {
    inner: VectorRetriever,
    replacement: MetadataReplacement,
}

impl SentenceWindowRetriever {
    /// Split documents into per-sentence nodes with `window_size`
    /// sentences of context on each side and index them.
    pub fn build(
        documents: &[Document],
        window_size: usize,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        if documents.is_empty() {
            anyhow::bail!("cannot build a sentence-window index from zero documents");
        }

        let mut nodes = Vec::new();
        for doc in documents {
            nodes.extend(sentence_window_chunks(doc, window_size));
        }
        if nodes.is_empty() {
            anyhow::bail!("documents contained no sentences");
        }
        tracing::debug!("sentence-window index: {} sentence nodes", nodes.len());

        let inner = VectorRetriever::build(nodes, embedder, HnswParams::default())?;
        Ok(Self {
            inner,
            replacement: MetadataReplacement::new("window"),
        })
    }
}

impl Retriever for SentenceWindowRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        let hits = self.inner.retrieve(query, top_k)?;
        Ok(self.replacement.process(hits))
    }

    fn name(&self) -> &str {
        "sentence-window"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingOptions, HashingEmbedder};

    #[test]
    fn test_hits_carry_window() {
        let doc = Document::new(
            "d1",
            "d1",
            "The tide was low. The harbor seals rested. Fishing boats waited offshore. Gulls circled the pier.",
        );
        let retriever = SentenceWindowRetriever::build(
            &[doc],
            1,
            Arc::new(HashingEmbedder::new(EmbeddingOptions::default())),
        )
        .unwrap();

        let results = retriever.retrieve("harbor seals resting", 1).unwrap();
        assert_eq!(results.len(), 1);
        // Content was widened to the window around the matched sentence.
        assert!(results[0].chunk.content.contains("harbor seals"));
        assert!(results[0].chunk.content.contains("tide was low"));
        // The exact sentence is preserved separately.
        assert_eq!(
            results[0].chunk.extra.get("original_text").map(String::as_str),
            Some("The harbor seals rested.")
        );
    }

    #[test]
    fn test_empty_documents_rejected() {
        let err = SentenceWindowRetriever::build(
            &[],
            1,
            Arc::new(HashingEmbedder::new(EmbeddingOptions::default())),
        );
        assert!(err.is_err());
    }
}
