//! Summary-index retrieval
//!
//! Two flavors: [`SummaryRetriever`] works over the flat chunk list
//! (passthrough, embedding-ranked, or generative choice), and
//! [`DocumentSummaryRetriever`] summarizes each document at build time,
//! picks relevant documents at query time, and returns their chunks.

use crate::data::Chunk;
use crate::embedding::{cosine_similarity, Embedder, Embedding};
use crate::error::ConfigError;
use crate::generation::{GenerationParams, Generator};
use crate::retrieval::{rank_nodes, Retriever, ScoredNode};
use crate::selection::Selector;
use anyhow::Result;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// How the summary retriever ranks its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    /// Return nodes in corpus order
    Normal,
    /// Rank nodes by embedding similarity
    Embedding,
    /// Let the selection seam choose relevant nodes
    Generative,
}

impl FromStr for SummaryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(SummaryMode::Normal),
            "embed" => Ok(SummaryMode::Embedding),
            "llm" | "generative" => Ok(SummaryMode::Generative),
            _ => Err(ConfigError::InvalidMode {
                field: "summary mode",
                value: s.to_string(),
                expected: "normal, embed, llm",
            }),
        }
    }
}

/// List-style summary retriever.
pub struct SummaryRetriever {
    chunks: Vec<Chunk>,
    embeddings: Vec<Embedding>,
    embedder: Arc<dyn Embedder>,
    selector: Arc<dyn Selector>,
    mode: SummaryMode,
}

impl SummaryRetriever {
    pub fn build(
        chunks: Vec<Chunk>,
        mode: SummaryMode,
        embedder: Arc<dyn Embedder>,
        selector: Arc<dyn Selector>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            anyhow::bail!("cannot build a summary index from zero chunks");
        }

        // Embeddings are only needed for the embedding mode, but they
        // are cheap with the hashing backend and keep mode switches
        // from invalidating the index.
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts)?;

        Ok(Self {
            chunks,
            embeddings,
            embedder,
            selector,
            mode,
        })
    }

    pub fn mode(&self) -> SummaryMode {
        self.mode
    }
}

impl Retriever for SummaryRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        match self.mode {
            SummaryMode::Normal => Ok(self
                .chunks
                .iter()
                .take(top_k)
                .enumerate()
                .map(|(i, c)| ScoredNode::new(c.clone(), 1.0, i + 1))
                .collect()),

            SummaryMode::Embedding => {
                let query_embedding = self.embedder.embed(query)?;
                let scored = self
                    .chunks
                    .iter()
                    .zip(&self.embeddings)
                    .map(|(c, e)| (c.clone(), cosine_similarity(&query_embedding, e)))
                    .collect();
                Ok(rank_nodes(scored, top_k))
            }

            SummaryMode::Generative => {
                let candidates: Vec<&str> = self.chunks.iter().map(|c| c.content.as_str()).collect();
                let picks = self.selector.select(query, &candidates, top_k)?;
                Ok(picks
                    .into_iter()
                    .enumerate()
                    .map(|(rank, (i, score))| ScoredNode::new(self.chunks[i].clone(), score, rank + 1))
                    .collect())
            }
        }
    }

    fn name(&self) -> &str {
        "summary"
    }
}

/// Options for the document-summary retriever.
#[derive(Debug, Clone)]
pub struct DocSummaryOptions {
    /// Rank document summaries by embedding or generative choice
    pub mode: SummaryMode,
    /// Candidates per generative choice round
    pub choice_batch_size: usize,
    /// Documents to keep
    pub choice_top_k: usize,
    /// Characters of document text fed to the summarizer
    pub summary_input_chars: usize,
}

impl Default for DocSummaryOptions {
    fn default() -> Self {
        Self {
            mode: SummaryMode::Embedding,
            choice_batch_size: 10,
            choice_top_k: 1,
            summary_input_chars: 2000,
        }
    }
}

struct DocEntry {
    summary: String,
    summary_embedding: Embedding,
    chunks: Vec<Chunk>,
}

/// Per-document summary retriever: documents are summarized once at
/// build time; queries pick documents by summary relevance and return
/// all chunks of the winners.
pub struct DocumentSummaryRetriever {
    docs: Vec<DocEntry>,
    embedder: Arc<dyn Embedder>,
    selector: Arc<dyn Selector>,
    opts: DocSummaryOptions,
}

impl DocumentSummaryRetriever {
    pub fn build(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        selector: Arc<dyn Selector>,
        opts: DocSummaryOptions,
    ) -> Result<Self> {
        if chunks.is_empty() {
            anyhow::bail!("cannot build a document-summary index from zero chunks");
        }
        if opts.mode == SummaryMode::Normal {
            anyhow::bail!("document-summary retrieval needs an embed or llm choice mode");
        }

        let mut by_doc: BTreeMap<String, Vec<Chunk>> = BTreeMap::new();
        for chunk in chunks {
            by_doc.entry(chunk.document_id.clone()).or_default().push(chunk);
        }

        let mut docs = Vec::with_capacity(by_doc.len());
        for (doc_id, mut doc_chunks) in by_doc {
            doc_chunks.sort_by_key(|c| c.seq);
            let mut text: String = doc_chunks
                .iter()
                .map(|c| c.content.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            if text.len() > opts.summary_input_chars {
                text.truncate(opts.summary_input_chars);
            }

            let prompt = format!("Context:\n{}\n\nSummarize the context in a few sentences.", text);
            let summary = generator.generate(&prompt, &GenerationParams::default())?;
            tracing::debug!("summarized document {} ({} chars)", doc_id, summary.len());

            let summary_embedding = embedder.embed(&summary)?;
            docs.push(DocEntry {
                summary,
                summary_embedding,
                chunks: doc_chunks,
            });
        }

        Ok(Self {
            docs,
            embedder,
            selector,
            opts,
        })
    }

    /// Rank documents by summary relevance, best first.
    fn choose_documents(&self, query: &str) -> Result<Vec<(usize, f32)>> {
        match self.opts.mode {
            SummaryMode::Embedding => {
                let query_embedding = self.embedder.embed(query)?;
                let mut scored: Vec<(usize, f32)> = self
                    .docs
                    .iter()
                    .enumerate()
                    .map(|(i, d)| (i, cosine_similarity(&query_embedding, &d.summary_embedding)))
                    .collect();
                scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                scored.truncate(self.opts.choice_top_k);
                Ok(scored)
            }
            SummaryMode::Generative => {
                // Batched choice: pick within each batch, then keep the
                // best across batches.
                let mut picks: Vec<(usize, f32)> = Vec::new();
                for (batch_idx, batch) in self
                    .docs
                    .chunks(self.opts.choice_batch_size.max(1))
                    .enumerate()
                {
                    let candidates: Vec<&str> = batch.iter().map(|d| d.summary.as_str()).collect();
                    let base = batch_idx * self.opts.choice_batch_size.max(1);
                    for (i, score) in
                        self.selector.select(query, &candidates, self.opts.choice_top_k)?
                    {
                        picks.push((base + i, score));
                    }
                }
                picks.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                picks.truncate(self.opts.choice_top_k);
                Ok(picks)
            }
            SummaryMode::Normal => unreachable!("rejected at build time"),
        }
    }
}

impl Retriever for DocumentSummaryRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        let mut nodes = Vec::new();
        for (doc_idx, doc_score) in self.choose_documents(query)? {
            for chunk in &self.docs[doc_idx].chunks {
                nodes.push((chunk.clone(), doc_score));
                if nodes.len() == top_k {
                    return Ok(rank_nodes(nodes, top_k));
                }
            }
        }
        Ok(rank_nodes(nodes, top_k))
    }

    fn name(&self) -> &str {
        "document-summary"
    }
}
