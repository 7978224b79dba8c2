//! Query engine assembly
//!
//! A [`RetrieverQueryEngine`] wires a retriever, node postprocessors,
//! and a response synthesizer into one `query()` call. A
//! [`RouterQueryEngine`] fronts several engines and routes each query
//! to the one whose description fits best.

use crate::postprocess::NodePostprocessor;
use crate::retrieval::{Retriever, ScoredNode};
use crate::selection::Selector;
use crate::synthesis::ResponseSynthesizer;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Query input.
#[derive(Debug, Clone)]
pub struct Query {
    /// The user's question
    pub text: String,
    /// Retrieval depth
    pub top_k: usize,
}

impl Query {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            top_k: 5,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// Source reference returned with an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f32,
    pub snippet: String,
}

/// Engine output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Synthesized answer; empty in no-text mode
    pub answer: String,
    /// Sources backing the answer, in post-processing order
    pub sources: Vec<Source>,
    pub retrieval_ms: u64,
    pub synthesis_ms: u64,
}

impl std::fmt::Display for QueryResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Answer: {}", self.answer)?;
        writeln!(f, "\nSources ({}):", self.sources.len())?;
        for (i, source) in self.sources.iter().enumerate() {
            writeln!(
                f,
                "  [{}] {} (score: {:.4})",
                i + 1,
                source.document_id,
                source.score
            )?;
        }
        write!(
            f,
            "\nTiming: retrieval={}ms, synthesis={}ms",
            self.retrieval_ms, self.synthesis_ms
        )
    }
}

/// Retriever + postprocessors + synthesizer.
pub struct RetrieverQueryEngine {
    retriever: Arc<dyn Retriever>,
    synthesizer: ResponseSynthesizer,
    postprocessors: Vec<Box<dyn NodePostprocessor>>,
}

impl RetrieverQueryEngine {
    pub fn builder() -> RetrieverQueryEngineBuilder {
        RetrieverQueryEngineBuilder::default()
    }

    /// Run the full pipeline for one query.
    pub fn query(&self, query: &Query) -> Result<QueryResponse> {
        let retrieval_start = Instant::now();
        let mut nodes = self.retriever.retrieve(&query.text, query.top_k)?;
        let retrieval_ms = retrieval_start.elapsed().as_millis() as u64;

        for postprocessor in &self.postprocessors {
            let before = nodes.len();
            nodes = postprocessor.process(nodes);
            tracing::debug!(
                "postprocessor {}: {} -> {} nodes",
                postprocessor.name(),
                before,
                nodes.len()
            );
        }

        let synthesis_start = Instant::now();
        let answer = self.synthesizer.synthesize(&query.text, &nodes)?;
        let synthesis_ms = synthesis_start.elapsed().as_millis() as u64;

        Ok(QueryResponse {
            answer,
            sources: nodes.iter().map(source_of).collect(),
            retrieval_ms,
            synthesis_ms,
        })
    }

    pub fn retriever(&self) -> &dyn Retriever {
        self.retriever.as_ref()
    }
}

fn source_of(node: &ScoredNode) -> Source {
    Source {
        chunk_id: node.id.clone(),
        document_id: node.chunk.document_id.clone(),
        score: node.score,
        snippet: snippet_of(&node.chunk.content, 200),
    }
}

/// Word-boundary truncation for source snippets.
fn snippet_of(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .take_while(|(i, _)| *i < max_len)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let head = &text[..cut];
    match head.rfind(' ') {
        Some(space) => format!("{}...", &head[..space]),
        None => format!("{}...", head),
    }
}

/// Builder for [`RetrieverQueryEngine`].
#[derive(Default)]
pub struct RetrieverQueryEngineBuilder {
    retriever: Option<Arc<dyn Retriever>>,
    synthesizer: Option<ResponseSynthesizer>,
    postprocessors: Vec<Box<dyn NodePostprocessor>>,
}

impl RetrieverQueryEngineBuilder {
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn synthesizer(mut self, synthesizer: ResponseSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn postprocessor(mut self, postprocessor: Box<dyn NodePostprocessor>) -> Self {
        self.postprocessors.push(postprocessor);
        self
    }

    pub fn build(self) -> Result<RetrieverQueryEngine> {
        Ok(RetrieverQueryEngine {
            retriever: self.retriever.context("a retriever is required")?,
            synthesizer: self.synthesizer.context("a synthesizer is required")?,
            postprocessors: self.postprocessors,
        })
    }
}

/// A query engine with a routing description.
pub struct QueryEngineTool {
    pub engine: RetrieverQueryEngine,
    pub description: String,
}

impl QueryEngineTool {
    pub fn new(engine: RetrieverQueryEngine, description: &str) -> Self {
        Self {
            engine,
            description: description.to_string(),
        }
    }
}

/// Routes each query to the engine whose description matches best.
pub struct RouterQueryEngine {
    tools: Vec<QueryEngineTool>,
    selector: Arc<dyn Selector>,
}

impl RouterQueryEngine {
    pub fn new(tools: Vec<QueryEngineTool>, selector: Arc<dyn Selector>) -> Result<Self> {
        if tools.is_empty() {
            anyhow::bail!("router needs at least one query engine tool");
        }
        Ok(Self { tools, selector })
    }

    /// Route and run. Falls back to the first tool when the selector
    /// has no opinion.
    pub fn query(&self, query: &Query) -> Result<QueryResponse> {
        let descriptions: Vec<&str> = self.tools.iter().map(|t| t.description.as_str()).collect();
        let picked = self
            .selector
            .select(&query.text, &descriptions, 1)?
            .first()
            .map(|(i, _)| *i)
            .unwrap_or(0);

        tracing::info!(
            "router picked engine {} ({})",
            picked,
            self.tools[picked].description
        );
        self.tools[picked].engine.query(query)
    }
}
