//! Response synthesis
//!
//! Turns a query plus retrieved nodes into an answer by driving the
//! generation seam. The eight modes trade off call count against how
//! much context each call sees, following the usual RAG taxonomy.

use crate::error::ConfigError;
use crate::generation::{GenerationParams, Generator};
use crate::retrieval::ScoredNode;
use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;

/// How retrieved context is turned into an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// One call per node, refining the running answer
    Refine,
    /// Pack nodes to the context budget, then refine across batches
    Compact,
    /// Pack, then answer each batch separately and concatenate
    CompactAccumulate,
    /// Answer each node separately and concatenate
    Accumulate,
    /// Summarize batches recursively until one answer remains
    TreeSummarize,
    /// Truncate all context into a single call
    SimpleSummarize,
    /// Return no text, sources only
    NoText,
    /// Ignore context, answer from the query alone
    Generation,
}

impl FromStr for ResponseMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "refine" => Ok(ResponseMode::Refine),
            "compact" => Ok(ResponseMode::Compact),
            "compact-accumulate" => Ok(ResponseMode::CompactAccumulate),
            "accumulate" => Ok(ResponseMode::Accumulate),
            "tree-summarize" => Ok(ResponseMode::TreeSummarize),
            "simple-summarize" => Ok(ResponseMode::SimpleSummarize),
            "no-text" => Ok(ResponseMode::NoText),
            "generation" => Ok(ResponseMode::Generation),
            _ => Err(ConfigError::InvalidMode {
                field: "response mode",
                value: s.to_string(),
                expected: "refine, compact, compact-accumulate, accumulate, \
                           tree-summarize, simple-summarize, no-text, generation",
            }),
        }
    }
}

const QA_PROMPT: &str = "Context:\n{context}\n\nQuestion: {query}\n\nAnswer:";

const REFINE_PROMPT: &str = "Context:\n{context}\n\nThe existing answer is: {answer}\n\
                             Question: {query}\n\nRefine the existing answer using the context. Answer:";

const SEPARATOR: &str = "\n---\n";

/// Drives a [`Generator`] according to a [`ResponseMode`].
pub struct ResponseSynthesizer {
    generator: Arc<dyn Generator>,
    mode: ResponseMode,
    max_context_chars: usize,
    params: GenerationParams,
}

impl ResponseSynthesizer {
    pub fn new(generator: Arc<dyn Generator>, mode: ResponseMode) -> Self {
        Self {
            generator,
            mode,
            max_context_chars: 4000,
            params: GenerationParams::default(),
        }
    }

    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    fn ask(&self, query: &str, context: &str) -> Result<String> {
        let prompt = QA_PROMPT
            .replace("{context}", context)
            .replace("{query}", query);
        self.generator.generate(&prompt, &self.params)
    }

    fn refine(&self, query: &str, answer: &str, context: &str) -> Result<String> {
        let prompt = REFINE_PROMPT
            .replace("{context}", context)
            .replace("{answer}", answer)
            .replace("{query}", query);
        self.generator.generate(&prompt, &self.params)
    }

    /// Greedily pack texts into batches within the context budget. A
    /// single oversized text becomes its own (truncated) batch.
    fn pack(&self, texts: &[&str]) -> Vec<String> {
        let mut batches = Vec::new();
        let mut current = String::new();

        for text in texts {
            if !current.is_empty() && current.len() + text.len() + 2 > self.max_context_chars {
                batches.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(text);
            if current.len() > self.max_context_chars {
                current.truncate(self.max_context_chars);
                batches.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    fn refine_over(&self, query: &str, contexts: &[String]) -> Result<String> {
        let mut answer = String::new();
        for context in contexts {
            answer = if answer.is_empty() {
                self.ask(query, context)?
            } else {
                self.refine(query, &answer, context)?
            };
        }
        Ok(answer)
    }

    /// Synthesize an answer from retrieved nodes.
    pub fn synthesize(&self, query: &str, nodes: &[ScoredNode]) -> Result<String> {
        let texts: Vec<&str> = nodes.iter().map(|n| n.chunk.content.as_str()).collect();
        tracing::debug!("synthesizing ({:?}) from {} nodes", self.mode, texts.len());

        if texts.is_empty()
            && !matches!(self.mode, ResponseMode::Generation | ResponseMode::NoText)
        {
            return Ok(String::new());
        }

        match self.mode {
            ResponseMode::Refine => {
                let contexts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
                self.refine_over(query, &contexts)
            }

            ResponseMode::Compact => {
                let batches = self.pack(&texts);
                self.refine_over(query, &batches)
            }

            ResponseMode::CompactAccumulate => {
                let batches = self.pack(&texts);
                let answers: Vec<String> = batches
                    .iter()
                    .map(|b| self.ask(query, b))
                    .collect::<Result<_>>()?;
                Ok(answers.join(SEPARATOR))
            }

            ResponseMode::Accumulate => {
                let answers: Vec<String> = texts
                    .iter()
                    .map(|t| self.ask(query, t))
                    .collect::<Result<_>>()?;
                Ok(answers.join(SEPARATOR))
            }

            ResponseMode::TreeSummarize => {
                let mut layer: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
                loop {
                    let refs: Vec<&str> = layer.iter().map(String::as_str).collect();
                    let batches = self.pack(&refs);
                    if batches.len() <= 1 {
                        let context = batches.into_iter().next().unwrap_or_default();
                        return self.ask(query, &context);
                    }
                    if batches.len() >= layer.len() {
                        // The budget is too tight for the layers to
                        // shrink; collapse in one truncated call.
                        let mut context = layer.join("\n\n");
                        context.truncate(self.max_context_chars);
                        return self.ask(query, &context);
                    }
                    layer = batches
                        .iter()
                        .map(|b| self.ask(query, b))
                        .collect::<Result<_>>()?;
                }
            }

            ResponseMode::SimpleSummarize => {
                let mut context = texts.join("\n\n");
                if context.len() > self.max_context_chars {
                    context.truncate(self.max_context_chars);
                }
                self.ask(query, &context)
            }

            ResponseMode::NoText => Ok(String::new()),

            ResponseMode::Generation => {
                self.generator.generate(query, &self.params)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Chunk;
    use crate::generation::ExtractiveGenerator;

    fn nodes(texts: &[&str]) -> Vec<ScoredNode> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                ScoredNode::new(Chunk::new(format!("c{}", i), "d", *t, 0, 0, i), 0.9, i + 1)
            })
            .collect()
    }

    fn synthesizer(mode: ResponseMode) -> ResponseSynthesizer {
        ResponseSynthesizer::new(Arc::new(ExtractiveGenerator::default()), mode)
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("refine".parse::<ResponseMode>().unwrap(), ResponseMode::Refine);
        assert_eq!(
            "compact_accumulate".parse::<ResponseMode>().unwrap(),
            ResponseMode::CompactAccumulate
        );
        assert_eq!(
            "tree-summarize".parse::<ResponseMode>().unwrap(),
            ResponseMode::TreeSummarize
        );
        assert!("verbose".parse::<ResponseMode>().is_err());
    }

    #[test]
    fn test_refine_uses_context() {
        let s = synthesizer(ResponseMode::Refine);
        let answer = s
            .synthesize(
                "What enforces memory safety?",
                &nodes(&[
                    "The borrow checker enforces memory safety.",
                    "Sourdough needs patience.",
                ]),
            )
            .unwrap();

        assert!(answer.contains("memory safety"));
    }

    #[test]
    fn test_accumulate_joins_per_node_answers() {
        let s = synthesizer(ResponseMode::Accumulate);
        let answer = s
            .synthesize(
                "What about safety and patience?",
                &nodes(&["Safety comes first.", "Patience pays off."]),
            )
            .unwrap();

        assert!(answer.contains(SEPARATOR.trim()));
    }

    #[test]
    fn test_no_text_returns_empty() {
        let s = synthesizer(ResponseMode::NoText);
        let answer = s.synthesize("q", &nodes(&["anything"])).unwrap();
        assert!(answer.is_empty());
    }

    #[test]
    fn test_empty_nodes_empty_answer() {
        let s = synthesizer(ResponseMode::Compact);
        assert!(s.synthesize("q", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_compact_packs_under_budget() {
        let s = synthesizer(ResponseMode::Compact).with_max_context_chars(64);
        let texts: Vec<String> = (0..6).map(|i| format!("Fact number {} stands alone.", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let batches = s.pack(&refs);
        assert!(batches.len() > 1);
        assert!(batches.iter().all(|b| b.len() <= 64));
    }

    #[test]
    fn test_tree_summarize_terminates() {
        let s = synthesizer(ResponseMode::TreeSummarize).with_max_context_chars(80);
        let texts: Vec<String> = (0..8)
            .map(|i| format!("Observation {} concerns tidal flow measurement.", i))
            .collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let ns = nodes(&refs);

        let answer = s.synthesize("What do the observations concern?", &ns).unwrap();
        assert!(!answer.is_empty());
    }

    #[test]
    fn test_generation_ignores_context() {
        let s = synthesizer(ResponseMode::Generation);
        let answer = s
            .synthesize("Plain question with no retrieval at all.", &[])
            .unwrap();
        assert!(!answer.is_empty());
    }
}
