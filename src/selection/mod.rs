//! Candidate selection
//!
//! Several components need to pick the most relevant entries out of a
//! short candidate list: the generative summary modes, tree descent,
//! and the router. [`Selector`] is that seam. The default implementation
//! scores by content-token overlap; [`GenerativeSelector`] delegates the
//! choice to a [`Generator`](crate::generation::Generator).

use crate::generation::{GenerationParams, Generator};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

/// Words carrying no retrieval signal, skipped during tokenization.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "how",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "their", "this", "to", "was",
    "were", "what", "when", "where", "which", "who", "will", "with",
];

/// Lowercased alphanumeric tokens with stopwords removed.
pub fn content_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Picks the top-k most relevant candidates for a query.
pub trait Selector: Send + Sync {
    /// Return (candidate index, relevance score) pairs, best first, at
    /// most `top_k` of them.
    fn select(&self, query: &str, candidates: &[&str], top_k: usize) -> Result<Vec<(usize, f32)>>;
}

/// Scores candidates by the fraction of query content-tokens they
/// contain. Deterministic and model-free.
#[derive(Debug, Default)]
pub struct TokenOverlapSelector;

impl Selector for TokenOverlapSelector {
    fn select(&self, query: &str, candidates: &[&str], top_k: usize) -> Result<Vec<(usize, f32)>> {
        let query_tokens: HashSet<String> = content_tokens(query).into_iter().collect();
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| {
                let tokens: HashSet<String> = content_tokens(candidate).into_iter().collect();
                let hits = query_tokens.intersection(&tokens).count();
                (i, hits as f32 / query_tokens.len() as f32)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Delegates the choice to a generator: candidates are numbered, the
/// generator is asked which are relevant, and its answer is parsed for
/// candidate numbers. Falls back to token overlap when the answer
/// contains none.
pub struct GenerativeSelector {
    generator: Arc<dyn Generator>,
    fallback: TokenOverlapSelector,
}

impl GenerativeSelector {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            fallback: TokenOverlapSelector,
        }
    }

    fn choice_prompt(query: &str, candidates: &[&str]) -> String {
        let mut prompt = String::from(
            "Below are numbered passages. List the numbers of the passages \
             relevant to the question, most relevant first.\n\n",
        );
        for (i, candidate) in candidates.iter().enumerate() {
            prompt.push_str(&format!("({}) {}\n", i + 1, candidate));
        }
        prompt.push_str(&format!("\nQuestion: {}\nRelevant numbers:", query));
        prompt
    }
}

impl Selector for GenerativeSelector {
    fn select(&self, query: &str, candidates: &[&str], top_k: usize) -> Result<Vec<(usize, f32)>> {
        let prompt = Self::choice_prompt(query, candidates);
        let answer = self.generator.generate(&prompt, &GenerationParams::default())?;

        let mut picks = Vec::new();
        for token in answer.split(|c: char| !c.is_ascii_digit()) {
            if let Ok(n) = token.parse::<usize>() {
                if n >= 1 && n <= candidates.len() && !picks.iter().any(|(i, _)| *i == n - 1) {
                    // Earlier mentions score higher.
                    let score = 1.0 / (picks.len() + 1) as f32;
                    picks.push((n - 1, score));
                }
            }
            if picks.len() == top_k {
                break;
            }
        }

        if picks.is_empty() {
            tracing::debug!("generative selection produced no usable numbers, using overlap");
            return self.fallback.select(query, candidates, top_k);
        }
        Ok(picks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ExtractiveGenerator;

    #[test]
    fn test_content_tokens_strip_stopwords() {
        let tokens = content_tokens("What is the Borrow Checker?");
        assert_eq!(tokens, vec!["borrow", "checker"]);
    }

    #[test]
    fn test_token_overlap_ranks_by_hits() {
        let selector = TokenOverlapSelector;
        let candidates = [
            "sailing and tides",
            "the borrow checker of rust",
            "rust borrow semantics explained by the checker rules",
        ];
        let picks = selector
            .select("borrow checker rules", &candidates, 2)
            .unwrap();

        assert_eq!(picks.len(), 2);
        assert_eq!(picks[0].0, 2);
        assert_eq!(picks[1].0, 1);
    }

    #[test]
    fn test_token_overlap_empty_query() {
        let selector = TokenOverlapSelector;
        let picks = selector.select("the of and", &["anything"], 3).unwrap();
        assert!(picks.is_empty());
    }

    #[test]
    fn test_generative_selector_falls_back() {
        // The extractive generator echoes sentences, which may contain
        // candidate numbers or not; either path must return a ranking.
        let selector = GenerativeSelector::new(Arc::new(ExtractiveGenerator::default()));
        let candidates = ["tides and currents", "borrow checker internals"];
        let picks = selector.select("borrow checker", &candidates, 1).unwrap();

        assert_eq!(picks.len(), 1);
    }
}
