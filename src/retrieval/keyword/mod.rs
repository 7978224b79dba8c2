//! Keyword-table retrieval
//!
//! Builds a keyword -> chunk-id table at index time and matches query
//! keywords against it. Scores are raw keyword-hit counts.

use crate::data::Chunk;
use crate::retrieval::{rank_nodes, Retriever, ScoredNode};
use crate::selection::content_tokens;
use anyhow::Result;
use std::collections::{HashMap, HashSet};

/// Keyword-table retriever.
pub struct KeywordTableRetriever {
    table: HashMap<String, Vec<String>>,
    chunks: HashMap<String, Chunk>,
    #[allow(dead_code)]
    max_keywords_per_chunk: usize,
}

impl KeywordTableRetriever {
    /// Build the keyword table. Each chunk contributes its most
    /// frequent content tokens, capped at `max_keywords_per_chunk`.
    pub fn build(chunks: Vec<Chunk>, max_keywords_per_chunk: usize) -> Result<Self> {
        if chunks.is_empty() {
            anyhow::bail!("cannot build a keyword table from zero chunks");
        }

        let mut table: HashMap<String, Vec<String>> = HashMap::new();
        for chunk in &chunks {
            for keyword in Self::extract_keywords(&chunk.content, max_keywords_per_chunk) {
                table.entry(keyword).or_default().push(chunk.id.clone());
            }
        }

        tracing::debug!(
            "keyword table built: {} keywords over {} chunks",
            table.len(),
            chunks.len()
        );

        Ok(Self {
            table,
            chunks: chunks.into_iter().map(|c| (c.id.clone(), c)).collect(),
            max_keywords_per_chunk,
        })
    }

    /// Most frequent content tokens of a text, ties broken
    /// alphabetically for determinism.
    fn extract_keywords(text: &str, cap: usize) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for token in content_tokens(text) {
            *counts.entry(token).or_default() += 1;
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(cap);
        ranked.into_iter().map(|(kw, _)| kw).collect()
    }

    pub fn num_keywords(&self) -> usize {
        self.table.len()
    }
}

impl Retriever for KeywordTableRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        let query_keywords: HashSet<String> =
            content_tokens(query).into_iter().collect();

        let mut hits: HashMap<&str, usize> = HashMap::new();
        for keyword in &query_keywords {
            if let Some(chunk_ids) = self.table.get(keyword) {
                for id in chunk_ids {
                    *hits.entry(id.as_str()).or_default() += 1;
                }
            }
        }

        let scored = hits
            .into_iter()
            .filter_map(|(id, count)| {
                self.chunks.get(id).map(|c| (c.clone(), count as f32))
            })
            .collect();

        Ok(rank_nodes(scored, top_k))
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::testing::corpus;

    #[test]
    fn test_keyword_match() {
        let retriever = KeywordTableRetriever::build(corpus(), 10).unwrap();

        let results = retriever.retrieve("sourdough starter", 3).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.document_id, "doc_cook");
        // Two keyword hits beat one.
        assert_eq!(results[0].score, 2.0);
    }

    #[test]
    fn test_no_keywords_no_results() {
        let retriever = KeywordTableRetriever::build(corpus(), 10).unwrap();
        assert!(retriever.retrieve("zeppelin", 3).unwrap().is_empty());
    }

    #[test]
    fn test_keyword_cap_limits_table() {
        let wide = KeywordTableRetriever::build(corpus(), 10).unwrap();
        let narrow = KeywordTableRetriever::build(corpus(), 2).unwrap();
        assert!(narrow.num_keywords() < wide.num_keywords());
        assert_eq!(narrow.max_keywords_per_chunk, 2);
    }
}
