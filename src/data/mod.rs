//! Corpus types, document loading, and chunking

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod chunkers;
pub mod loaders;

pub use chunkers::*;
pub use loaders::*;

/// A loaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier
    pub id: String,
    /// Source path or label
    pub source: String,
    /// Full text content
    pub content: String,
    /// File type ("txt", "md", "pdf", ...)
    pub file_type: String,
}

impl Document {
    pub fn new(id: impl Into<String>, source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            content: content.into(),
            file_type: "txt".to_string(),
        }
    }
}

/// A chunk of text cut from a document
///
/// The `extra` map carries retriever-specific links: `window` for
/// sentence-window chunks, `parent_id` for hierarchical chunks,
/// `base_id` for sub-chunks pointing back at the chunk they were cut
/// from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk identifier
    pub id: String,
    /// Parent document identifier
    pub document_id: String,
    /// Chunk text
    pub content: String,
    /// Character offset of the chunk start in the document
    pub start: usize,
    /// Character offset one past the chunk end
    pub end: usize,
    /// Position of the chunk within its document
    pub seq: usize,
    /// Retriever-specific metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl Chunk {
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        content: impl Into<String>,
        start: usize,
        end: usize,
        seq: usize,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            content: content.into(),
            start,
            end,
            seq,
            extra: HashMap::new(),
        }
    }

    /// Attach a metadata entry, builder-style.
    pub fn with_extra(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// Rebuild per-document texts from a flat chunk list.
///
/// Chunks are grouped by document id and joined in `seq` order. Used by
/// retrievers that need to re-split the corpus at their own granularity
/// (sentence window, auto-merging, recursive).
pub fn documents_from_chunks(chunks: &[Chunk]) -> Vec<Document> {
    let mut by_doc: std::collections::BTreeMap<&str, Vec<&Chunk>> = std::collections::BTreeMap::new();
    for chunk in chunks {
        by_doc.entry(chunk.document_id.as_str()).or_default().push(chunk);
    }

    by_doc
        .into_iter()
        .map(|(doc_id, mut parts)| {
            parts.sort_by_key(|c| c.seq);
            let content = parts
                .iter()
                .map(|c| c.content.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            Document::new(doc_id, doc_id, content)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_from_chunks_groups_and_orders() {
        let chunks = vec![
            Chunk::new("b_1", "doc_b", "beta two", 10, 18, 1),
            Chunk::new("a_0", "doc_a", "alpha one", 0, 9, 0),
            Chunk::new("b_0", "doc_b", "beta one", 0, 8, 0),
        ];

        let docs = documents_from_chunks(&chunks);

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "doc_a");
        assert_eq!(docs[1].content, "beta one beta two");
    }

    #[test]
    fn test_chunk_extra_builder() {
        let chunk = Chunk::new("c", "d", "text", 0, 4, 0).with_extra("window", "wider text");
        assert_eq!(chunk.extra.get("window").map(String::as_str), Some("wider text"));
    }
}
