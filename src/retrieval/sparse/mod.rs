//! Sparse retrieval
//!
//! BM25 full-text search over chunks via tantivy. Indexes can live on
//! disk (build/load) or in memory for ad-hoc pipelines.

use crate::data::Chunk;
use crate::retrieval::{IndexMetadata, Retriever, ScoredNode};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

/// BM25 retriever backed by a tantivy index.
pub struct Bm25Retriever {
    index: Index,
    reader: IndexReader,
    body_field: Field,
    id_field: Field,
    chunks: HashMap<String, Chunk>,
    metadata: IndexMetadata,
}

impl Bm25Retriever {
    fn schema() -> (Schema, Field, Field) {
        let mut builder = Schema::builder();
        let id_field = builder.add_text_field("chunk_id", STRING | STORED);
        let body_field = builder.add_text_field("body", TEXT);
        (builder.build(), id_field, body_field)
    }

    fn fill_index(index: &Index, id_field: Field, body_field: Field, chunks: &[Chunk]) -> Result<()> {
        let mut writer: IndexWriter = index.writer(50_000_000)?;
        for chunk in chunks {
            writer.add_document(doc!(
                id_field => chunk.id.clone(),
                body_field => chunk.content.clone(),
            ))?;
        }
        writer.commit()?;
        Ok(())
    }

    fn finish(index: Index, id_field: Field, body_field: Field, chunks: Vec<Chunk>) -> Result<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        let metadata = IndexMetadata {
            model_name: "bm25".to_string(),
            dimension: 0,
            num_chunks: chunks.len(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        Ok(Self {
            index,
            reader,
            body_field,
            id_field,
            chunks: chunks.into_iter().map(|c| (c.id.clone(), c)).collect(),
            metadata,
        })
    }

    /// Build an in-memory index. Nothing touches disk.
    pub fn build_in_memory(chunks: Vec<Chunk>) -> Result<Self> {
        if chunks.is_empty() {
            anyhow::bail!("cannot build a BM25 index from zero chunks");
        }
        let (schema, id_field, body_field) = Self::schema();
        let index = Index::create_in_ram(schema);
        Self::fill_index(&index, id_field, body_field, &chunks)?;
        Self::finish(index, id_field, body_field, chunks)
    }

    /// Build a persistent index under `index_dir`.
    pub fn build(chunks: Vec<Chunk>, index_dir: &Path) -> Result<Self> {
        if chunks.is_empty() {
            anyhow::bail!("cannot build a BM25 index from zero chunks");
        }
        tracing::info!("building BM25 index: {} chunks", chunks.len());

        let tantivy_dir = index_dir.join("tantivy");
        fs::create_dir_all(&tantivy_dir)
            .with_context(|| format!("failed to create {:?}", tantivy_dir))?;

        let (schema, id_field, body_field) = Self::schema();
        let index = Index::create_in_dir(&tantivy_dir, schema)?;
        Self::fill_index(&index, id_field, body_field, &chunks)?;

        let retriever = Self::finish(index, id_field, body_field, chunks)?;
        fs::write(
            index_dir.join("chunks.json"),
            serde_json::to_string(&retriever.chunks)?,
        )?;
        fs::write(
            index_dir.join("metadata.json"),
            serde_json::to_string_pretty(&retriever.metadata)?,
        )?;
        Ok(retriever)
    }

    /// Load a persistent index built by [`Bm25Retriever::build`].
    pub fn load(index_dir: &Path) -> Result<Self> {
        let chunks: HashMap<String, Chunk> = serde_json::from_str(
            &fs::read_to_string(index_dir.join("chunks.json"))
                .context("failed to read chunks.json")?,
        )?;
        let metadata: IndexMetadata = serde_json::from_str(
            &fs::read_to_string(index_dir.join("metadata.json"))
                .context("failed to read metadata.json")?,
        )?;

        let index = Index::open_in_dir(index_dir.join("tantivy"))
            .context("failed to open tantivy index")?;
        let schema = index.schema();
        let id_field = schema.get_field("chunk_id").context("chunk_id field missing")?;
        let body_field = schema.get_field("body").context("body field missing")?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        tracing::info!("loaded BM25 index: {} chunks", chunks.len());
        Ok(Self {
            index,
            reader,
            body_field,
            id_field,
            chunks,
            metadata,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }
}

impl Retriever for Bm25Retriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.body_field]);
        let parsed = parser
            .parse_query_lenient(query)
            .0;

        let hits = searcher.search(&parsed, &TopDocs::with_limit(top_k.max(1)))?;

        let mut results = Vec::with_capacity(hits.len());
        for (rank, (score, addr)) in hits.iter().enumerate() {
            let stored: TantivyDocument = searcher.doc(*addr)?;
            let chunk_id = stored
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if let Some(chunk) = self.chunks.get(chunk_id) {
                results.push(ScoredNode::new(chunk.clone(), *score, rank + 1));
            }
        }

        Ok(results)
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::testing::corpus;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_search() {
        let retriever = Bm25Retriever::build_in_memory(corpus()).unwrap();

        let results = retriever.retrieve("borrow checker memory safety", 3).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.document_id, "doc_lang");
        assert_eq!(results[0].rank, 1);
    }

    #[test]
    fn test_empty_corpus_rejected() {
        assert!(Bm25Retriever::build_in_memory(Vec::new()).is_err());
    }

    #[test]
    fn test_build_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        Bm25Retriever::build(corpus(), dir.path()).unwrap();

        let loaded = Bm25Retriever::load(dir.path()).unwrap();
        assert_eq!(loaded.metadata().num_chunks, 5);

        let results = loaded.retrieve("sourdough starter", 2).unwrap();
        assert_eq!(results[0].chunk.document_id, "doc_cook");
    }

    #[test]
    fn test_no_match_returns_empty() {
        let retriever = Bm25Retriever::build_in_memory(corpus()).unwrap();
        let results = retriever.retrieve("zzzzqqqq", 3).unwrap();
        assert!(results.is_empty());
    }
}
