//! Command-line interface
//!
//! `ingest` loads and chunks a corpus to JSON, `index` persists the
//! bm25/vector indexes, `query` builds any retriever kind over the
//! chunks and searches, and `ask` runs the full engine: retrieve,
//! postprocess, synthesize.

use crate::config::RetrieverConfig;
use crate::data::{load_directory, load_file, Chunk, ChunkOptions, Chunker, SentenceChunker, SlidingWindowChunker};
use crate::embedding::{CachedEmbedder, Embedder, EmbeddingOptions, HashingEmbedder};
use crate::engine::{Query, RetrieverQueryEngine};
use crate::generation::ExtractiveGenerator;
use crate::postprocess::{LongContextReorder, SimilarityCutoff};
use crate::retrieval::{
    Bm25Retriever, HnswParams, Retriever, RetrieverFactory, RetrieverKind, VectorRetriever,
};
use crate::synthesis::{ResponseMode, ResponseSynthesizer};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Load documents, chunk them, and write a flat chunks.json.
pub async fn ingest(
    input: String,
    output: String,
    chunk_size: usize,
    chunk_overlap: usize,
    strategy: String,
) -> Result<()> {
    tracing::info!("ingesting {} -> {}", input, output);

    let opts = ChunkOptions {
        chunk_size,
        chunk_overlap,
    };
    let chunker: Box<dyn Chunker> = match strategy.as_str() {
        "window" => Box::new(SlidingWindowChunker::new(opts)),
        "sentence" => Box::new(SentenceChunker::new(opts)),
        other => anyhow::bail!("unknown chunking strategy '{}', expected 'window' or 'sentence'", other),
    };

    let input_path = Path::new(&input);
    let documents = if input_path.is_file() {
        vec![load_file(input_path)?]
    } else if input_path.is_dir() {
        load_directory(input_path)?
    } else {
        anyhow::bail!("input path does not exist: {}", input);
    };
    tracing::info!("loaded {} documents", documents.len());

    let mut chunks = Vec::new();
    for document in &documents {
        chunks.extend(chunker.chunk(document)?);
    }

    if let Some(parent) = Path::new(&output).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&output, serde_json::to_string_pretty(&chunks)?)?;

    println!("Ingested {} documents into {} chunks -> {}", documents.len(), chunks.len(), output);
    Ok(())
}

fn load_chunks(path: &str) -> Result<Vec<Chunk>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read chunks file {}", path))?;
    let chunks: Vec<Chunk> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse chunks file {}", path))?;
    if chunks.is_empty() {
        anyhow::bail!("chunks file {} is empty", path);
    }
    Ok(chunks)
}

fn load_config(path: Option<&str>) -> Result<RetrieverConfig> {
    match path {
        Some(p) => RetrieverConfig::load(Path::new(p)),
        None => Ok(RetrieverConfig::default()),
    }
}

fn make_embedder(cache_path: Option<&str>) -> Result<Arc<dyn Embedder>> {
    let base: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(EmbeddingOptions::default()));
    match cache_path {
        Some(path) => Ok(Arc::new(CachedEmbedder::open(base, Path::new(path))?)),
        None => Ok(base),
    }
}

fn make_factory(
    chunks: Vec<Chunk>,
    config: RetrieverConfig,
    cache_path: Option<&str>,
) -> Result<RetrieverFactory> {
    Ok(RetrieverFactory::new(
        chunks,
        make_embedder(cache_path)?,
        Arc::new(ExtractiveGenerator::default()),
        config,
    ))
}

/// Build and persist the bm25 and vector indexes for a chunk corpus.
pub async fn index(
    chunks_path: String,
    output: String,
    which: String,
    cache_path: Option<String>,
) -> Result<()> {
    if !matches!(which.as_str(), "bm25" | "vector" | "both") {
        anyhow::bail!("unknown index type '{}', expected 'bm25', 'vector', or 'both'", which);
    }

    let chunks = load_chunks(&chunks_path)?;
    let output_path = Path::new(&output);
    fs::create_dir_all(output_path)
        .with_context(|| format!("failed to create index directory {}", output))?;

    if which == "bm25" || which == "both" {
        let bm25 = Bm25Retriever::build(chunks.clone(), &output_path.join("bm25"))?;
        println!("BM25 index: {} chunks", bm25.metadata().num_chunks);
    }
    if which == "vector" || which == "both" {
        let embedder = make_embedder(cache_path.as_deref())?;
        let vector = VectorRetriever::build(chunks, embedder, HnswParams::default())?;
        vector.save(&output_path.join("vector"))?;
        println!("Vector index: {} chunks", vector.metadata().num_chunks);
    }

    println!("Indexes written to {}", output);
    Ok(())
}

/// Load a persisted retriever from an index directory.
fn load_persisted(
    index_dir: &str,
    kind: RetrieverKind,
    cache_path: Option<&str>,
) -> Result<Arc<dyn Retriever>> {
    let dir = Path::new(index_dir);
    match kind {
        RetrieverKind::Bm25 => Ok(Arc::new(Bm25Retriever::load(&dir.join("bm25"))?)),
        RetrieverKind::Vector => Ok(Arc::new(VectorRetriever::load(
            &dir.join("vector"),
            make_embedder(cache_path)?,
        )?)),
        other => anyhow::bail!(
            "persisted indexes exist only for bm25 and vector, not {}",
            other
        ),
    }
}

/// Build a retriever by label and print its results for one query.
pub async fn query(
    chunks_path: String,
    query_text: String,
    retriever_label: String,
    top_k: Option<usize>,
    config_path: Option<String>,
    index_dir: Option<String>,
    cache_path: Option<String>,
) -> Result<()> {
    let kind: RetrieverKind = retriever_label.parse()?;
    let config = load_config(config_path.as_deref())?;
    let factory = make_factory(load_chunks(&chunks_path)?, config, cache_path.as_deref())?;

    let top_k = top_k.unwrap_or_else(|| factory.default_top_k(kind));
    let retriever = match &index_dir {
        Some(dir) => load_persisted(dir, kind, cache_path.as_deref())?,
        None => factory.build(kind)?,
    };
    let results = retriever.retrieve(&query_text, top_k)?;

    println!("Query: {}", query_text);
    println!("Retriever: {} (top_k={})", kind, top_k);
    println!("Found {} results:\n", results.len());
    for node in &results {
        println!("Rank {}: {} (score: {:.4})", node.rank, node.id, node.score);
        println!("  Document: {}", node.chunk.document_id);
        let preview: String = node.chunk.content.chars().take(160).collect();
        println!("  Content: {}{}", preview, if node.chunk.content.len() > 160 { "..." } else { "" });
        println!();
    }

    Ok(())
}

/// Full pipeline: retrieve, postprocess, synthesize, print the answer.
#[allow(clippy::too_many_arguments)]
pub async fn ask(
    chunks_path: String,
    query_text: String,
    retriever_label: String,
    response_mode: String,
    top_k: Option<usize>,
    config_path: Option<String>,
    score_cutoff: Option<f32>,
    reorder: bool,
    cache_path: Option<String>,
) -> Result<()> {
    let kind: RetrieverKind = retriever_label.parse()?;
    let mode: ResponseMode = response_mode.parse()?;
    let config = load_config(config_path.as_deref())?;
    let factory = make_factory(load_chunks(&chunks_path)?, config, cache_path.as_deref())?;
    let top_k = top_k.unwrap_or_else(|| factory.default_top_k(kind));

    let mut builder = RetrieverQueryEngine::builder()
        .retriever(factory.build(kind)?)
        .synthesizer(ResponseSynthesizer::new(
            Arc::new(ExtractiveGenerator::default()),
            mode,
        ));
    if let Some(min_score) = score_cutoff {
        builder = builder.postprocessor(Box::new(SimilarityCutoff { min_score }));
    }
    if reorder {
        builder = builder.postprocessor(Box::new(LongContextReorder));
    }
    let engine = builder.build()?;

    let response = engine.query(&Query::new(&query_text).with_top_k(top_k))?;
    println!("{}", response);
    Ok(())
}
