//! Chunking strategies
//!
//! Sliding-window and sentence-based chunking for ingest, plus the
//! specialized splitters the structured retrievers need: per-sentence
//! chunks carrying a context window, and multi-size sub-chunks linking
//! back to their base chunk.

use crate::data::{Chunk, Document};
use anyhow::Result;
use unicode_segmentation::UnicodeSegmentation;

/// Chunking parameters, in characters.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

/// Trait for splitting a document into chunks.
pub trait Chunker: Send + Sync {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>>;
}

/// Sliding window over characters with configurable overlap.
pub struct SlidingWindowChunker {
    opts: ChunkOptions,
}

impl SlidingWindowChunker {
    pub fn new(opts: ChunkOptions) -> Self {
        Self { opts }
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        Ok(split_text(
            &document.content,
            &document.id,
            &document.id,
            self.opts.chunk_size,
            self.opts.chunk_overlap,
        ))
    }
}

/// Sentence-boundary chunker: sentences are packed into chunks of up to
/// `chunk_size` characters without splitting a sentence.
pub struct SentenceChunker {
    opts: ChunkOptions,
}

impl SentenceChunker {
    pub fn new(opts: ChunkOptions) -> Self {
        Self { opts }
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        let mut buf = String::new();
        let mut buf_start = 0;
        let mut pos = 0;
        let mut seq = 0;

        for sentence in document.content.unicode_sentences() {
            if !buf.is_empty() && buf.len() + sentence.len() > self.opts.chunk_size {
                chunks.push(Chunk::new(
                    format!("{}_{}", document.id, seq),
                    &document.id,
                    buf.trim(),
                    buf_start,
                    pos,
                    seq,
                ));
                seq += 1;
                buf.clear();
                buf_start = pos;
            }
            buf.push_str(sentence);
            pos += sentence.chars().count();
        }

        if !buf.trim().is_empty() {
            chunks.push(Chunk::new(
                format!("{}_{}", document.id, seq),
                &document.id,
                buf.trim(),
                buf_start,
                pos,
                seq,
            ));
        }

        Ok(chunks)
    }
}

/// Split raw text into sliding-window chunks with ids prefixed by
/// `id_prefix`. Shared by the chunkers and the sub-chunk splitter.
fn split_text(
    text: &str,
    id_prefix: &str,
    document_id: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    if chars.is_empty() || chunk_size == 0 {
        return chunks;
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut start = 0;
    let mut seq = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let content: String = chars[start..end].iter().collect();
        chunks.push(Chunk::new(
            format!("{}_{}", id_prefix, seq),
            document_id,
            content,
            start,
            end,
            seq,
        ));
        seq += 1;
        if end >= chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Split a document into one chunk per sentence, each carrying the
/// surrounding `window_size` sentences on both sides in
/// `extra["window"]` and its own text in `extra["original_text"]`.
pub fn sentence_window_chunks(document: &Document, window_size: usize) -> Vec<Chunk> {
    let sentences: Vec<&str> = document
        .content
        .unicode_sentences()
        .filter(|s| !s.trim().is_empty())
        .collect();

    let mut pos = 0;
    let mut chunks = Vec::with_capacity(sentences.len());

    for (i, sentence) in sentences.iter().enumerate() {
        let lo = i.saturating_sub(window_size);
        let hi = (i + window_size + 1).min(sentences.len());
        let window: String = sentences[lo..hi].concat();

        let len = sentence.chars().count();
        let chunk = Chunk::new(
            format!("{}_s{}", document.id, i),
            &document.id,
            sentence.trim(),
            pos,
            pos + len,
            i,
        )
        .with_extra("window", window.trim())
        .with_extra("original_text", sentence.trim());
        chunks.push(chunk);
        pos += len;
    }

    chunks
}

/// Re-split base chunks at several smaller sizes.
///
/// Every sub-chunk links back to its base chunk via `extra["base_id"]`;
/// the base chunk itself is appended as its own node so exact matches at
/// the original granularity still surface.
pub fn sub_chunks(base: &[Chunk], sub_sizes: &[usize], overlap: usize) -> Vec<Chunk> {
    let mut nodes = Vec::new();

    for chunk in base {
        for &size in sub_sizes {
            for mut sub in split_text(
                &chunk.content,
                &format!("{}_c{}", chunk.id, size),
                &chunk.document_id,
                size,
                overlap,
            ) {
                sub.extra.insert("base_id".to_string(), chunk.id.clone());
                nodes.push(sub);
            }
        }
        let mut own = chunk.clone();
        own.extra.insert("base_id".to_string(), chunk.id.clone());
        nodes.push(own);
    }

    nodes
}
