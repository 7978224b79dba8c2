//! # ragkit
//!
//! A composable retrieval / RAG pipeline toolkit.
//!
//! ## Overview
//!
//! ragkit covers the retrieval side of a RAG system end to end:
//!
//! - Document loading and chunking (plain text, Markdown, optional PDF)
//! - Model-free embedding backends with a SQLite cache
//! - A family of retrievers: BM25, vector (HNSW), keyword table, summary,
//!   document summary, tree, set fusion (AND/OR), query fusion (RRF),
//!   auto-merging, recursive, sentence window
//! - A string-keyed factory that builds any retriever from a config bundle
//! - Query engines pairing a retriever with a response synthesizer and
//!   node postprocessors, plus a router over several engines
//!
//! ## Architecture
//!
//! - `data` - Documents, chunks, loaders, chunkers
//! - `embedding` - Embedding backends and caching
//! - `retrieval` - Retriever implementations and the dispatch factory
//! - `selection` - Candidate selection seams (token overlap, generative)
//! - `postprocess` - Node postprocessors (cutoff, reorder, replacement)
//! - `generation` - Text generation seam with a deterministic default
//! - `synthesis` - Response synthesis modes
//! - `engine` - Query engine assembly and routing
//! - `cli` - Command-line interface

pub mod config;
pub mod data;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod postprocess;
pub mod retrieval;
pub mod selection;
pub mod synthesis;
pub mod cli;

// Re-export commonly used types
pub use anyhow::{Error, Result};
pub use error::ConfigError;
