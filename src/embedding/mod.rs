//! Embedding generation
//!
//! Trait-based embedding seam with model-free default backends and a
//! persistent SQLite cache. Learned models plug in behind [`Embedder`].

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod backends;
pub mod cache;

pub use backends::*;
pub use cache::*;

/// An embedding vector.
pub type Embedding = Vec<f32>;

/// Configuration shared by embedding backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingOptions {
    /// Model name, recorded in index metadata and the cache
    pub model_name: String,
    /// Output dimensionality
    pub dimension: usize,
    /// L2-normalize outputs
    pub normalize: bool,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            model_name: "hash-embedder".to_string(),
            dimension: 384,
            normalize: true,
        }
    }
}

/// Trait for embedding models.
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed a batch of texts.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Output dimensionality.
    fn dimension(&self) -> usize;

    /// Model name for index metadata.
    fn model_name(&self) -> &str;
}

/// L2-normalize in place. Zero vectors are left untouched.
pub fn l2_normalize(embedding: &mut Embedding) {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in embedding.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na > 0.0 && nb > 0.0 {
        dot / (na * nb)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut e = vec![3.0, 4.0];
        l2_normalize(&mut e);
        assert!((e[0] - 0.6).abs() < 1e-6);
        assert!((e[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut e = vec![0.0, 0.0];
        l2_normalize(&mut e);
        assert_eq!(e, vec![0.0, 0.0]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
