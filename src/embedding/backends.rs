//! Model-free embedding backends
//!
//! The hashing embedder is the default: token counts hashed into a fixed
//! number of buckets, TF-normalized. Good enough to drive the dense
//! retrievers without model weights; learned backends implement the same
//! trait.

use crate::embedding::{l2_normalize, Embedder, Embedding, EmbeddingOptions};
use anyhow::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Bag-of-tokens embedder using feature hashing.
pub struct HashingEmbedder {
    opts: EmbeddingOptions,
}

impl HashingEmbedder {
    pub fn new(opts: EmbeddingOptions) -> Self {
        Self { opts }
    }

    fn encode(&self, text: &str) -> Embedding {
        let mut embedding = vec![0.0; self.opts.dimension];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        if tokens.is_empty() {
            return embedding;
        }

        for token in &tokens {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.opts.dimension;
            embedding[idx] += 1.0;
        }

        let n = tokens.len() as f32;
        for v in embedding.iter_mut() {
            *v /= n;
        }

        if self.opts.normalize {
            l2_normalize(&mut embedding);
        }
        embedding
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(self.encode(text))
    }

    fn dimension(&self) -> usize {
        self.opts.dimension
    }

    fn model_name(&self) -> &str {
        &self.opts.model_name
    }
}

/// Deterministic pseudo-random embedder for tests.
///
/// Same text always maps to the same vector; unrelated texts map to
/// unrelated vectors.
pub struct MockEmbedder {
    opts: EmbeddingOptions,
}

impl MockEmbedder {
    pub fn new(opts: EmbeddingOptions) -> Self {
        Self { opts }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        let mut embedding = Vec::with_capacity(self.opts.dimension);
        for _ in 0..self.opts.dimension {
            // LCG step
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            embedding.push(((state >> 33) % 2000) as f32 / 1000.0 - 1.0);
        }

        if self.opts.normalize {
            l2_normalize(&mut embedding);
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.opts.dimension
    }

    fn model_name(&self) -> &str {
        &self.opts.model_name
    }
}

/// Build an embedder from a backend name. Unknown names are an error.
pub fn create_embedder(backend: &str, opts: EmbeddingOptions) -> Result<Arc<dyn Embedder>> {
    match backend {
        "hash" => Ok(Arc::new(HashingEmbedder::new(opts))),
        "mock" => Ok(Arc::new(MockEmbedder::new(opts))),
        other => anyhow::bail!("unknown embedding backend '{}', expected 'hash' or 'mock'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_embedder_deterministic() {
        let embedder = HashingEmbedder::new(EmbeddingOptions::default());
        let a = embedder.embed("the quick brown fox").unwrap();
        let b = embedder.embed("the quick brown fox").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[test]
    fn test_hashing_embedder_overlap_similarity() {
        let embedder = HashingEmbedder::new(EmbeddingOptions::default());
        let a = embedder.embed("rust systems programming").unwrap();
        let b = embedder.embed("rust systems language").unwrap();
        let c = embedder.embed("baking sourdough bread").unwrap();

        let sim_ab = crate::embedding::cosine_similarity(&a, &b);
        let sim_ac = crate::embedding::cosine_similarity(&a, &c);
        assert!(sim_ab > sim_ac);
    }

    #[test]
    fn test_mock_embedder() {
        let embedder = MockEmbedder::new(EmbeddingOptions {
            dimension: 64,
            ..Default::default()
        });
        let a = embedder.embed("alpha").unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, embedder.embed("alpha").unwrap());
        assert_ne!(a, embedder.embed("beta").unwrap());
    }

    #[test]
    fn test_create_embedder_rejects_unknown() {
        assert!(create_embedder("tch", EmbeddingOptions::default()).is_err());
    }
}
