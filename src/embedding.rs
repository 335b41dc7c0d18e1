//! Embedding layer.
//!
//! Text is turned into fixed-length, L2-normalized vectors through the
//! [`Embedder`] trait. [`HashEmbedder`] needs no model and is always
//! available; [`FastEmbedder`] loads all-MiniLM-L6-v2 when the `semantic`
//! feature is enabled.

use crate::error::Result;
use crate::text::tokenize;
use async_trait::async_trait;

/// Text → vector backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Feature-hashing embedder.
///
/// Every token is hashed into one of `dimension` buckets; the bucket counts
/// are then normalized. Texts sharing vocabulary land close together, which
/// is enough for ranking without a model download.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Synchronous core, shared with benches and tests.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(feature = "semantic")]
pub use model::FastEmbedder;

#[cfg(feature = "semantic")]
mod model {
    use super::{Embedder, normalize};
    use crate::error::{ContextError, Result};
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Arc;

    /// all-MiniLM-L6-v2 through fastembed.
    pub struct FastEmbedder {
        model: Arc<TextEmbedding>,
    }

    impl FastEmbedder {
        pub const DIMENSION: usize = 384;

        pub fn new() -> Result<Self> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
            )
            .map_err(|e| {
                ContextError::Computation(format!("failed to initialize embedding model: {e}"))
            })?;

            Ok(Self {
                model: Arc::new(model),
            })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedder {
        fn name(&self) -> &str {
            "all-minilm-l6-v2"
        }

        fn dimension(&self) -> usize {
            Self::DIMENSION
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let model = Arc::clone(&self.model);
            let text = text.to_string();

            // Inference is CPU bound
            let embeddings = tokio::task::spawn_blocking(move || model.embed(vec![text], None))
                .await
                .map_err(|e| ContextError::Computation(format!("embedding task failed: {e}")))?
                .map_err(|e| ContextError::Computation(format!("failed to embed text: {e}")))?;

            let mut vector = embeddings
                .into_iter()
                .next()
                .ok_or_else(|| ContextError::Computation("no embedding generated".into()))?;
            normalize(&mut vector);
            Ok(vector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedding_is_normalized() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed_sync("parse the config file");
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let v = HashEmbedder::new(16).embed_sync("  ... ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_sync("user authentication token");
        let close = embedder.embed_sync("validate the authentication token for a user");
        let far = embedder.embed_sync("render chart axis labels");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_trait_embed_matches_sync() {
        let embedder = HashEmbedder::new(32);
        let via_trait = embedder.embed("hello world").await.unwrap();
        assert_eq!(via_trait, embedder.embed_sync("hello world"));
        assert_eq!(embedder.dimension(), 32);
    }
}
