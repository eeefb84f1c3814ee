//! Hash embeddings
//!
//! FNV-1a feature hashing over analyzed unigrams and bigrams. No model
//! files, fully deterministic, and good enough to exercise the dense path
//! end to end. Real encoders plug in through [`Embedder`].

use std::sync::Arc;

use crate::config::DenseConfig;
use crate::error::{NormError, Result};
use crate::search::analyzer::Analyzer;

/// Pluggable embedding backend interface
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dims(&self) -> usize;
    /// Identifies the model; an index built with a different id is unusable.
    fn model_id(&self) -> String;
}

/// Build an embedder from the dense config section.
pub fn build_embedder(config: &DenseConfig) -> Result<Arc<dyn Embedder>> {
    let backend = config.embedding_backend.trim().to_lowercase();
    let dims = config.embedding_dims as usize;
    if dims == 0 {
        return Err(NormError::Config(
            "dense.embedding_dims must be greater than 0".to_string(),
        ));
    }

    match backend.as_str() {
        "" | "hash" => Ok(Arc::new(HashEmbedder::new(dims))),
        other => Err(NormError::Config(format!(
            "unknown embedding backend: {other}"
        ))),
    }
}

/// Hash embedder using FNV-1a
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    analyzer: Analyzer,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            analyzer: Analyzer::spanish(),
        }
    }

    /// Embed text into an L2-normalized vector (all zeros when nothing survives analysis).
    pub fn embed(&self, text: &str) -> Vec<f32> {
        if self.dim == 0 {
            return Vec::new();
        }

        let tokens = self.analyzer.tokenize(text);
        let mut embedding = vec![0.0; self.dim];

        if tokens.is_empty() {
            return embedding;
        }

        for token in &tokens {
            accumulate_embedding(&mut embedding, token, 1.0);
        }

        for window in tokens.windows(2) {
            let bigram = format!("{} {}", window[0], window[1]);
            accumulate_embedding(&mut embedding, &bigram, 0.5);
        }

        l2_normalize(&mut embedding);
        embedding
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        Self::embed(self, text)
    }

    fn dims(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> String {
        format!("hash-fnv1a-v1-{}", self.dim)
    }
}

fn accumulate_embedding(embedding: &mut [f32], token: &str, weight: f32) {
    let token_hash = fnv1a_hash(token.as_bytes());

    let len = embedding.len() as u64;
    for i in 0..len {
        // FNV low bits are linear in the salt; mix before taking sign and bucket.
        let dim_hash = mix64(fnv1a_hash_with_salt(token_hash, i));
        let sign = if dim_hash >> 63 == 0 { weight } else { -weight };
        let dim = ((dim_hash >> 32) % len) as usize;
        embedding[dim] += sign;
    }
}

/// splitmix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn fnv1a_hash_with_salt(seed: u64, salt: u64) -> u64 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..].copy_from_slice(&salt.to_le_bytes());
    fnv1a_hash(&bytes)
}

fn fnv1a_hash(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Scale `vec` to unit length in place; zero vectors are left alone.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vec.iter_mut() {
            *value /= norm;
        }
    }
}

pub fn l2_norm(vec: &[f32]) -> f32 {
    vec.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product(a, b) / (norm_a * norm_b)
    }
}
