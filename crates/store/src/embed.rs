//! Embedding seam.
//!
//! The embedding model itself is an external collaborator; the platform
//! only needs a deterministic `text → vector` mapping of a fixed
//! dimension. [`HashEmbedder`] is the built-in stand-in: a hashed
//! bag-of-tokens projection that is stable across runs, which is all the
//! retrieval tests and the reference deployment rely on. Real models plug
//! in behind the same trait.

use sha2::{Digest, Sha256};

/// Maps text to a fixed-dimension embedding.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Deterministic hashed bag-of-tokens embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_ascii_lowercase().as_bytes());
            let bucket = u64::from_be_bytes(digest[..8].try_into().unwrap_or([0; 8]))
                as usize
                % self.dimension;
            // Second hash byte decides the sign, keeping buckets balanced.
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(embedder.embed("parse order id"), embedder.embed("parse order id"));
    }

    #[test]
    fn test_dimension_and_norm() {
        let embedder = HashEmbedder::new(32);
        let v = embedder.embed("NullPointerException Bar.java");
        assert_eq!(v.len(), 32);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_tokens_increase_similarity() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("com.foo.Bar.baz Bar.java");
        let b = embedder.embed("com.foo.Bar.baz Bar.java handler");
        let c = embedder.embed("totally unrelated words here");
        let dot = |x: &[f32], y: &[f32]| -> f32 { x.iter().zip(y).map(|(p, q)| p * q).sum() };
        assert!(dot(&a, &b) > dot(&a, &c));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(16);
        assert!(embedder.embed("").iter().all(|&x| x == 0.0));
    }
}
