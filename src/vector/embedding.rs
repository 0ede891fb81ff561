//! Embedding provider seam.
//!
//! The engine never computes embeddings itself: an external provider turns a
//! text into a fixed-length vector, tagged with whether the text is a stored
//! document or a retrieval query (some providers use asymmetric prompts for
//! the two). This module defines that contract plus a deterministic
//! implementation used by tests and benchmarks.

use crate::error::EngineResult;
use crate::vector::math::normalize_in_place;

/// Whether a text is being embedded for storage or for retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A document chunk about to be stored.
    Document,
    /// A user query about to be searched.
    Query,
}

/// Contract for external embedding providers.
///
/// Implementations must return vectors of a fixed length (`dimension()`)
/// for every input; the engine validates that length against the
/// collection's established dimension.
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single text into a vector of `dimension()` numbers.
    fn embed(&self, text: &str, kind: InputKind) -> EngineResult<Vec<f32>>;

    /// The fixed output dimension of this provider.
    fn dimension(&self) -> usize;
}

/// Deterministic hash-bucket embedder for tests and benchmarks.
///
/// Tokens are hashed into dimension buckets, so identical texts always map
/// to identical vectors and texts sharing words land near each other. Not a
/// semantic model; never use outside test or benchmark code.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder producing vectors of the given length.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str, _kind: InputKind) -> EngineResult<Vec<f32>> {
        use std::hash::{DefaultHasher, Hash, Hasher};

        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dimension as u64) as usize;
            // Sign bit from a higher hash bit keeps buckets from saturating
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize_in_place(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
