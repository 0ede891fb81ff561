//! Type-safe wrappers for vector search primitives.
//!
//! Newtypes here guard the two numeric invariants the engine depends on:
//! vector dimensions never change once a collection has adopted one, and
//! similarity scores stay inside the cosine range.

use thiserror::Error;

/// Type-safe wrapper for similarity scores.
///
/// Scores are cosine similarities of unit-normalized vectors, so they live
/// in `[-1.0, 1.0]` where 1.0 is a perfect match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score(f32);

/// Floating-point slack tolerated before an out-of-range score is rejected.
const SCORE_EPSILON: f32 = 1e-4;

impl Score {
    /// Creates a new `Score` with validation.
    ///
    /// NaN is rejected. Values that overshoot the cosine range by no more
    /// than floating-point noise are clamped; anything further out is an
    /// error.
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score cannot be NaN",
            });
        }
        if !(-1.0 - SCORE_EPSILON..=1.0 + SCORE_EPSILON).contains(&value) {
            return Err(VectorError::InvalidScore {
                value,
                reason: "Score must be in the cosine range [-1.0, 1.0]",
            });
        }
        Ok(Self(value.clamp(-1.0, 1.0)))
    }

    /// Creates a score of 1.0 (perfect similarity).
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .partial_cmp(&other.0)
            .expect("Score values should never be NaN")
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// A collection adopts the dimension of the first chunk it stores; every
/// later chunk and query is validated against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during vector operations.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all chunks and queries use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid score value: {value}\nReason: {reason}")]
    InvalidScore { value: f32, reason: &'static str },
}
