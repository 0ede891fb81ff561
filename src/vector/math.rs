//! Normalization and similarity-scoring primitives.
//!
//! Every vector the engine stores or searches with is unit-normalized first,
//! so inner-product ranking in any backend is equivalent to cosine ranking.

/// Returns a unit-normalized copy of `v`.
///
/// A zero vector is returned unchanged; we never divide by zero.
#[must_use]
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Normalizes `v` in place. Zero vectors are left untouched.
pub fn normalize_in_place(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Dot product of two already-normalized vectors.
///
/// Equivalent to cosine similarity in `[-1, 1]` when both inputs are unit
/// length. Callers are responsible for normalizing first.
#[must_use]
pub fn dot_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
