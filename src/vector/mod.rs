//! Vector math and embedding primitives for the retrieval engine.
//!
//! Stored and query vectors are all unit-normalized before they reach an
//! index backend, so inner-product ranking equals cosine ranking everywhere.

mod embedding;
mod math;
mod types;

pub use embedding::{EmbeddingProvider, HashEmbedder, InputKind};
pub use math::{dot_similarity, normalize, normalize_in_place};
pub use types::{Score, VectorDimension, VectorError};
