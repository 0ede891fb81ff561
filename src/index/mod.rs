//! Pluggable vector index backends.
//!
//! Every backend answers the same question: given a normalized query vector,
//! which stored positions have the highest cosine similarity? Positions are
//! physical slots in the owning collection's document table; the caller maps
//! them back to chunk ids and applies tenant and metadata filtering.

pub mod flat;
pub mod ivf;
mod kmeans;
pub mod remote;

pub use flat::ExactFlatIndex;
pub use ivf::IvfFlatIndex;
pub use remote::{RemoteIndex, RemoteIndexClient, RemoteIndexError};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::IndexConfig;
use crate::error::{EngineError, EngineResult};
use crate::vector::Score;

/// Which index implementation a collection uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Exhaustive exact search over every stored vector.
    #[default]
    Flat,
    /// Inverted-file clustering: approximate search probing a subset of
    /// cluster cells.
    Ivf,
    /// Delegation to an external index service.
    Remote,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Ivf => write!(f, "ivf"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A similarity index over the vectors of one collection.
///
/// Vectors handed to `add_vectors` are already normalized, so dot product
/// equals cosine similarity. Implementations never see document content or
/// metadata.
pub trait IndexBackend: Send + Sync + std::fmt::Debug {
    /// Which implementation this is.
    fn kind(&self) -> BackendKind;

    /// Dimensionality the index was created with.
    fn dimension(&self) -> usize;

    /// Number of vectors currently indexed (including slots whose documents
    /// were tombstoned; the caller filters those out of results).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends vectors at the next physical positions. All-or-nothing: on
    /// error the index is unchanged.
    fn add_vectors(&mut self, vectors: &[Vec<f32>]) -> EngineResult<()>;

    /// Returns up to `k` (position, score) pairs ordered by descending score,
    /// ties broken by ascending position. A `deadline` in the past yields a
    /// `Timeout` error.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        deadline: Option<Instant>,
    ) -> EngineResult<Vec<(usize, Score)>>;

    /// Removes every vector.
    fn clear(&mut self) -> EngineResult<()>;

    /// Serializes backend-specific state for persistence. `None` means the
    /// backend has nothing beyond the vectors themselves (they are rebuilt
    /// from the snapshot's embeddings).
    fn export_index(&self) -> EngineResult<Option<Vec<u8>>>;
}

/// Instantiates an empty backend of the configured kind.
///
/// A `Remote` kind without an attached client fails up front rather than on
/// the first operation.
pub fn create_backend(
    kind: BackendKind,
    dimension: usize,
    config: &IndexConfig,
    remote: Option<Arc<dyn RemoteIndexClient>>,
) -> EngineResult<Box<dyn IndexBackend>> {
    match kind {
        BackendKind::Flat => Ok(Box::new(ExactFlatIndex::new(dimension))),
        BackendKind::Ivf => Ok(Box::new(IvfFlatIndex::new(
            dimension,
            config.nlist,
            config.nprobe,
        ))),
        BackendKind::Remote => match remote {
            Some(client) => Ok(Box::new(RemoteIndex::new(dimension, client))),
            None => Err(EngineError::BackendUnavailable {
                backend: "remote".to_string(),
                reason: "no remote index client configured".to_string(),
            }),
        },
    }
}
