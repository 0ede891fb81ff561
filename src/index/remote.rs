//! Delegation of similarity search to an external index service.
//!
//! The engine never speaks a wire protocol itself; callers supply a
//! `RemoteIndexClient` implementation and the `RemoteIndex` wrapper keeps the
//! backend contract (position-based results, engine error types) intact.
//! Client failures surface as `EngineError::BackendUnavailable` so the
//! collection layer treats a dead service the same as a missing one.

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use super::{BackendKind, IndexBackend};
use crate::error::{EngineError, EngineResult};
use crate::vector::{Score, VectorDimension};

/// Failures a remote client can report.
#[derive(Error, Debug)]
pub enum RemoteIndexError {
    #[error("Remote index unavailable: {0}")]
    Unavailable(String),

    #[error("Remote index protocol error: {0}")]
    Protocol(String),
}

/// Transport-level contract with an external index service.
///
/// Positions are the engine's physical table slots: `add_vectors` announces
/// the slot of the first vector in the batch, and `search` returns slots the
/// service was previously given.
pub trait RemoteIndexClient: Send + Sync + std::fmt::Debug {
    /// Pushes a batch of normalized vectors occupying positions
    /// `base_position..base_position + vectors.len()`.
    fn add_vectors(
        &self,
        base_position: usize,
        vectors: &[Vec<f32>],
    ) -> Result<(), RemoteIndexError>;

    /// Returns up to `k` (position, similarity) pairs, best first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, RemoteIndexError>;

    /// Drops every vector held for this collection.
    fn clear(&self) -> Result<(), RemoteIndexError>;
}

#[derive(Debug)]
pub struct RemoteIndex {
    dimension: usize,
    /// Number of positions announced to the service so far.
    len: usize,
    client: Arc<dyn RemoteIndexClient>,
}

impl RemoteIndex {
    pub fn new(dimension: usize, client: Arc<dyn RemoteIndexClient>) -> Self {
        Self {
            dimension,
            len: 0,
            client,
        }
    }

    /// Reattaches to a service that already holds `len` vectors, used when a
    /// collection is restored from a snapshot. Nothing is re-pushed.
    pub fn attach(dimension: usize, len: usize, client: Arc<dyn RemoteIndexClient>) -> Self {
        Self {
            dimension,
            len,
            client,
        }
    }

    fn unavailable(error: RemoteIndexError) -> EngineError {
        EngineError::BackendUnavailable {
            backend: "remote".to_string(),
            reason: error.to_string(),
        }
    }
}

impl IndexBackend for RemoteIndex {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.len
    }

    fn add_vectors(&mut self, vectors: &[Vec<f32>]) -> EngineResult<()> {
        let dim = VectorDimension::new(self.dimension)?;
        for vector in vectors {
            dim.validate_vector(vector)?;
        }

        self.client
            .add_vectors(self.len, vectors)
            .map_err(Self::unavailable)?;
        self.len += vectors.len();
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        deadline: Option<Instant>,
    ) -> EngineResult<Vec<(usize, Score)>> {
        if k == 0 || self.len == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let hits = self.client.search(query, k).map_err(Self::unavailable)?;

        // The client has no deadline awareness, so enforce it after the call
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            return Err(EngineError::Timeout {
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }

        let mut results = Vec::with_capacity(hits.len());
        for (position, similarity) in hits {
            results.push((position, Score::new(similarity)?));
        }
        results.truncate(k);
        Ok(results)
    }

    fn clear(&mut self) -> EngineResult<()> {
        self.client.clear().map_err(Self::unavailable)?;
        self.len = 0;
        Ok(())
    }

    fn export_index(&self) -> EngineResult<Option<Vec<u8>>> {
        // The service owns its own durability
        Ok(None)
    }
}
