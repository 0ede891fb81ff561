//! Exact flat index: exhaustive dot-product scan over every stored vector.
//!
//! This is the default backend. Recall is perfect and writes are O(1); the
//! cost is a full scan per query, which is acceptable up to roughly a
//! hundred thousand vectors.

use std::time::Instant;

use super::{BackendKind, IndexBackend};
use crate::error::{EngineError, EngineResult};
use crate::vector::{Score, VectorDimension, dot_similarity};

/// How many candidates to score between deadline checks.
const DEADLINE_CHECK_INTERVAL: usize = 1024;

#[derive(Debug)]
pub struct ExactFlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl ExactFlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// Builds an index directly from existing vectors, used when restoring a
    /// collection from a snapshot.
    pub fn from_vectors(dimension: usize, vectors: Vec<Vec<f32>>) -> Self {
        Self { dimension, vectors }
    }
}

impl IndexBackend for ExactFlatIndex {
    fn kind(&self) -> BackendKind {
        BackendKind::Flat
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn add_vectors(&mut self, vectors: &[Vec<f32>]) -> EngineResult<()> {
        let dim = VectorDimension::new(self.dimension)?;
        for vector in vectors {
            dim.validate_vector(vector)?;
        }
        self.vectors.extend(vectors.iter().cloned());
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        deadline: Option<Instant>,
    ) -> EngineResult<Vec<(usize, Score)>> {
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let mut scored: Vec<(usize, Score)> = Vec::with_capacity(self.vectors.len());
        for (position, vector) in self.vectors.iter().enumerate() {
            if position % DEADLINE_CHECK_INTERVAL == 0
                && let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return Err(EngineError::Timeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            let score = Score::new(dot_similarity(query, vector))?;
            scored.push((position, score));
        }

        // Descending by score, insertion order breaks ties
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    fn clear(&mut self) -> EngineResult<()> {
        self.vectors.clear();
        Ok(())
    }

    fn export_index(&self) -> EngineResult<Option<Vec<u8>>> {
        // Nothing to persist: the snapshot's embeddings rebuild this index
        Ok(None)
    }
}
