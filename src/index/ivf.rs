//! IVF-flat index: vectors are partitioned into cluster cells and queries
//! only scan the cells whose centroids are closest to the query.
//!
//! The cell count defaults to sqrt(n) when not configured. Writes retrain
//! the clustering over the full vector set, which keeps recall stable as
//! the collection grows; write cost is the trade-off.
//!
//! # Binary Index Format
//!
//! `export_index` emits a little-endian file image so a restored collection
//! can skip retraining:
//!
//! ```text
//! [magic: 4 bytes "CDXI"]
//! [version: u32]
//! [dimension: u32]
//! [count: u32]
//! [nlist: u32]
//! [centroids: nlist * dimension * f32]
//! [assignments: count * u32]
//! [vectors: count * dimension * f32]
//! ```

use std::time::Instant;

use super::kmeans::{kmeans_clustering, nearest_centroids};
use super::{BackendKind, IndexBackend};
use crate::error::{EngineError, EngineResult};
use crate::vector::{Score, VectorDimension, dot_similarity};

/// Magic bytes identifying an index file.
const MAGIC: &[u8; 4] = b"CDXI";

/// Current index file format version.
const FORMAT_VERSION: u32 = 1;

/// Largest automatic cell count.
const MAX_AUTO_NLIST: usize = 100;

/// How many candidates to score between deadline checks.
const DEADLINE_CHECK_INTERVAL: usize = 1024;

#[derive(Debug)]
pub struct IvfFlatIndex {
    dimension: usize,
    /// Configured cell count; 0 means sqrt(n) chosen at training time.
    nlist: usize,
    nprobe: usize,
    vectors: Vec<Vec<f32>>,
    centroids: Vec<Vec<f32>>,
    assignments: Vec<u32>,
}

impl IvfFlatIndex {
    pub fn new(dimension: usize, nlist: usize, nprobe: usize) -> Self {
        Self {
            dimension,
            nlist,
            nprobe: nprobe.max(1),
            vectors: Vec::new(),
            centroids: Vec::new(),
            assignments: Vec::new(),
        }
    }

    /// Rebuilds the index from snapshot embeddings when no index file is
    /// available. Trains immediately.
    pub fn from_vectors(
        dimension: usize,
        nlist: usize,
        nprobe: usize,
        vectors: Vec<Vec<f32>>,
    ) -> EngineResult<Self> {
        let mut index = Self::new(dimension, nlist, nprobe);
        if !vectors.is_empty() {
            index.vectors = vectors;
            index.train()?;
        }
        Ok(index)
    }

    /// Restores an index from the bytes of an exported index file. Returns
    /// the parse failure reason on malformed input; the caller attaches the
    /// file path.
    pub fn from_export(nlist: usize, nprobe: usize, bytes: &[u8]) -> Result<Self, String> {
        let mut reader = ByteReader::new(bytes);

        let magic = reader.take(4)?;
        if magic != MAGIC {
            return Err("bad magic bytes".to_string());
        }
        let version = reader.read_u32()?;
        if version != FORMAT_VERSION {
            return Err(format!("unsupported index format version {version}"));
        }

        let dimension = reader.read_u32()? as usize;
        let count = reader.read_u32()? as usize;
        let stored_nlist = reader.read_u32()? as usize;
        if dimension == 0 {
            return Err("zero dimension".to_string());
        }

        let mut centroids = Vec::with_capacity(stored_nlist);
        for _ in 0..stored_nlist {
            centroids.push(reader.read_f32_vec(dimension)?);
        }

        let mut assignments = Vec::with_capacity(count);
        for _ in 0..count {
            let cell = reader.read_u32()?;
            if stored_nlist > 0 && cell as usize >= stored_nlist {
                return Err(format!("assignment {cell} out of range"));
            }
            assignments.push(cell);
        }

        let mut vectors = Vec::with_capacity(count);
        for _ in 0..count {
            vectors.push(reader.read_f32_vec(dimension)?);
        }

        if !reader.is_exhausted() {
            return Err("trailing bytes after index payload".to_string());
        }

        Ok(Self {
            dimension,
            nlist,
            nprobe: nprobe.max(1),
            vectors,
            centroids,
            assignments,
        })
    }

    /// Cell count used at training time.
    fn effective_nlist(&self) -> usize {
        let n = self.vectors.len().max(1);
        let wanted = if self.nlist == 0 {
            ((n as f64).sqrt() as usize).clamp(1, MAX_AUTO_NLIST)
        } else {
            self.nlist
        };
        wanted.clamp(1, n)
    }

    /// Retrains centroids and assignments over the full vector set.
    fn train(&mut self) -> EngineResult<()> {
        if self.vectors.is_empty() {
            self.centroids.clear();
            self.assignments.clear();
            return Ok(());
        }

        let k = self.effective_nlist();
        let result =
            kmeans_clustering(&self.vectors, k).map_err(|e| EngineError::BackendUnavailable {
                backend: "ivf".to_string(),
                reason: e.to_string(),
            })?;
        self.centroids = result.centroids;
        self.assignments = result.assignments;
        Ok(())
    }
}

impl IndexBackend for IvfFlatIndex {
    fn kind(&self) -> BackendKind {
        BackendKind::Ivf
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

        let previous_len = self.vectors.len();
        self.vectors.extend(vectors.iter().cloned());
        if let Err(e) = self.train() {
            self.vectors.truncate(previous_len);
            return Err(e);
        }
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
        let probes = nearest_centroids(query, &self.centroids, self.nprobe);

        let mut scored: Vec<(usize, Score)> = Vec::new();
        let mut scanned = 0usize;
        for (position, vector) in self.vectors.iter().enumerate() {
            if !probes.contains(&self.assignments[position]) {
                continue;
            }
            if scanned % DEADLINE_CHECK_INTERVAL == 0
                && let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return Err(EngineError::Timeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            scanned += 1;
            let score = Score::new(dot_similarity(query, vector))?;
            scored.push((position, score));
        }

        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    fn clear(&mut self) -> EngineResult<()> {
        self.vectors.clear();
        self.centroids.clear();
        self.assignments.clear();
        Ok(())
    }

    fn export_index(&self) -> EngineResult<Option<Vec<u8>>> {
        let mut buffer = Vec::with_capacity(
            16 + (self.centroids.len() + self.vectors.len()) * self.dimension * 4
                + self.assignments.len() * 4,
        );

        buffer.extend_from_slice(MAGIC);
        buffer.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buffer.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        buffer.extend_from_slice(&(self.vectors.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&(self.centroids.len() as u32).to_le_bytes());

        for centroid in &self.centroids {
            for &value in centroid {
                buffer.extend_from_slice(&value.to_le_bytes());
            }
        }
        for &cell in &self.assignments {
            buffer.extend_from_slice(&cell.to_le_bytes());
        }
        for vector in &self.vectors {
            for &value in vector {
                buffer.extend_from_slice(&value.to_le_bytes());
            }
        }

        Ok(Some(buffer))
    }
}

/// Minimal little-endian cursor over the exported byte image.
struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| "unexpected end of index file".to_string())?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, String> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f32_vec(&mut self, len: usize) -> Result<Vec<f32>, String> {
        let bytes = self.take(len * 4)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn is_exhausted(&self) -> bool {
        self.offset == self.bytes.len()
    }
}
