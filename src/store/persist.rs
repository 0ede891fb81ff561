//! Snapshot persistence for collections.
//!
//! Each collection writes two files under the configured persist directory:
//!
//! - `<name>_data.json` — documents, metadata, embeddings and the live-id
//!   mapping, serialized as JSON.
//! - `<name>.index` — backend-specific binary state (currently only the IVF
//!   backend emits one), read back through a memory map.
//!
//! Writes go to a temp file in the same directory followed by an atomic
//! rename, so a crash mid-write leaves the previous snapshot intact. Loads
//! validate structural integrity before any state is swapped in; a corrupted
//! snapshot is an error, not a silent empty collection.

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::store::document::{DocumentTable, StoredChunk};
use crate::types::DocumentRecord;

/// Current snapshot schema version.
const SNAPSHOT_VERSION: u32 = 1;

/// On-disk image of one collection.
#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub version: u32,
    pub collection: String,
    /// Locked dimension; `None` for a collection that never stored a vector.
    pub dimension: Option<usize>,
    /// Every physical slot in order, tombstones included.
    pub documents: Vec<DocumentRecord>,
    /// Embeddings aligned with `documents`; tombstoned slots hold an empty
    /// vector.
    pub embeddings: Vec<Vec<f32>>,
    /// Live id to physical position.
    pub id_to_position: HashMap<String, usize>,
}

impl CollectionSnapshot {
    /// Captures the current table state.
    pub fn capture(collection: &str, dimension: Option<usize>, table: &DocumentTable) -> Self {
        let mut documents = Vec::with_capacity(table.len());
        let mut embeddings = Vec::with_capacity(table.len());
        let mut id_to_position = HashMap::new();

        for (position, chunk) in table.all_chunks().enumerate() {
            documents.push(DocumentRecord {
                id: chunk.id.clone(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
            });
            embeddings.push(chunk.embedding.clone());
            if !chunk.is_deleted() {
                id_to_position.insert(chunk.id.as_str().to_string(), position);
            }
        }

        Self {
            version: SNAPSHOT_VERSION,
            collection: collection.to_string(),
            dimension,
            documents,
            embeddings,
            id_to_position,
        }
    }

    /// Rebuilds the document table from the snapshot.
    pub fn into_table(self) -> DocumentTable {
        let chunks = self
            .documents
            .into_iter()
            .zip(self.embeddings)
            .map(|(record, embedding)| StoredChunk {
                id: record.id,
                content: record.content,
                metadata: record.metadata,
                embedding,
            })
            .collect();
        DocumentTable::from_chunks(chunks)
    }

    /// Structural integrity check. Returns the failure reason.
    fn validate(&self) -> Result<(), String> {
        if self.version != SNAPSHOT_VERSION {
            return Err(format!("unsupported snapshot version {}", self.version));
        }
        if self.dimension.is_none() && !self.documents.is_empty() {
            return Err("snapshot has documents but no dimension".to_string());
        }
        if self.embeddings.len() != self.documents.len() {
            return Err(format!(
                "embedding count {} does not match document count {}",
                self.embeddings.len(),
                self.documents.len()
            ));
        }

        // The mapping must cover exactly the live documents
        let mut expected_live = HashSet::new();
        for (position, (record, embedding)) in
            self.documents.iter().zip(self.embeddings.iter()).enumerate()
        {
            let deleted = matches!(
                record.metadata.get(crate::types::metadata_keys::DELETED),
                Some(crate::types::MetadataValue::Bool(true))
            );
            if deleted {
                continue;
            }
            expected_live.insert((record.id.as_str().to_string(), position));
            if let Some(dimension) = self.dimension
                && embedding.len() != dimension
            {
                return Err(format!(
                    "embedding at position {position} has dimension {}, expected {dimension}",
                    embedding.len()
                ));
            }
        }

        let actual_live: HashSet<(String, usize)> = self
            .id_to_position
            .iter()
            .map(|(id, &position)| (id.clone(), position))
            .collect();
        if actual_live != expected_live {
            return Err("id mapping does not match live documents".to_string());
        }
        for &position in self.id_to_position.values() {
            if position >= self.documents.len() {
                return Err(format!("mapped position {position} out of range"));
            }
        }

        Ok(())
    }
}

/// Files of one collection on disk.
#[derive(Debug, Clone)]
pub struct PersistenceLayer {
    directory: PathBuf,
    name: String,
}

impl PersistenceLayer {
    pub fn new(directory: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
        }
    }

    pub fn data_path(&self) -> PathBuf {
        self.directory.join(format!("{}_data.json", self.name))
    }

    pub fn index_path(&self) -> PathBuf {
        self.directory.join(format!("{}.index", self.name))
    }

    /// Writes the snapshot atomically.
    pub fn save_snapshot(&self, snapshot: &CollectionSnapshot) -> EngineResult<()> {
        let path = self.data_path();
        let json = serde_json::to_vec(snapshot).map_err(|e| EngineError::PersistenceFailure {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;
        self.write_atomic(&path, &json)?;
        debug!(
            collection = %self.name,
            documents = snapshot.documents.len(),
            path = %path.display(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Loads and validates the snapshot. `Ok(None)` means no snapshot exists.
    pub fn load_snapshot(&self) -> EngineResult<Option<CollectionSnapshot>> {
        let path = self.data_path();
        if !path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(&path).map_err(|e| EngineError::PersistenceFailure {
            path: path.clone(),
            source: e,
        })?;
        let snapshot: CollectionSnapshot =
            serde_json::from_slice(&bytes).map_err(|e| EngineError::SnapshotCorrupted {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        snapshot
            .validate()
            .map_err(|reason| EngineError::SnapshotCorrupted {
                path: path.clone(),
                reason,
            })?;

        info!(
            collection = %self.name,
            documents = snapshot.documents.len(),
            "snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    /// Writes backend state; `None` removes any stale index file so a
    /// restored collection never trains on outdated clusters.
    pub fn save_index_bytes(&self, bytes: Option<&[u8]>) -> EngineResult<()> {
        let path = self.index_path();
        match bytes {
            Some(bytes) => self.write_atomic(&path, bytes),
            None => {
                if path.exists() {
                    std::fs::remove_file(&path).map_err(|e| EngineError::PersistenceFailure {
                        path,
                        source: e,
                    })?;
                }
                Ok(())
            }
        }
    }

    /// Memory-maps the index file if present.
    pub fn load_index_bytes(&self) -> EngineResult<Option<Mmap>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path).map_err(|e| EngineError::PersistenceFailure {
            path: path.clone(),
            source: e,
        })?;
        // Safety: the file is never written in place; saves go through rename
        let mmap = unsafe {
            Mmap::map(&file).map_err(|e| EngineError::PersistenceFailure { path, source: e })?
        };
        Ok(Some(mmap))
    }

    /// Deletes both collection files. Missing files are not an error.
    pub fn remove(&self) -> EngineResult<()> {
        for path in [self.data_path(), self.index_path()] {
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| EngineError::PersistenceFailure {
                    path,
                    source: e,
                })?;
            }
        }
        Ok(())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> EngineResult<()> {
        std::fs::create_dir_all(&self.directory).map_err(|e| EngineError::PersistenceFailure {
            path: self.directory.clone(),
            source: e,
        })?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.directory).map_err(|e| {
            EngineError::PersistenceFailure {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        temp.write_all(bytes)
            .map_err(|e| EngineError::PersistenceFailure {
                path: path.to_path_buf(),
                source: e,
            })?;
        temp.persist(path)
            .map_err(|e| EngineError::PersistenceFailure {
                path: path.to_path_buf(),
                source: e.error,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkId, Metadata};
    use tempfile::TempDir;

    fn sample_table() -> DocumentTable {
        let mut table = DocumentTable::new();
        table.insert(StoredChunk {
            id: ChunkId::new("a"),
            content: "first".to_string(),
            metadata: Metadata::new(),
            embedding: vec![1.0, 0.0],
        });
        table.insert(StoredChunk {
            id: ChunkId::new("b"),
            content: "second".to_string(),
            metadata: Metadata::new(),
            embedding: vec![0.0, 1.0],
        });
        table.soft_delete(&ChunkId::new("a"));
        table
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let layer = PersistenceLayer::new(dir.path(), "docs");

        let table = sample_table();
        let snapshot = CollectionSnapshot::capture("docs", Some(2), &table);
        layer.save_snapshot(&snapshot).unwrap();

        let loaded = layer.load_snapshot().unwrap().unwrap();
        assert_eq!(loaded.dimension, Some(2));
        assert_eq!(loaded.documents.len(), 2);

        let restored = loaded.into_table();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.count_live(), 1);
        assert_eq!(restored.get(&ChunkId::new("b")).unwrap().content, "second");
        assert!(restored.get(&ChunkId::new("a")).is_none());
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        let layer = PersistenceLayer::new(dir.path(), "docs");
        assert!(layer.load_snapshot().unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_is_corruption() {
        let dir = TempDir::new().unwrap();
        let layer = PersistenceLayer::new(dir.path(), "docs");
        std::fs::write(layer.data_path(), b"{not json").unwrap();

        let result = layer.load_snapshot();
        assert!(matches!(result, Err(EngineError::SnapshotCorrupted { .. })));
    }

    #[test]
    fn test_misaligned_embeddings_rejected() {
        let dir = TempDir::new().unwrap();
        let layer = PersistenceLayer::new(dir.path(), "docs");

        let table = sample_table();
        let mut snapshot = CollectionSnapshot::capture("docs", Some(2), &table);
        snapshot.embeddings.pop();
        let json = serde_json::to_vec(&snapshot).unwrap();
        std::fs::write(layer.data_path(), json).unwrap();

        let result = layer.load_snapshot();
        assert!(matches!(result, Err(EngineError::SnapshotCorrupted { .. })));
    }

    #[test]
    fn test_stale_mapping_rejected() {
        let dir = TempDir::new().unwrap();
        let layer = PersistenceLayer::new(dir.path(), "docs");

        let table = sample_table();
        let mut snapshot = CollectionSnapshot::capture("docs", Some(2), &table);
        // Resurrect the tombstoned id in the mapping
        snapshot.id_to_position.insert("a".to_string(), 0);
        let json = serde_json::to_vec(&snapshot).unwrap();
        std::fs::write(layer.data_path(), json).unwrap();

        let result = layer.load_snapshot();
        assert!(matches!(result, Err(EngineError::SnapshotCorrupted { .. })));
    }

    #[test]
    fn test_remove_deletes_both_files() {
        let dir = TempDir::new().unwrap();
        let layer = PersistenceLayer::new(dir.path(), "docs");

        let table = sample_table();
        layer
            .save_snapshot(&CollectionSnapshot::capture("docs", Some(2), &table))
            .unwrap();
        layer.save_index_bytes(Some(b"CDXI")).unwrap();
        assert!(layer.data_path().exists());
        assert!(layer.index_path().exists());

        layer.remove().unwrap();
        assert!(!layer.data_path().exists());
        assert!(!layer.index_path().exists());
    }

    #[test]
    fn test_index_bytes_round_trip() {
        let dir = TempDir::new().unwrap();
        let layer = PersistenceLayer::new(dir.path(), "docs");

        layer.save_index_bytes(Some(b"CDXI payload")).unwrap();
        let mmap = layer.load_index_bytes().unwrap().unwrap();
        assert_eq!(&mmap[..], b"CDXI payload");

        layer.save_index_bytes(None).unwrap();
        assert!(layer.load_index_bytes().unwrap().is_none());
    }
}
