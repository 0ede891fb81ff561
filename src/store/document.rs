//! Position-indexed document table with soft deletes.
//!
//! Physical positions are append-only and stable for the lifetime of an
//! index generation: index backends return positions, and the table maps
//! them back to chunks. Deletion tombstones a slot in place (content and
//! embedding wiped, metadata preserved) so positions never shift; compaction
//! is the only operation that renumbers.

use crate::types::{ChunkId, DocumentRecord, Metadata, MetadataFilter, MetadataValue, metadata_keys};
use std::collections::HashMap;

/// One physical slot in the table.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: ChunkId,
    pub content: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

impl StoredChunk {
    pub fn is_deleted(&self) -> bool {
        matches!(
            self.metadata.get(metadata_keys::DELETED),
            Some(MetadataValue::Bool(true))
        )
    }

    fn to_record(&self) -> DocumentRecord {
        DocumentRecord {
            id: self.id.clone(),
            content: self.content.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DocumentTable {
    chunks: Vec<StoredChunk>,
    /// Live ids only; tombstoned slots have no entry.
    id_to_position: HashMap<ChunkId, usize>,
}

impl DocumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassembles a table from snapshot parts. The mapping is rebuilt, not
    /// trusted; the persistence layer validates it against the snapshot
    /// separately.
    pub fn from_chunks(chunks: Vec<StoredChunk>) -> Self {
        let id_to_position = chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| !chunk.is_deleted())
            .map(|(position, chunk)| (chunk.id.clone(), position))
            .collect();
        Self {
            chunks,
            id_to_position,
        }
    }

    /// Appends a chunk at the next position. The caller has already checked
    /// `contains_live` for id collisions.
    pub fn insert(&mut self, chunk: StoredChunk) -> usize {
        let position = self.chunks.len();
        self.id_to_position.insert(chunk.id.clone(), position);
        self.chunks.push(chunk);
        position
    }

    /// Total physical slots, live and tombstoned.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Live documents only.
    pub fn count_live(&self) -> usize {
        self.id_to_position.len()
    }

    pub fn contains_live(&self, id: &ChunkId) -> bool {
        self.id_to_position.contains_key(id)
    }

    /// The chunk at a physical position, tombstoned or not.
    pub fn chunk_at(&self, position: usize) -> Option<&StoredChunk> {
        self.chunks.get(position)
    }

    /// A live document by id. Tombstoned ids are indistinguishable from
    /// never-stored ones.
    pub fn get(&self, id: &ChunkId) -> Option<DocumentRecord> {
        let position = *self.id_to_position.get(id)?;
        Some(self.chunks[position].to_record())
    }

    /// Raw live chunk by id, embedding included.
    pub fn get_chunk(&self, id: &ChunkId) -> Option<&StoredChunk> {
        let position = *self.id_to_position.get(id)?;
        Some(&self.chunks[position])
    }

    /// Tombstones a live document: content and embedding are wiped to free
    /// memory, metadata stays for auditability, and the id leaves the live
    /// mapping. Returns false if the id is not live.
    pub fn soft_delete(&mut self, id: &ChunkId) -> bool {
        let Some(position) = self.id_to_position.remove(id) else {
            return false;
        };
        let chunk = &mut self.chunks[position];
        chunk.content = String::new();
        chunk.embedding = Vec::new();
        chunk
            .metadata
            .insert(metadata_keys::DELETED.to_string(), MetadataValue::Bool(true));
        true
    }

    /// Iterates live chunks in physical order.
    pub fn live_chunks(&self) -> impl Iterator<Item = (usize, &StoredChunk)> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| !chunk.is_deleted())
    }

    /// Iterates every physical slot in order.
    pub fn all_chunks(&self) -> impl Iterator<Item = &StoredChunk> {
        self.chunks.iter()
    }

    /// Live documents matching `filter`, paginated in insertion order.
    pub fn list(
        &self,
        filter: &MetadataFilter,
        limit: usize,
        offset: usize,
    ) -> Vec<DocumentRecord> {
        self.live_chunks()
            .filter(|(_, chunk)| filter.matches(&chunk.metadata))
            .skip(offset)
            .take(limit)
            .map(|(_, chunk)| chunk.to_record())
            .collect()
    }

    /// Live ids matching `filter`, for bulk deletion.
    pub fn live_ids_matching(&self, filter: &MetadataFilter) -> Vec<ChunkId> {
        self.live_chunks()
            .filter(|(_, chunk)| filter.matches(&chunk.metadata))
            .map(|(_, chunk)| chunk.id.clone())
            .collect()
    }

    /// Builds a new table containing only live chunks, renumbered densely.
    /// Used by compaction; the caller rebuilds the index from the returned
    /// table's embeddings.
    pub fn compacted(&self) -> DocumentTable {
        let live: Vec<StoredChunk> = self
            .live_chunks()
            .map(|(_, chunk)| chunk.clone())
            .collect();
        DocumentTable::from_chunks(live)
    }
}
