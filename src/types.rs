//! Core data model: chunk identifiers, scalar metadata, ingestion inputs and
//! retrieval outputs.
//!
//! Metadata values are restricted to scalars at the type level so every
//! stored record is filterable with exact-match comparisons; the original
//! motivation is tenant isolation (`username`) and per-file cleanup
//! (`file_name`) which both rely on exact equality.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::vector::Score;

/// Well-known metadata keys the engine itself reads or writes.
pub mod metadata_keys {
    /// Content hash of the source document, used for deduplication.
    pub const DOC_HASH: &str = "doc_hash";
    /// Owning tenant of the chunk.
    pub const USERNAME: &str = "username";
    /// Originating file name, used for bulk deletion.
    pub const FILE_NAME: &str = "file_name";
    /// Position of the chunk within its source document.
    pub const CHUNK_INDEX: &str = "chunk_index";
    /// Soft-delete tombstone marker.
    pub const DELETED: &str = "deleted";
}

/// Opaque unique identifier of a stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Wraps a caller-supplied identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier (32 hex chars).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::rng().random();
        let mut s = String::with_capacity(32);
        for b in bytes {
            s.push_str(&format!("{b:02x}"));
        }
        Self(s)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A scalar metadata value. Nested structures are rejected by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Chunk metadata: string keys mapped to scalar values, sorted for stable
/// serialization.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Exact-match conjunction over metadata key/value pairs.
///
/// A document matches when every filter entry equals the corresponding
/// metadata value; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter(BTreeMap<String, MetadataValue>);

impl MetadataFilter {
    /// An empty filter that matches every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style entry addition.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// True when no entries are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Evaluates the conjunction against a document's metadata.
    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// An embedded chunk handed to the engine by the external chunking and
/// embedding collaborators.
///
/// The engine never computes embeddings or chunk boundaries itself.
#[derive(Debug, Clone)]
pub struct NewChunk {
    /// Caller-supplied identifier; generated at insertion when absent.
    pub id: Option<ChunkId>,
    /// Chunk text.
    pub content: String,
    /// Embedding vector. Normalized by the engine before indexing.
    pub embedding: Vec<f32>,
    /// Arbitrary scalar metadata.
    pub metadata: Metadata,
}

impl NewChunk {
    /// Creates a chunk with empty metadata.
    pub fn new(content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: None,
            content: content.into(),
            embedding,
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builder-style explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(ChunkId::new(id));
        self
    }
}

/// A live document as returned by `get_document` / `list_documents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: ChunkId,
    pub content: String,
    pub metadata: Metadata,
}

/// One search hit: the resolved document plus its similarity score.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub id: ChunkId,
    pub content: String,
    pub metadata: Metadata,
    pub score: Score,
}

/// Per-chunk failure inside a batch ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFailure {
    /// Position of the chunk in the submitted batch.
    pub index: usize,
    /// Human-readable reason the chunk was skipped.
    pub message: String,
}

/// Outcome of an `add_documents` batch.
///
/// A malformed chunk never aborts the batch: it is skipped, logged, and
/// reported here so the caller can reconcile counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Ids of the chunks that were stored, in submission order.
    pub ids: Vec<ChunkId>,
    /// Chunks skipped because their `(doc_hash, username)` pair was already
    /// registered.
    pub skipped_duplicates: usize,
    /// Chunks skipped for other reasons (missing embedding, dimension
    /// mismatch, duplicate id).
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    /// Number of chunks actually stored.
    #[must_use]
    pub fn added(&self) -> usize {
        self.ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_generation_is_unique() {
        let a = ChunkId::generate();
        let b = ChunkId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_metadata_filter_conjunction() {
        let mut metadata = Metadata::new();
        metadata.insert(metadata_keys::USERNAME.to_string(), "alice".into());
        metadata.insert(metadata_keys::FILE_NAME.to_string(), "notes.txt".into());
        metadata.insert(metadata_keys::CHUNK_INDEX.to_string(), 3i64.into());

        assert!(MetadataFilter::new().matches(&metadata));
        assert!(
            MetadataFilter::new()
                .with(metadata_keys::USERNAME, "alice")
                .with(metadata_keys::FILE_NAME, "notes.txt")
                .matches(&metadata)
        );
        assert!(
            !MetadataFilter::new()
                .with(metadata_keys::USERNAME, "alice")
                .with(metadata_keys::FILE_NAME, "other.txt")
                .matches(&metadata)
        );
        // Typed comparison: int 3 is not string "3"
        assert!(
            !MetadataFilter::new()
                .with(metadata_keys::CHUNK_INDEX, "3")
                .matches(&metadata)
        );
    }

    #[test]
    fn test_metadata_value_serde_round_trip() {
        let mut metadata = Metadata::new();
        metadata.insert("flag".to_string(), true.into());
        metadata.insert("count".to_string(), 7i64.into());
        metadata.insert("weight".to_string(), 0.5f64.into());
        metadata.insert("name".to_string(), "chunk".into());

        let json = serde_json::to_string(&metadata).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata, back);
    }
}
