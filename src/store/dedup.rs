//! Content-hash deduplication, scoped per tenant.
//!
//! Every ingested chunk carries the hash of its whole source document in
//! `doc_hash` metadata. The registry remembers which `(doc_hash, username)`
//! pairs are present so re-uploading the same document is a no-op for that
//! tenant while remaining invisible to others. Tombstoned chunks still count
//! as present; only compaction frees their hashes.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::store::document::DocumentTable;
use crate::types::{MetadataValue, metadata_keys};

/// SHA-256 of document content, hex-encoded.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Owners registered for each document hash. An anonymous lookup (`None`)
/// matches a registration by any tenant.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    owners_by_hash: HashMap<String, HashSet<Option<String>>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the registry from the table's physical slots, tombstones
    /// included. Used at snapshot load and after compaction.
    pub fn from_table(table: &DocumentTable) -> Self {
        let mut registry = Self::new();
        for chunk in table.all_chunks() {
            if let Some(MetadataValue::Str(hash)) = chunk.metadata.get(metadata_keys::DOC_HASH) {
                let owner = match chunk.metadata.get(metadata_keys::USERNAME) {
                    Some(MetadataValue::Str(name)) => Some(name.clone()),
                    _ => None,
                };
                registry.record(hash, owner.as_deref());
            }
        }
        registry
    }

    /// Whether `hash` is already registered for this owner. Without an
    /// owner the check is collection-wide: any registration counts.
    pub fn exists(&self, hash: &str, owner: Option<&str>) -> bool {
        match owner {
            Some(owner) => self
                .owners_by_hash
                .get(hash)
                .is_some_and(|owners| owners.contains(&Some(owner.to_string()))),
            None => self.owners_by_hash.contains_key(hash),
        }
    }

    pub fn record(&mut self, hash: &str, owner: Option<&str>) {
        self.owners_by_hash
            .entry(hash.to_string())
            .or_default()
            .insert(owner.map(str::to_string));
    }
}
