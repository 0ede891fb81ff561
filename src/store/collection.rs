//! A collection: one document table, one dedup registry, one index backend,
//! guarded by a single reader-writer lock.
//!
//! The lock discipline keeps the core invariant simple: the backend always
//! holds exactly one vector per physical table slot, in the same order.
//! Mutations validate and touch the backend before the table, so a backend
//! failure leaves both unchanged. Persistence happens after the lock is
//! released; a failed save is logged and costs durability, never
//! correctness of the in-memory state.

use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::error::{EngineError, EngineResult};
use crate::index::{BackendKind, IndexBackend, IvfFlatIndex, RemoteIndex, RemoteIndexClient, create_backend};
use crate::store::dedup::DedupRegistry;
use crate::store::document::{DocumentTable, StoredChunk};
use crate::store::persist::{CollectionSnapshot, PersistenceLayer};
use crate::types::{
    ChunkId, DocumentRecord, IngestFailure, IngestReport, MetadataFilter, MetadataValue, NewChunk,
    RankedResult, metadata_keys,
};
use crate::vector::{VectorDimension, normalize};

/// Per-query knobs for `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Restrict results to documents owned by this tenant.
    pub tenant: Option<String>,
    /// Exact-match metadata conjunction applied after scoring.
    pub filter: MetadataFilter,
    /// Deadline for the query; `None` means unbounded.
    pub timeout: Option<Duration>,
}

/// Point-in-time counters for observability.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub live_documents: usize,
    pub tombstones: usize,
    pub dimension: Option<usize>,
    pub backend: BackendKind,
}

struct CollectionState {
    /// Locked on first insert; `None` until then.
    dimension: Option<usize>,
    table: DocumentTable,
    dedup: DedupRegistry,
    /// Created together with the dimension.
    backend: Option<Box<dyn IndexBackend>>,
}

pub struct Collection {
    name: String,
    backend_kind: BackendKind,
    index_config: IndexConfig,
    remote: Option<Arc<dyn RemoteIndexClient>>,
    persistence: PersistenceLayer,
    inner: RwLock<CollectionState>,
}

impl Collection {
    /// Opens a collection, restoring any persisted snapshot.
    pub fn open(
        name: &str,
        persist_dir: &Path,
        backend_kind: BackendKind,
        index_config: IndexConfig,
        remote: Option<Arc<dyn RemoteIndexClient>>,
    ) -> EngineResult<Self> {
        if backend_kind == BackendKind::Remote && remote.is_none() {
            return Err(EngineError::BackendUnavailable {
                backend: "remote".to_string(),
                reason: "no remote index client configured".to_string(),
            });
        }

        let persistence = PersistenceLayer::new(persist_dir, name);
        let state = match persistence.load_snapshot()? {
            Some(snapshot) => {
                let dimension = snapshot.dimension;
                let table = snapshot.into_table();
                let dedup = DedupRegistry::from_table(&table);
                let backend = match dimension {
                    Some(dimension) if !table.is_empty() => Some(Self::restore_backend(
                        name,
                        backend_kind,
                        &index_config,
                        remote.clone(),
                        &persistence,
                        dimension,
                        &table,
                    )?),
                    _ => None,
                };
                info!(
                    collection = name,
                    live = table.count_live(),
                    slots = table.len(),
                    backend = %backend_kind,
                    "collection restored"
                );
                CollectionState {
                    dimension,
                    table,
                    dedup,
                    backend,
                }
            }
            None => CollectionState {
                dimension: None,
                table: DocumentTable::new(),
                dedup: DedupRegistry::new(),
                backend: None,
            },
        };

        Ok(Self {
            name: name.to_string(),
            backend_kind,
            index_config,
            remote,
            persistence,
            inner: RwLock::new(state),
        })
    }

    /// Rebuilds the index backend for a restored table. The IVF backend
    /// prefers its exported index file; a missing or stale file falls back
    /// to retraining from the snapshot's embeddings.
    fn restore_backend(
        name: &str,
        kind: BackendKind,
        config: &IndexConfig,
        remote: Option<Arc<dyn RemoteIndexClient>>,
        persistence: &PersistenceLayer,
        dimension: usize,
        table: &DocumentTable,
    ) -> EngineResult<Box<dyn IndexBackend>> {
        // Tombstoned slots keep their position with a zero vector
        let vectors = || -> Vec<Vec<f32>> {
            table
                .all_chunks()
                .map(|chunk| {
                    if chunk.embedding.is_empty() {
                        vec![0.0; dimension]
                    } else {
                        chunk.embedding.clone()
                    }
                })
                .collect()
        };

        match kind {
            BackendKind::Flat => Ok(Box::new(crate::index::ExactFlatIndex::from_vectors(
                dimension,
                vectors(),
            ))),
            BackendKind::Ivf => {
                if let Some(mmap) = persistence.load_index_bytes()? {
                    match IvfFlatIndex::from_export(config.nlist, config.nprobe, &mmap) {
                        Ok(index) if index.dimension() == dimension && index.len() == table.len() => {
                            return Ok(Box::new(index));
                        }
                        Ok(_) => {
                            warn!(collection = name, "index file out of sync, retraining");
                        }
                        Err(reason) => {
                            warn!(collection = name, %reason, "index file unreadable, retraining");
                        }
                    }
                }
                Ok(Box::new(IvfFlatIndex::from_vectors(
                    dimension,
                    config.nlist,
                    config.nprobe,
                    vectors(),
                )?))
            }
            BackendKind::Remote => {
                let client = remote.ok_or_else(|| EngineError::BackendUnavailable {
                    backend: "remote".to_string(),
                    reason: "no remote index client configured".to_string(),
                })?;
                Ok(Box::new(RemoteIndex::attach(dimension, table.len(), client)))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ingests a batch of embedded chunks. Individual malformed chunks are
    /// skipped and reported; a backend failure aborts the whole batch with
    /// nothing stored.
    ///
    /// Duplicate suppression works at batch granularity: `doc_hash` values
    /// are checked against what was registered before this call, so the
    /// chunks of one document (sharing its hash) all land together, and a
    /// later re-upload of the same document is skipped.
    pub fn add_documents(&self, chunks: Vec<NewChunk>) -> EngineResult<IngestReport> {
        let mut report = IngestReport::default();
        let mut accepted: Vec<StoredChunk> = Vec::with_capacity(chunks.len());
        let mut accepted_hashes: Vec<(String, Option<String>)> = Vec::new();

        let mut state = self.inner.write();

        for (index, chunk) in chunks.into_iter().enumerate() {
            if chunk.embedding.is_empty() {
                report.failures.push(IngestFailure {
                    index,
                    message: "chunk has no embedding".to_string(),
                });
                continue;
            }

            let owner = match chunk.metadata.get(metadata_keys::USERNAME) {
                Some(MetadataValue::Str(name)) => Some(name.clone()),
                _ => None,
            };
            if let Some(MetadataValue::Str(hash)) = chunk.metadata.get(metadata_keys::DOC_HASH)
                && state.dedup.exists(hash, owner.as_deref())
            {
                debug!(collection = %self.name, index, "duplicate document skipped");
                report.skipped_duplicates += 1;
                continue;
            }

            // First stored vector locks the collection's dimension
            let dimension = match state.dimension {
                Some(dimension) => dimension,
                None => match VectorDimension::new(chunk.embedding.len()) {
                    Ok(dim) => {
                        state.dimension = Some(dim.get());
                        dim.get()
                    }
                    Err(e) => {
                        report.failures.push(IngestFailure {
                            index,
                            message: e.to_string(),
                        });
                        continue;
                    }
                },
            };
            if chunk.embedding.len() != dimension {
                report.failures.push(IngestFailure {
                    index,
                    message: format!(
                        "embedding dimension {} does not match collection dimension {dimension}",
                        chunk.embedding.len()
                    ),
                });
                continue;
            }

            let id = chunk.id.unwrap_or_else(ChunkId::generate);
            if state.table.contains_live(&id) || accepted.iter().any(|c| c.id == id) {
                report.failures.push(IngestFailure {
                    index,
                    message: format!("document id '{id}' already exists"),
                });
                continue;
            }

            if let Some(MetadataValue::Str(hash)) = chunk.metadata.get(metadata_keys::DOC_HASH) {
                accepted_hashes.push((hash.clone(), owner));
            }
            accepted.push(StoredChunk {
                id,
                content: chunk.content,
                metadata: chunk.metadata,
                embedding: normalize(&chunk.embedding),
            });
        }

        if !accepted.is_empty() {
            if state.backend.is_none() {
                let dimension = state
                    .dimension
                    .ok_or_else(|| EngineError::Config {
                        reason: "collection dimension not set".to_string(),
                    })?;
                match create_backend(
                    self.backend_kind,
                    dimension,
                    &self.index_config,
                    self.remote.clone(),
                ) {
                    Ok(backend) => state.backend = Some(backend),
                    Err(e) => {
                        if state.table.is_empty() {
                            state.dimension = None;
                        }
                        return Err(e);
                    }
                }
            }

            // Backend first: if it rejects the batch, the table is untouched
            let vectors: Vec<Vec<f32>> = accepted.iter().map(|c| c.embedding.clone()).collect();
            if let Some(backend) = state.backend.as_mut()
                && let Err(e) = backend.add_vectors(&vectors)
            {
                // A dimension adopted by this failed batch must not stick
                if state.table.is_empty() {
                    state.dimension = None;
                    state.backend = None;
                }
                return Err(e);
            }

            for chunk in accepted {
                report.ids.push(chunk.id.clone());
                state.table.insert(chunk);
            }
            for (hash, owner) in accepted_hashes {
                state.dedup.record(&hash, owner.as_deref());
            }
        }

        info!(
            collection = %self.name,
            added = report.added(),
            duplicates = report.skipped_duplicates,
            failed = report.failures.len(),
            "ingest batch finished"
        );

        let persist = self.capture_for_persist(&state);
        drop(state);
        self.write_captured(persist);

        Ok(report)
    }

    /// Scores the query against the index and resolves hits to live
    /// documents, applying tenant and metadata post-filters.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        options: &SearchOptions,
    ) -> EngineResult<Vec<RankedResult>> {
        if top_k == 0 {
            warn!(collection = %self.name, "zero top_k, returning no results");
            return Ok(Vec::new());
        }

        let state = self.inner.read();
        let (Some(dimension), Some(backend)) = (state.dimension, state.backend.as_ref()) else {
            warn!(collection = %self.name, "search against empty collection");
            return Ok(Vec::new());
        };
        VectorDimension::new(dimension)?.validate_vector(query)?;

        let query = normalize(query);
        let deadline = options.timeout.map(|t| Instant::now() + t);

        // Tombstones and post-filters eat into the hit list, so overfetch:
        // filtered queries can lose arbitrarily many hits and scan the full
        // candidate set, unfiltered ones only need headroom for tombstones.
        let tombstones = state.table.len() - state.table.count_live();
        let fetch_k = if options.tenant.is_some() || !options.filter.is_empty() {
            state.table.len()
        } else {
            top_k + tombstones
        };

        let hits = backend.search(&query, fetch_k, deadline)?;

        let mut results = Vec::with_capacity(top_k.min(hits.len()));
        for (position, score) in hits {
            let Some(chunk) = state.table.chunk_at(position) else {
                debug!(collection = %self.name, position, "backend returned unknown position");
                continue;
            };
            if chunk.is_deleted() {
                continue;
            }
            if let Some(tenant) = &options.tenant {
                let owner = chunk.metadata.get(metadata_keys::USERNAME);
                if owner != Some(&MetadataValue::Str(tenant.clone())) {
                    continue;
                }
            }
            if !options.filter.matches(&chunk.metadata) {
                continue;
            }
            results.push(RankedResult {
                id: chunk.id.clone(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                score,
            });
            if results.len() == top_k {
                break;
            }
        }

        debug!(
            collection = %self.name,
            top_k,
            returned = results.len(),
            "search finished"
        );
        Ok(results)
    }

    /// Tombstones one document and compacts. When `requester` is given the
    /// document must be owned by that tenant; a document whose owner cannot
    /// be verified is never deleted on a tenant's behalf. Returns false if
    /// the id is not live.
    pub fn delete_document(&self, id: &ChunkId, requester: Option<&str>) -> EngineResult<bool> {
        let mut state = self.inner.write();
        let Some(chunk) = state.table.get_chunk(id) else {
            return Ok(false);
        };

        if let Some(requester) = requester {
            match chunk.metadata.get(metadata_keys::USERNAME) {
                Some(MetadataValue::Str(owner)) if owner == requester => {}
                _ => {
                    return Err(EngineError::Unauthorized {
                        id: id.to_string(),
                    });
                }
            }
        }

        state.table.soft_delete(id);
        self.compact_state(&mut state)?;
        info!(collection = %self.name, %id, "document deleted");

        let persist = self.capture_for_persist(&state);
        drop(state);
        self.write_captured(persist);
        Ok(true)
    }

    /// Tombstones every live document matching `filter`, then compacts once.
    /// Returns the number of documents removed. An empty filter is a no-op;
    /// wiping the collection takes an explicit `reset`.
    pub fn delete_documents(&self, filter: &MetadataFilter) -> EngineResult<usize> {
        if filter.is_empty() {
            warn!(collection = %self.name, "delete_documents called without filter criteria");
            return Ok(0);
        }
        let mut state = self.inner.write();
        let ids = state.table.live_ids_matching(filter);
        for id in &ids {
            state.table.soft_delete(id);
        }
        if !ids.is_empty() {
            self.compact_state(&mut state)?;
            info!(collection = %self.name, removed = ids.len(), "documents deleted by filter");
        }

        let persist = self.capture_for_persist(&state);
        drop(state);
        if !ids.is_empty() {
            self.write_captured(persist);
        }
        Ok(ids.len())
    }

    /// Physically removes tombstones and rebuilds the index densely.
    pub fn compact(&self) -> EngineResult<()> {
        let mut state = self.inner.write();
        self.compact_state(&mut state)?;
        let persist = self.capture_for_persist(&state);
        drop(state);
        self.write_captured(persist);
        Ok(())
    }

    /// Core of compaction: build replacement table and backend as
    /// temporaries, then swap. A failure mid-rebuild leaves the old
    /// generation serving.
    fn compact_state(&self, state: &mut CollectionState) -> EngineResult<()> {
        let tombstones = state.table.len() - state.table.count_live();
        if tombstones == 0 {
            return Ok(());
        }

        let new_table = state.table.compacted();
        if new_table.is_empty() {
            // Nothing left: drop everything, including the dimension lock
            state.table = DocumentTable::new();
            state.dedup = DedupRegistry::new();
            state.backend = None;
            state.dimension = None;
            if let Err(e) = self.persistence.remove() {
                warn!(collection = %self.name, error = %e, "failed to remove persisted files");
            }
            info!(collection = %self.name, "collection emptied by compaction");
            return Ok(());
        }

        let dimension = state.dimension.ok_or_else(|| EngineError::Config {
            reason: "collection has documents but no dimension".to_string(),
        })?;
        let vectors: Vec<Vec<f32>> = new_table
            .all_chunks()
            .map(|chunk| chunk.embedding.clone())
            .collect();

        let mut new_backend = create_backend(
            self.backend_kind,
            dimension,
            &self.index_config,
            self.remote.clone(),
        )?;
        // The remote service still holds the old generation
        new_backend.clear()?;
        new_backend.add_vectors(&vectors)?;

        state.dedup = DedupRegistry::from_table(&new_table);
        state.table = new_table;
        state.backend = Some(new_backend);
        info!(
            collection = %self.name,
            removed = tombstones,
            remaining = state.table.len(),
            "compaction finished"
        );
        Ok(())
    }

    /// Drops every document and the persisted files.
    pub fn reset(&self) -> EngineResult<()> {
        let mut state = self.inner.write();
        if let Some(backend) = state.backend.as_mut() {
            backend.clear()?;
        }
        state.table = DocumentTable::new();
        state.dedup = DedupRegistry::new();
        state.backend = None;
        state.dimension = None;
        drop(state);

        self.persistence.remove()?;
        info!(collection = %self.name, "collection reset");
        Ok(())
    }

    /// A live document by id.
    pub fn get_document(&self, id: &ChunkId) -> Option<DocumentRecord> {
        self.inner.read().table.get(id)
    }

    /// Live documents matching `filter`, paginated in insertion order.
    pub fn list_documents(
        &self,
        filter: &MetadataFilter,
        limit: usize,
        offset: usize,
    ) -> Vec<DocumentRecord> {
        self.inner.read().table.list(filter, limit, offset)
    }

    /// Number of live documents.
    pub fn count_documents(&self) -> usize {
        self.inner.read().table.count_live()
    }

    /// Whether `hash` is already registered, for this owner when given or
    /// for any tenant otherwise.
    pub fn exists_by_hash(&self, hash: &str, owner: Option<&str>) -> bool {
        self.inner.read().dedup.exists(hash, owner)
    }

    pub fn stats(&self) -> CollectionStats {
        let state = self.inner.read();
        CollectionStats {
            name: self.name.clone(),
            live_documents: state.table.count_live(),
            tombstones: state.table.len() - state.table.count_live(),
            dimension: state.dimension,
            backend: self.backend_kind,
        }
    }

    /// Captures everything persistence needs while the lock is still held.
    fn capture_for_persist(
        &self,
        state: &CollectionState,
    ) -> (CollectionSnapshot, Option<Vec<u8>>) {
        let snapshot = CollectionSnapshot::capture(&self.name, state.dimension, &state.table);
        let index_bytes = match state.backend.as_ref().map(|b| b.export_index()) {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                warn!(collection = %self.name, error = %e, "index export failed");
                None
            }
            None => None,
        };
        (snapshot, index_bytes)
    }

    /// Writes the captured state to disk. Failures are logged; the running
    /// process keeps serving from memory.
    fn write_captured(&self, captured: (CollectionSnapshot, Option<Vec<u8>>)) {
        let (snapshot, index_bytes) = captured;
        if snapshot.documents.is_empty() {
            // Emptied collections have their files removed by compaction
            return;
        }
        if let Err(e) = self.persistence.save_snapshot(&snapshot) {
            warn!(collection = %self.name, error = %e, "snapshot save failed");
        }
        if let Err(e) = self.persistence.save_index_bytes(index_bytes.as_deref()) {
            warn!(collection = %self.name, error = %e, "index save failed");
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("backend", &self.backend_kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::dedup::content_hash;
    use crate::vector::normalize;
    use tempfile::TempDir;

    fn open_flat(dir: &TempDir) -> Collection {
        Collection::open(
            "test",
            dir.path(),
            BackendKind::Flat,
            IndexConfig::default(),
            None,
        )
        .unwrap()
    }

    fn chunk(id: &str, content: &str, embedding: &[f32]) -> NewChunk {
        NewChunk::new(content, embedding.to_vec()).with_id(id)
    }

    #[test]
    fn test_add_and_search_round_trip() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);

        let report = collection
            .add_documents(vec![
                chunk("a", "about cats", &[1.0, 0.0, 0.0]),
                chunk("b", "about dogs", &[0.0, 1.0, 0.0]),
                chunk("c", "about fish", &[0.0, 0.0, 1.0]),
            ])
            .unwrap();
        assert_eq!(report.added(), 3);

        let results = collection
            .search(&[0.9, 0.1, 0.0], 2, &SearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, ChunkId::new("a"));
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_dimension_locked_by_first_insert() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);

        let report = collection
            .add_documents(vec![
                chunk("a", "three dims", &[1.0, 0.0, 0.0]),
                chunk("b", "two dims", &[1.0, 0.0]),
            ])
            .unwrap();
        assert_eq!(report.added(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("dimension"));

        // Queries with the wrong dimension are an error, not empty results
        let result = collection.search(&[1.0, 0.0], 1, &SearchOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_document_skipped_for_same_tenant_only() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);
        let hash = content_hash("the report");

        let alice = chunk("a", "the report", &[1.0, 0.0])
            .with_metadata(metadata_keys::DOC_HASH, hash.as_str())
            .with_metadata(metadata_keys::USERNAME, "alice");
        assert_eq!(collection.add_documents(vec![alice]).unwrap().added(), 1);

        // Same document, same tenant: skipped
        let again = chunk("a2", "the report", &[1.0, 0.0])
            .with_metadata(metadata_keys::DOC_HASH, hash.as_str())
            .with_metadata(metadata_keys::USERNAME, "alice");
        let report = collection.add_documents(vec![again]).unwrap();
        assert_eq!(report.added(), 0);
        assert_eq!(report.skipped_duplicates, 1);

        // Same document, different tenant: stored
        let bob = chunk("b", "the report", &[1.0, 0.0])
            .with_metadata(metadata_keys::DOC_HASH, hash.as_str())
            .with_metadata(metadata_keys::USERNAME, "bob");
        assert_eq!(collection.add_documents(vec![bob]).unwrap().added(), 1);
        assert!(collection.exists_by_hash(&hash, Some("alice")));
        assert!(collection.exists_by_hash(&hash, Some("bob")));
    }

    #[test]
    fn test_anonymous_upload_deduped_against_any_tenant() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);
        let hash = content_hash("the report");

        let alice = chunk("a", "the report", &[1.0, 0.0])
            .with_metadata(metadata_keys::DOC_HASH, hash.as_str())
            .with_metadata(metadata_keys::USERNAME, "alice");
        assert_eq!(collection.add_documents(vec![alice]).unwrap().added(), 1);

        // Ownerless lookups see every registration
        assert!(collection.exists_by_hash(&hash, None));

        // An ownerless re-upload of a document alice already indexed is skipped
        let anonymous = chunk("a2", "the report", &[1.0, 0.0])
            .with_metadata(metadata_keys::DOC_HASH, hash.as_str());
        let report = collection.add_documents(vec![anonymous]).unwrap();
        assert_eq!(report.added(), 0);
        assert_eq!(report.skipped_duplicates, 1);
    }

    #[test]
    fn test_delete_by_empty_filter_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);

        collection
            .add_documents(vec![
                chunk("a", "first", &[1.0, 0.0]),
                chunk("b", "second", &[0.0, 1.0]),
            ])
            .unwrap();

        // No criteria removes nothing; wiping everything takes reset()
        assert_eq!(
            collection.delete_documents(&MetadataFilter::new()).unwrap(),
            0
        );
        assert_eq!(collection.count_documents(), 2);
    }

    #[test]
    fn test_empty_query_is_a_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);

        collection
            .add_documents(vec![chunk("a", "doc", &[1.0, 0.0])])
            .unwrap();

        let err = collection
            .search(&[], 5, &SearchOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Vector(_)));
    }

    #[test]
    fn test_multi_chunk_document_ingests_atomically() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);
        let hash = content_hash("long document");

        // Both chunks share the document hash; dedup is checked against the
        // registry as of batch start, so both land
        let report = collection
            .add_documents(vec![
                chunk("a", "part one", &[1.0, 0.0])
                    .with_metadata(metadata_keys::DOC_HASH, hash.as_str()),
                chunk("b", "part two", &[0.0, 1.0])
                    .with_metadata(metadata_keys::DOC_HASH, hash.as_str()),
            ])
            .unwrap();
        assert_eq!(report.added(), 2);
        assert_eq!(report.skipped_duplicates, 0);
    }

    #[test]
    fn test_tenant_isolation_in_search() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);

        collection
            .add_documents(vec![
                chunk("a", "alice doc", &[1.0, 0.0])
                    .with_metadata(metadata_keys::USERNAME, "alice"),
                chunk("b", "bob doc", &[1.0, 0.0]).with_metadata(metadata_keys::USERNAME, "bob"),
            ])
            .unwrap();

        let options = SearchOptions {
            tenant: Some("alice".to_string()),
            ..Default::default()
        };
        let results = collection.search(&[1.0, 0.0], 10, &options).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, ChunkId::new("a"));
    }

    #[test]
    fn test_delete_requires_matching_owner() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);

        collection
            .add_documents(vec![
                chunk("a", "alice doc", &[1.0, 0.0])
                    .with_metadata(metadata_keys::USERNAME, "alice"),
                chunk("orphan", "no owner", &[0.0, 1.0]),
            ])
            .unwrap();

        let err = collection
            .delete_document(&ChunkId::new("a"), Some("bob"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized { .. }));

        // Unverifiable owner is also refused on a tenant's behalf
        let err = collection
            .delete_document(&ChunkId::new("orphan"), Some("bob"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized { .. }));

        assert!(collection
            .delete_document(&ChunkId::new("a"), Some("alice"))
            .unwrap());
        assert!(collection.get_document(&ChunkId::new("a")).is_none());
        assert_eq!(collection.count_documents(), 1);
    }

    #[test]
    fn test_deleted_documents_never_surface_in_search() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);

        collection
            .add_documents(vec![
                chunk("a", "target", &[1.0, 0.0]),
                chunk("b", "decoy", &[0.9, 0.1]),
            ])
            .unwrap();
        collection.delete_document(&ChunkId::new("a"), None).unwrap();

        let results = collection
            .search(&[1.0, 0.0], 10, &SearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, ChunkId::new("b"));
    }

    #[test]
    fn test_delete_by_filter_and_hash_release() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);
        let hash = content_hash("notes");

        collection
            .add_documents(vec![
                chunk("a", "notes p1", &[1.0, 0.0])
                    .with_metadata(metadata_keys::FILE_NAME, "notes.txt")
                    .with_metadata(metadata_keys::DOC_HASH, hash.as_str()),
                chunk("b", "notes p2", &[0.0, 1.0])
                    .with_metadata(metadata_keys::FILE_NAME, "notes.txt")
                    .with_metadata(metadata_keys::DOC_HASH, hash.as_str()),
                chunk("c", "other", &[0.5, 0.5]),
            ])
            .unwrap();

        let filter = MetadataFilter::new().with(metadata_keys::FILE_NAME, "notes.txt");
        assert_eq!(collection.delete_documents(&filter).unwrap(), 2);
        assert_eq!(collection.count_documents(), 1);

        // Compaction freed the hash, so re-upload succeeds
        assert!(!collection.exists_by_hash(&hash, None));
        let report = collection
            .add_documents(vec![chunk("a2", "notes p1", &[1.0, 0.0])
                .with_metadata(metadata_keys::DOC_HASH, hash.as_str())])
            .unwrap();
        assert_eq!(report.added(), 1);
    }

    #[test]
    fn test_deleting_everything_resets_dimension() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);

        collection
            .add_documents(vec![chunk("a", "only", &[1.0, 0.0, 0.0])])
            .unwrap();
        collection.delete_document(&ChunkId::new("a"), None).unwrap();

        assert_eq!(collection.count_documents(), 0);
        assert_eq!(collection.stats().dimension, None);

        // A different dimension is accepted now
        let report = collection
            .add_documents(vec![chunk("b", "fresh", &[1.0, 0.0])])
            .unwrap();
        assert_eq!(report.added(), 1);
    }

    #[test]
    fn test_persistence_round_trip_across_open() {
        let dir = TempDir::new().unwrap();
        {
            let collection = open_flat(&dir);
            collection
                .add_documents(vec![
                    chunk("a", "persisted", &[1.0, 0.0]),
                    chunk("b", "also persisted", &[0.0, 1.0]),
                ])
                .unwrap();
        }

        let reopened = open_flat(&dir);
        assert_eq!(reopened.count_documents(), 2);
        let results = reopened
            .search(&[1.0, 0.0], 1, &SearchOptions::default())
            .unwrap();
        assert_eq!(results[0].id, ChunkId::new("a"));
        assert_eq!(results[0].content, "persisted");
    }

    #[test]
    fn test_scores_are_cosine_on_unnormalized_input() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);

        // Magnitudes differ wildly; cosine must see identical directions
        collection
            .add_documents(vec![chunk("a", "long vector", &[100.0, 0.0])])
            .unwrap();
        let results = collection
            .search(&normalize(&[3.0, 0.0]), 1, &SearchOptions::default())
            .unwrap();
        assert!((results[0].score.get() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_metadata_filter_applies_after_scoring() {
        let dir = TempDir::new().unwrap();
        let collection = open_flat(&dir);

        collection
            .add_documents(vec![
                chunk("a", "best match wrong file", &[1.0, 0.0])
                    .with_metadata(metadata_keys::FILE_NAME, "a.txt"),
                chunk("b", "worse match right file", &[0.7, 0.7])
                    .with_metadata(metadata_keys::FILE_NAME, "b.txt"),
            ])
            .unwrap();

        let options = SearchOptions {
            filter: MetadataFilter::new().with(metadata_keys::FILE_NAME, "b.txt"),
            ..Default::default()
        };
        let results = collection.search(&[1.0, 0.0], 1, &options).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, ChunkId::new("b"));
    }
}
