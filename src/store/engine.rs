//! The `DocumentStore`: named collections behind a concurrent registry.
//!
//! Collections are opened lazily and cached; two threads asking for the same
//! name get the same `Arc<Collection>`. The store itself holds no document
//! state, so its registry lock is never held across a search or ingest.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Settings;
use crate::error::EngineResult;
use crate::index::RemoteIndexClient;
use crate::store::collection::{Collection, SearchOptions};
use crate::types::RankedResult;

pub struct DocumentStore {
    settings: Settings,
    remote: Option<Arc<dyn RemoteIndexClient>>,
    collections: DashMap<String, Arc<Collection>>,
}

impl DocumentStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            remote: None,
            collections: DashMap::new(),
        }
    }

    /// A store whose collections delegate indexing to an external service.
    /// Only used when `index.backend = "remote"`.
    pub fn with_remote_client(settings: Settings, client: Arc<dyn RemoteIndexClient>) -> Self {
        Self {
            settings,
            remote: Some(client),
            collections: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Opens (or returns the cached) collection with this name.
    pub fn collection(&self, name: &str) -> EngineResult<Arc<Collection>> {
        if let Some(existing) = self.collections.get(name) {
            return Ok(Arc::clone(existing.value()));
        }

        // Opening is idempotent, so losing a race just wastes one load
        let opened = Arc::new(Collection::open(
            name,
            &self.settings.storage.persist_path,
            self.settings.index.backend,
            self.settings.index.clone(),
            self.remote.clone(),
        )?);
        let entry = self
            .collections
            .entry(name.to_string())
            .or_insert(opened);
        Ok(Arc::clone(entry.value()))
    }

    /// The collection named in the configuration.
    pub fn default_collection(&self) -> EngineResult<Arc<Collection>> {
        self.collection(&self.settings.storage.collection)
    }

    /// Searches a collection with the configured defaults: `top_k` from
    /// `search.default_limit`, and `search.timeout_ms` as the deadline when
    /// the caller did not set one.
    pub fn search(
        &self,
        collection: &str,
        query: &[f32],
        options: &SearchOptions,
    ) -> EngineResult<Vec<RankedResult>> {
        let collection = self.collection(collection)?;
        let mut options = options.clone();
        if options.timeout.is_none() && self.settings.search.timeout_ms > 0 {
            options.timeout = Some(Duration::from_millis(self.settings.search.timeout_ms));
        }
        collection.search(query, self.settings.search.default_limit, &options)
    }

    /// Resets a collection and evicts it from the registry. Its persisted
    /// files are removed.
    pub fn drop_collection(&self, name: &str) -> EngineResult<()> {
        let collection = self.collection(name)?;
        collection.reset()?;
        self.collections.remove(name);
        info!(collection = name, "collection dropped");
        Ok(())
    }

    /// Names of the collections opened by this process.
    pub fn open_collections(&self) -> Vec<String> {
        self.collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("open_collections", &self.collections.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewChunk;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.storage.persist_path = dir.path().to_path_buf();
        settings
    }

    #[test]
    fn test_collection_is_cached() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(settings_in(&dir));

        let a = store.collection("docs").unwrap();
        let b = store.collection("docs").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.open_collections(), vec!["docs".to_string()]);
    }

    #[test]
    fn test_default_collection_uses_configured_name() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir);
        settings.storage.collection = "articles".to_string();
        let store = DocumentStore::new(settings);

        let collection = store.default_collection().unwrap();
        assert_eq!(collection.name(), "articles");
    }

    #[test]
    fn test_store_search_uses_configured_limit() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir);
        settings.search.default_limit = 2;
        let store = DocumentStore::new(settings);

        let collection = store.collection("docs").unwrap();
        collection
            .add_documents(vec![
                NewChunk::new("one", vec![1.0, 0.0]),
                NewChunk::new("two", vec![0.9, 0.1]),
                NewChunk::new("three", vec![0.0, 1.0]),
            ])
            .unwrap();

        let results = store
            .search("docs", &[1.0, 0.0], &crate::store::SearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_drop_collection_removes_files() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::new(settings_in(&dir));

        let collection = store.collection("docs").unwrap();
        collection
            .add_documents(vec![NewChunk::new("text", vec![1.0, 0.0])])
            .unwrap();
        assert!(dir.path().join("docs_data.json").exists());

        store.drop_collection("docs").unwrap();
        assert!(!dir.path().join("docs_data.json").exists());
        assert!(store.open_collections().is_empty());
    }
}
