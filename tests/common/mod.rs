// Not every test binary uses every helper
#![allow(dead_code)]

use std::sync::{Arc, Once};
use tempfile::TempDir;

use chunkdex::{
    Collection, DocumentStore, EmbeddingProvider, HashEmbedder, InputKind, NewChunk, Settings,
    content_hash, metadata_keys,
};

static TRACING: Once = Once::new();

/// Routes engine logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "chunkdex=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Creates a DocumentStore with an isolated persist directory for testing.
/// The TempDir must outlive the store or persistence silently fails.
pub fn create_test_store() -> (DocumentStore, TempDir) {
    init_tracing();
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let mut settings = Settings::default();
    settings.storage.persist_path = temp_dir.path().to_path_buf();
    settings.workspace_root = Some(temp_dir.path().to_path_buf());

    (DocumentStore::new(settings), temp_dir)
}

/// A chunk with an explicit id and raw embedding.
pub fn chunk(id: &str, content: &str, embedding: &[f32]) -> NewChunk {
    NewChunk::new(content, embedding.to_vec()).with_id(id)
}

/// Embeds a document and splits it into per-sentence chunks the way the
/// upstream ingestion pipeline would, all sharing one doc_hash.
pub fn embedded_document(
    embedder: &HashEmbedder,
    owner: &str,
    file_name: &str,
    sentences: &[&str],
) -> Vec<NewChunk> {
    let whole: String = sentences.join(" ");
    let hash = content_hash(&whole);

    sentences
        .iter()
        .enumerate()
        .map(|(i, sentence)| {
            let embedding = embedder
                .embed(sentence, InputKind::Document)
                .expect("hash embedder never fails");
            NewChunk::new(*sentence, embedding)
                .with_metadata(metadata_keys::DOC_HASH, hash.as_str())
                .with_metadata(metadata_keys::USERNAME, owner)
                .with_metadata(metadata_keys::FILE_NAME, file_name)
                .with_metadata(metadata_keys::CHUNK_INDEX, i as i64)
        })
        .collect()
}

/// Shorthand for exercising a collection through the store.
pub fn test_collection(store: &DocumentStore, name: &str) -> Arc<Collection> {
    init_tracing();
    store.collection(name).expect("collection should open")
}
