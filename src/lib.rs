/// The main library module for chunkdex
// Debug macro for consistent debug output
#[macro_export]
macro_rules! debug_print {
    ($self:expr, $($arg:tt)*) => {
        if $crate::config::is_global_debug_enabled() {
            eprintln!("DEBUG: {}", format!($($arg)*));
        }
    };
}

pub mod config;
pub mod error;
pub mod index;
pub mod retrieve;
pub mod store;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{EngineError, EngineResult};
pub use index::{BackendKind, IndexBackend, RemoteIndexClient, RemoteIndexError};
pub use retrieve::{NO_RELEVANT_INFORMATION, assemble_context};
pub use store::{
    Collection, CollectionStats, DocumentStore, SearchOptions, content_hash,
};
pub use types::{
    ChunkId, DocumentRecord, IngestFailure, IngestReport, Metadata, MetadataFilter, MetadataValue,
    NewChunk, RankedResult, metadata_keys,
};
pub use vector::{EmbeddingProvider, HashEmbedder, InputKind, Score, VectorDimension, VectorError};
