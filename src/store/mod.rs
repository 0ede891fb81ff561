//! Document storage: tables, deduplication, persistence, and the collection
//! and store layers that tie them to an index backend.

pub mod collection;
pub mod dedup;
pub mod document;
pub mod engine;
pub mod persist;

pub use collection::{Collection, CollectionStats, SearchOptions};
pub use dedup::{DedupRegistry, content_hash};
pub use document::{DocumentTable, StoredChunk};
pub use engine::DocumentStore;
pub use persist::{CollectionSnapshot, PersistenceLayer};
