// Database module
// Persistent vector store for page chunks, backed by LanceDB

pub mod lancedb;

pub use self::lancedb::vector_store::{SearchResult, VectorStore};
pub use self::lancedb::{ChunkMetadata, EmbeddingRecord, StoreManifest, WriteMode};
