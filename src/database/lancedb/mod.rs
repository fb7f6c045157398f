// LanceDB vector database module
// Handles vector storage and similarity search for page chunks


pub mod vector_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::{RagError, Result};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique identifier for this embedding
    pub id: String,
    /// The vector embedding
    pub vector: Vec<f32>,
    /// The chunk this embedding represents
    pub metadata: ChunkMetadata,
}

/// Chunk text and provenance stored alongside its embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub content: String,
    /// Source PDF path
    pub source: String,
    /// 1-based page number
    pub page: u32,
    /// Index of this chunk within its page
    pub chunk_index: u32,
    /// Timestamp when this embedding was created
    pub created_at: String,
}

/// How an ingest run treats a store that already holds vectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Add new records next to the existing ones
    #[default]
    Append,
    /// Replace the store contents with the new records
    Overwrite,
}

impl fmt::Display for WriteMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Records which embedding model produced the vectors in a store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreManifest {
    pub embedding_model: String,
    /// Vector length, known once the first records are written
    pub dimension: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoreManifest {
    #[inline]
    pub fn new(embedding_model: &str) -> Self {
        let now = Utc::now();
        Self {
            embedding_model: embedding_model.to_string(),
            dimension: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read the manifest from a store directory, `None` if the store was never written
    #[inline]
    pub fn load(directory: &Path) -> Result<Option<Self>> {
        let path = directory.join(MANIFEST_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            RagError::FileAccess(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let manifest = serde_json::from_str(&content).map_err(|e| {
            RagError::Database(format!("Corrupt store manifest {}: {}", path.display(), e))
        })?;

        Ok(Some(manifest))
    }

    #[inline]
    pub fn save(&self, directory: &Path) -> Result<()> {
        let path = directory.join(MANIFEST_FILE_NAME);
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RagError::Database(format!("Failed to serialize manifest: {}", e)))?;

        std::fs::write(&path, content).map_err(|e| {
            RagError::FileAccess(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!("Wrote store manifest to {}", path.display());
        Ok(())
    }

    /// Fail if vectors in this store were produced by a different model
    #[inline]
    pub fn ensure_model(&self, embedding_model: &str) -> Result<()> {
        if self.embedding_model == embedding_model {
            Ok(())
        } else {
            Err(RagError::ConfigurationMismatch(format!(
                "Vector store was built with embedding model '{}' but '{}' is configured. \
                 Re-ingest with --overwrite or switch the embedding model back.",
                self.embedding_model, embedding_model
            )))
        }
    }

    /// Fail if `dimension` differs from the recorded vector length
    #[inline]
    pub fn ensure_dimension(&self, dimension: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != dimension => {
                Err(RagError::ConfigurationMismatch(format!(
                    "Vector store holds {}-dimensional vectors but the embedding model produced {}",
                    expected, dimension
                )))
            }
            _ => Ok(()),
        }
    }
}
