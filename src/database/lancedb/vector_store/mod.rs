
use super::{ChunkMetadata, EmbeddingRecord, StoreManifest, WriteMode};
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TABLE_NAME: &str = "embeddings";

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    directory: PathBuf,
    embedding_model: String,
    manifest: StoreManifest,
    vector_dimension: Option<usize>,
    write_mode: WriteMode,
}

/// Search result from vector similarity search
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_metadata: ChunkMetadata,
    pub similarity_score: f32,
    /// Cosine distance to the query, smaller is closer
    pub distance: f32,
}

impl VectorStore {
    /// Open a store for ingesting
    ///
    /// The directory must already exist. In append mode the store must have
    /// been built with `embedding_model`; overwrite mode replaces the
    /// contents on the first write.
    #[inline]
    pub async fn open_for_write(
        directory: &Path,
        embedding_model: &str,
        write_mode: WriteMode,
    ) -> Result<Self> {
        let mut store = Self::open(directory, embedding_model, write_mode).await?;

        if write_mode == WriteMode::Append {
            store.manifest.ensure_model(embedding_model)?;
        }
        store.write_mode = write_mode;

        Ok(store)
    }

    /// Open an existing store for retrieval
    #[inline]
    pub async fn open_for_read(directory: &Path, embedding_model: &str) -> Result<Self> {
        let store = Self::open(directory, embedding_model, WriteMode::Append).await?;
        store.manifest.ensure_model(embedding_model)?;
        Ok(store)
    }

    async fn open(directory: &Path, embedding_model: &str, write_mode: WriteMode) -> Result<Self> {
        if !directory.is_dir() {
            return Err(RagError::FileAccess(format!(
                "Vector store directory not found: {}",
                directory.display()
            )));
        }

        // Relative paths would otherwise turn into the host part of the URI
        let directory = std::fs::canonicalize(directory).map_err(|e| {
            RagError::FileAccess(format!(
                "Failed to resolve vector store directory {}: {}",
                directory.display(),
                e
            ))
        })?;

        debug!("Connecting to LanceDB at path: {:?}", directory);
        let uri = format!("file://{}", directory.display());
        let connection = lancedb::connect(&uri).execute().await.map_err(|e| {
            RagError::FileAccess(format!(
                "Failed to open vector store at {}: {}",
                directory.display(),
                e
            ))
        })?;

        let existing = match StoreManifest::load(&directory) {
            Err(RagError::Database(message)) if write_mode == WriteMode::Overwrite => {
                warn!("Ignoring unreadable manifest before overwrite: {}", message);
                None
            }
            other => other?,
        };
        let manifest = existing
            .clone()
            .unwrap_or_else(|| StoreManifest::new(embedding_model));

        let mut store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            directory,
            embedding_model: embedding_model.to_string(),
            manifest,
            vector_dimension: None,
            write_mode: WriteMode::Append,
        };

        if store.table_exists().await? {
            let dimension = store.detect_existing_vector_dimension().await?;
            store.vector_dimension = Some(dimension);
            info!("Detected existing vector dimension: {}", dimension);

            // Tables written without a manifest carry no model record
            if existing.is_none() {
                warn!(
                    "Vector store at {} has no manifest, assuming model {}",
                    store.directory.display(),
                    embedding_model
                );
                store.manifest.dimension = Some(dimension);
            }
        }

        Ok(store)
    }

    /// The model and dimension this store was built with
    #[inline]
    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;

        Ok(table_names.contains(&self.table_name))
    }

    /// Detect vector dimension from existing table schema
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open existing table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Create schema with the specified vector dimension
    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("page", DataType::UInt32, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Persist records and update the manifest
    ///
    /// All vectors must share one length, and in append mode it must match
    /// the length already stored. Returns the number of records written.
    #[inline]
    pub async fn add_records(&mut self, records: &[EmbeddingRecord]) -> Result<usize> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(0);
        }

        let vector_dim = records[0].vector.len();
        if vector_dim == 0 {
            return Err(RagError::ConfigurationMismatch(
                "Embedding model returned empty vectors".to_string(),
            ));
        }
        if let Some(record) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(RagError::ConfigurationMismatch(format!(
                "Embedding {} has {} dimensions, expected {}",
                record.id,
                record.vector.len(),
                vector_dim
            )));
        }

        if self.write_mode == WriteMode::Overwrite {
            info!("Overwriting vector store at {}", self.directory.display());
            self.drop_table_if_exists().await?;
            self.vector_dimension = None;
            self.manifest = StoreManifest::new(&self.embedding_model);
            // Later batches in the same run append to what this one wrote
            self.write_mode = WriteMode::Append;
        } else {
            self.manifest.ensure_dimension(vector_dim)?;
            if let Some(existing) = self.vector_dimension {
                if existing != vector_dim {
                    return Err(RagError::ConfigurationMismatch(format!(
                        "Vector store holds {}-dimensional vectors but the embedding model produced {}",
                        existing, vector_dim
                    )));
                }
            }
        }

        if self.vector_dimension.is_none() {
            self.connection
                .create_empty_table(&self.table_name, Self::create_schema(vector_dim))
                .execute()
                .await
                .map_err(|e| RagError::FileAccess(format!("Failed to create table: {}", e)))?;
            self.vector_dimension = Some(vector_dim);
            info!("Embeddings table created with {} dimensions", vector_dim);
        }

        debug!("Storing batch of {} embeddings", records.len());
        let record_batch = Self::create_record_batch(records, vector_dim)?;

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::FileAccess(format!("Failed to write embeddings: {}", e)))?;

        self.manifest.dimension = Some(vector_dim);
        self.manifest.updated_at = Utc::now();
        self.manifest.save(&self.directory)?;

        info!("Successfully stored {} embeddings", records.len());
        Ok(records.len())
    }

    /// Create a RecordBatch from embedding records
    fn create_record_batch(records: &[EmbeddingRecord], vector_dim: usize) -> Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut contents = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut pages = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            contents.push(record.metadata.content.as_str());
            sources.push(record.metadata.source.as_str());
            pages.push(record.metadata.page);
            chunk_indices.push(record.metadata.chunk_index);
            created_ats.push(record.metadata.created_at.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
                .map_err(|e| {
                    RagError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt32Array::from(pages)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Find the `limit` chunks nearest to `query_vector` by cosine distance
    ///
    /// Results are ordered nearest first. An empty store or a zero limit
    /// yields no results.
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        debug!("Searching for similar vectors with limit: {}", limit);

        let Some(vector_dim) = self.vector_dimension else {
            debug!("Vector store is empty");
            return Ok(Vec::new());
        };

        if limit == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != vector_dim {
            return Err(RagError::ConfigurationMismatch(format!(
                "Query embedding has {} dimensions but the vector store holds {}-dimensional vectors",
                query_vector.len(),
                vector_dim
            )));
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut search_results = Self::parse_search_results_stream(results).await?;
        search_results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        search_results.truncate(limit);

        Ok(search_results)
    }

    /// Parse search results from LanceDB stream into SearchResult structs
    async fn parse_search_results_stream(
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchResult>> {
        let mut search_results = Vec::new();

        while let Some(batch_result) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(Self::parse_search_batch(&batch_result)?);
        }

        debug!("Parsed {} search results from stream", search_results.len());
        Ok(search_results)
    }

    /// Parse a single record batch from search results
    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        let contents = string_column(batch, "content")?;
        let sources = string_column(batch, "source")?;
        let pages = u32_column(batch, "page")?;
        let chunk_indices = u32_column(batch, "chunk_index")?;
        let created_ats = string_column(batch, "created_at")?;

        let distances = batch
            .column_by_name("_distance")
            .map(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut search_results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let chunk_metadata = ChunkMetadata {
                content: contents.value(row).to_string(),
                source: sources.value(row).to_string(),
                page: pages.value(row),
                chunk_index: chunk_indices.value(row),
                created_at: created_ats.value(row).to_string(),
            };

            let distance = distances
                .flatten()
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            search_results.push(SearchResult {
                chunk_metadata,
                similarity_score: 1.0 - distance,
                distance,
            });
        }

        Ok(search_results)
    }

    /// Get the total number of embeddings stored
    #[inline]
    pub async fn count_embeddings(&self) -> Result<u64> {
        if self.vector_dimension.is_none() {
            return Ok(0);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Drop the embeddings table if it exists
    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping existing embeddings table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::FileAccess(format!("Failed to drop table: {}", e)))?;
        }

        Ok(())
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}
