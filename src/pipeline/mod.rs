// Ingestion and query pipelines
// Both are linear: load -> chunk -> embed -> store, and retrieve -> prompt -> generate


pub mod prompt;

use chrono::{Local, NaiveDate, Utc};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::{ChunkMetadata, EmbeddingRecord, VectorStore};
use crate::embeddings::{Chunk, ChunkingConfig, Embedder, Generator, chunk_documents};
use crate::loader::load_pdf;
use crate::{RagError, Result};
use prompt::{PromptLanguage, build_prompt, refusal_sentence};

/// Number of chunks embedded between progress updates
const EMBED_STEP: usize = 32;

/// A chunk returned by similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub content: String,
    pub source: String,
    pub page: u32,
    pub chunk_index: u32,
    /// Cosine distance to the query, smaller is closer
    pub distance: f32,
}

/// Generated answer and the context it was grounded on
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub context: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub source: PathBuf,
    pub pages: usize,
    pub chunks: usize,
    pub stored: usize,
}

/// Turns a PDF into stored embeddings
pub struct IngestPipeline<E> {
    embedder: Arc<E>,
    chunking: ChunkingConfig,
}

impl<E: Embedder> IngestPipeline<E> {
    #[inline]
    pub fn new(embedder: Arc<E>, chunking: ChunkingConfig) -> Self {
        Self { embedder, chunking }
    }

    /// Load, chunk and embed `pdf`, then write every record to `store`
    ///
    /// Embedding finishes before the first write, so a failing embedder
    /// leaves the store untouched.
    #[inline]
    pub async fn run(
        &self,
        pdf: &Path,
        store: &mut VectorStore,
        progress: &ProgressBar,
    ) -> Result<IngestReport> {
        let documents = load_pdf(pdf)?;
        let pages = documents.len();

        let chunks = chunk_documents(&documents, &self.chunking)?;
        info!("Split {} pages into {} chunks", pages, chunks.len());

        if chunks.is_empty() {
            return Err(RagError::Parse(format!(
                "{} contains no extractable text",
                pdf.display()
            )));
        }

        let vectors = self.embed_chunks(&chunks, progress)?;
        let records = build_records(chunks, vectors);
        let chunk_count = records.len();

        progress.set_message("writing vector store");
        let stored = store.add_records(&records).await?;

        Ok(IngestReport {
            source: pdf.to_path_buf(),
            pages,
            chunks: chunk_count,
            stored,
        })
    }

    fn embed_chunks(&self, chunks: &[Chunk], progress: &ProgressBar) -> Result<Vec<Vec<f32>>> {
        progress.set_length(chunks.len() as u64);
        progress.set_position(0);
        progress.set_message(format!("embedding with {}", self.embedder.embedding_model()));

        let mut vectors = Vec::with_capacity(chunks.len());
        for step in chunks.chunks(EMBED_STEP) {
            let texts: Vec<String> = step.iter().map(|c| c.content.clone()).collect();
            let embedded = self.embedder.embed_documents(&texts)?;

            if embedded.len() != texts.len() {
                return Err(RagError::Other(anyhow::anyhow!(
                    "Embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    texts.len()
                )));
            }

            vectors.extend(embedded);
            progress.inc(step.len() as u64);
        }

        debug!("Embedded {} chunks", vectors.len());
        Ok(vectors)
    }
}

fn build_records(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Vec<EmbeddingRecord> {
    let created_at = Utc::now().to_rfc3339();

    chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddingRecord {
            id: Uuid::new_v4().to_string(),
            vector,
            metadata: ChunkMetadata {
                content: chunk.content,
                source: chunk.source,
                page: chunk.page,
                chunk_index: u32::try_from(chunk.chunk_index).unwrap_or(u32::MAX),
                created_at: created_at.clone(),
            },
        })
        .collect()
}

/// Finds the stored chunks nearest to a query
pub struct Retriever<E> {
    embedder: Arc<E>,
    store: Arc<VectorStore>,
    top_k: usize,
}

impl<E: Embedder> Retriever<E> {
    #[inline]
    pub fn new(embedder: Arc<E>, store: Arc<VectorStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k,
        }
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The `top_k` nearest chunks, nearest first
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        self.retrieve_k(query, self.top_k).await
    }

    #[inline]
    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let query_vector = self.embedder.embed_query(query)?;
        let results = self.store.search_similar(&query_vector, k).await?;

        debug!("Retrieved {} chunks for query", results.len());
        Ok(results
            .into_iter()
            .map(|result| RetrievedChunk {
                content: result.chunk_metadata.content,
                source: result.chunk_metadata.source,
                page: result.chunk_metadata.page,
                chunk_index: result.chunk_metadata.chunk_index,
                distance: result.distance,
            })
            .collect())
    }
}

/// Answers questions from retrieved context
pub struct QueryPipeline<E, G> {
    retriever: Retriever<E>,
    generator: Arc<G>,
    language: PromptLanguage,
    date: Option<NaiveDate>,
}

impl<E: Embedder, G: Generator> QueryPipeline<E, G> {
    #[inline]
    pub fn new(retriever: Retriever<E>, generator: Arc<G>, language: PromptLanguage) -> Self {
        Self {
            retriever,
            generator,
            language,
            date: None,
        }
    }

    /// Pin the date shown in the prompt instead of using today
    #[inline]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    #[inline]
    pub fn language(&self) -> PromptLanguage {
        self.language
    }

    #[inline]
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        let context = self.retriever.retrieve(query).await?;
        let Some(prompt) = self.prompt_for(&context, query) else {
            return Ok(self.refusal(context));
        };

        let text = self.generator.generate(&prompt)?;
        Ok(Answer { text, context })
    }

    /// Like [`Self::answer`], handing tokens to `on_token` as they are generated
    #[inline]
    pub async fn answer_streaming(
        &self,
        query: &str,
        on_token: &mut (dyn FnMut(&str) + Send),
    ) -> Result<Answer> {
        let context = self.retriever.retrieve(query).await?;
        let Some(prompt) = self.prompt_for(&context, query) else {
            let answer = self.refusal(context);
            on_token(&answer.text);
            return Ok(answer);
        };

        let text = self.generator.generate_streaming(&prompt, on_token)?;
        Ok(Answer { text, context })
    }

    fn prompt_for(&self, context: &[RetrievedChunk], query: &str) -> Option<String> {
        if context.is_empty() {
            warn!("No context retrieved, answering with the refusal sentence");
            return None;
        }

        let passages: Vec<&str> = context.iter().map(|c| c.content.as_str()).collect();
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        let prompt = build_prompt(&passages, query, date, self.language);

        debug!("Built prompt of {} characters", prompt.len());
        Some(prompt)
    }

    fn refusal(&self, context: Vec<RetrievedChunk>) -> Answer {
        Answer {
            text: refusal_sentence(self.language).to_string(),
            context,
        }
    }
}
