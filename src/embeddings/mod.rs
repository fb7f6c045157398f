// Embeddings module
// Ollama integration, page chunking, and the model-service seams the pipelines depend on

pub mod chunking;
pub mod ollama;

use anyhow::anyhow;

use crate::{RagError, Result};

pub use chunking::{Chunk, ChunkingConfig, TextSplitter, chunk_documents};
pub use ollama::OllamaClient;

/// Turns text into fixed-length vectors
pub trait Embedder: Send + Sync {
    /// Identifier of the embedding model, recorded alongside persisted vectors
    fn embedding_model(&self) -> &str;

    /// Embed a list of texts, one vector per input, order preserved
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query
    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()])?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Other(anyhow!("Embedding service returned no vector")))
    }
}

/// Produces text from a prompt
pub trait Generator: Send + Sync {
    fn generation_model(&self) -> &str;

    fn generate(&self, prompt: &str) -> Result<String>;

    /// Stream tokens to `on_token` while generating; the complete answer is returned
    #[inline]
    fn generate_streaming(&self, prompt: &str, on_token: &mut dyn FnMut(&str)) -> Result<String> {
        let answer = self.generate(prompt)?;
        on_token(&answer);
        Ok(answer)
    }
}
