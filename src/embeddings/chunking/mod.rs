#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::loader::Document;
use crate::{RagError, Result};

/// Separators tried in priority order: paragraph, line, word, character
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Represents a chunk of page text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text
    pub content: String,
    /// Source identifier of the page this chunk came from
    pub source: String,
    /// 1-based page number
    pub page: u32,
    /// The index of this chunk within its page
    pub chunk_index: usize,
}

/// Configuration for text chunking, measured in characters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters shared between the tail of one chunk and the head of the next
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Recursive character splitter
///
/// Splits on the highest-priority separator present in the text, merges the
/// pieces back into chunks no longer than `chunk_size`, and recurses with the
/// lower-priority separators into any piece that is still too long.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(RagError::Config(
                "Chunk size must be greater than 0".to_string(),
            ));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::Config(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }

        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    #[inline]
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Split raw text into chunks
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every document, carrying its metadata onto each chunk
    #[inline]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for document in documents {
            let page_chunks = self.split_text(&document.content);
            debug!(
                "Page {} of {} split into {} chunks",
                document.page,
                document.source,
                page_chunks.len()
            );

            chunks.extend(
                page_chunks
                    .into_iter()
                    .enumerate()
                    .map(|(chunk_index, content)| Chunk {
                        content,
                        source: document.source.clone(),
                        page: document.page,
                        chunk_index,
                    }),
            );
        }

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Fall back to the last separator when none of them occur
        let mut separator = separators.last().map_or("", String::as_str);
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if remaining.is_empty() {
                final_chunks.push(piece);
            } else {
                final_chunks.extend(self.split_recursive(&piece, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// Greedily combine small pieces into chunks, keeping a tail window of at
    /// most `chunk_overlap` characters as the start of the next chunk
    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for split in splits {
            let len = char_len(split);

            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join_trimmed(&window) {
                    chunks.push(chunk);
                }

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(split);
            total += len;
        }

        if let Some(chunk) = join_trimmed(&window) {
            chunks.push(chunk);
        }

        chunks
    }
}

/// Chunk documents with the given configuration
#[inline]
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let splitter = TextSplitter::new(config)?;
    let chunks = splitter.split_documents(documents);

    debug!(
        "Chunked {} pages into {} chunks (avg {} chars)",
        documents.len(),
        chunks.len(),
        chunks.iter().map(|c| char_len(&c.content)).sum::<usize>() / chunks.len().max(1)
    );

    Ok(chunks)
}

/// Split on `separator`, attaching each separator to the start of the piece
/// that follows it. An empty separator splits into characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut parts = text.split(separator);
    let mut pieces = Vec::new();

    if let Some(first) = parts.next() {
        pieces.push(first.to_string());
    }
    pieces.extend(parts.map(|part| format!("{}{}", separator, part)));

    pieces.retain(|piece| !piece.is_empty());
    pieces
}

fn join_trimmed(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[inline]
fn char_len(text: &str) -> usize {
    text.chars().count()
}
