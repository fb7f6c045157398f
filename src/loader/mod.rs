// PDF loading
// Turns a PDF file into one Document per page, in page order


use std::path::Path;
use tracing::{debug, info, warn};

use crate::{RagError, Result};

/// Text extracted from a single PDF page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Extracted page text
    pub content: String,
    /// Where the text came from (the PDF path)
    pub source: String,
    /// 1-based page number
    pub page: u32,
}

/// Load every page of a PDF as a [`Document`]
///
/// Pages without extractable text produce a document with empty content so
/// page numbering stays aligned with the file.
#[inline]
pub fn load_pdf<P: AsRef<Path>>(path: P) -> Result<Vec<Document>> {
    let path = path.as_ref();
    info!("Loading PDF: {}", path.display());

    if !path.is_file() {
        return Err(RagError::FileAccess(format!(
            "PDF not found or not a file: {}",
            path.display()
        )));
    }

    let bytes = std::fs::read(path).map_err(|e| {
        RagError::FileAccess(format!("Failed to read {}: {}", path.display(), e))
    })?;

    load_pdf_bytes(&bytes, &path.display().to_string())
}

/// Parse an in-memory PDF, tagging each page with `source`
#[inline]
pub fn load_pdf_bytes(bytes: &[u8], source: &str) -> Result<Vec<Document>> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| RagError::Parse(format!("{} is not a readable PDF: {}", source, e)))?;

    if document.is_encrypted() {
        return Err(RagError::Parse(format!(
            "{} is encrypted and cannot be read",
            source
        )));
    }

    let pages = document.get_pages();
    let mut documents = Vec::with_capacity(pages.len());

    for &page in pages.keys() {
        let content = match document.extract_text(&[page]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to extract text from {} page {}: {}", source, page, e);
                return Err(RagError::Parse(format!(
                    "Failed to extract text from {} page {}: {}",
                    source, page, e
                )));
            }
        };

        debug!("Extracted {} characters from page {}", content.len(), page);
        documents.push(Document {
            content,
            source: source.to_string(),
            page,
        });
    }

    info!("Loaded {} pages from {}", documents.len(), source);
    Ok(documents)
}
