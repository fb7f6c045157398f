use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("File access error: {0}")]
    FileAccess(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// A hint telling the user how to recover, for errors they can act on
    #[inline]
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::ServiceUnavailable(_) => Some(
                "Make sure the Ollama server is running and that the embedding and generation models are pulled (`ollama pull <model>`). Run `pdf-rag status` to check.",
            ),
            Self::FileAccess(_) => Some(
                "Check the PDF and vector store paths in `pdf-rag config --show`, and run `pdf-rag ingest` before asking questions.",
            ),
            Self::Parse(_) => Some("Make sure the input file is a valid, text-based PDF."),
            Self::ConfigurationMismatch(_) => Some(
                "The vector store was built with a different embedding model. Re-run `pdf-rag ingest --overwrite` or restore the original embedding model.",
            ),
            Self::Config(_) => Some("Run `pdf-rag config` to fix the configuration."),
            Self::Database(_) | Self::Io(_) | Self::Other(_) => None,
        }
    }
}

impl From<config::ConfigError> for RagError {
    #[inline]
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod loader;
pub mod pipeline;
pub mod ui;
