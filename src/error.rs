//! Custom error types for curator

use thiserror::Error;

/// Main error type for curator operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Embedding error (status {status}): {body}")]
    Embedding { status: u16, body: String },

    #[error("Embedding error: {0}")]
    EmbeddingOther(String),

    #[error("Chat completion error: {0}")]
    Chat(String),

    #[error("Blob store error: {0}")]
    Blob(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Document has no content: {0}")]
    EmptyDocument(String),

    #[error("Not initialized: run 'curator init' first")]
    NotInitialized,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl Error {
    /// Whether re-running the same job could plausibly succeed.
    ///
    /// Remote/transport failures are worth an operator re-enqueue; data
    /// errors will fail again identically until upstream data changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Embedding { .. }
                | Error::EmbeddingOther(_)
                | Error::Chat(_)
                | Error::Blob(_)
                | Error::Http(_)
                | Error::Database(_)
        )
    }
}

/// Result type alias for curator
pub type Result<T> = std::result::Result<T, Error>;
