//! Configuration management for curator
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Embedding endpoint configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat/extraction endpoint configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Blob storage configuration
    #[serde(default)]
    pub blob: BlobConfig,

    /// Job queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target chunk size in estimated tokens
    #[serde(default = "default_chunk_target_tokens")]
    pub target_tokens: usize,

    /// Overlap between adjacent chunks in estimated tokens
    #[serde(default = "default_chunk_overlap_tokens")]
    pub overlap_tokens: usize,

    /// Language tag attached to chunks
    #[serde(default = "default_chunk_language")]
    pub language: String,
}

/// Embedding endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding endpoint URL
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Chunks per embedding request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Token budget per minute for the rate limiter
    #[serde(default = "default_embedding_tokens_per_minute")]
    pub tokens_per_minute: f64,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

/// Chat/extraction endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Chat endpoint URL
    #[serde(default = "default_chat_url")]
    pub url: String,

    /// Model name/identifier
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,

    /// Max completion tokens
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,

    /// Requests per second cap
    #[serde(default = "default_chat_requests_per_second")]
    pub requests_per_second: u32,

    /// Document window (characters) included in extraction prompts
    #[serde(default = "default_chat_max_document_chars")]
    pub max_document_chars: usize,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Base URL documents' storage paths are resolved against
    #[serde(default = "default_blob_url")]
    pub url: String,
}

/// Job queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Seconds after which a running job's lease expires and it becomes
    /// claimable again (crash recovery)
    #[serde(default = "default_running_stale_secs")]
    pub running_stale_secs: i64,

    /// Per-document processing estimate used for completion times
    #[serde(default = "default_secs_per_document")]
    pub secs_per_document: i64,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. 127.0.0.1:8790
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for curator data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            embedding: EmbeddingConfig::default(),
            chat: ChatConfig::default(),
            blob: BlobConfig::default(),
            queue: QueueConfig::default(),
            server: ServerConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_chunk_target_tokens(),
            overlap_tokens: default_chunk_overlap_tokens(),
            language: default_chunk_language(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            tokens_per_minute: default_embedding_tokens_per_minute(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: default_chat_url(),
            model: default_chat_model(),
            temperature: default_chat_temperature(),
            max_tokens: default_chat_max_tokens(),
            requests_per_second: default_chat_requests_per_second(),
            max_document_chars: default_chat_max_document_chars(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            url: default_blob_url(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            running_stale_secs: default_running_stale_secs(),
            secs_per_document: default_secs_per_document(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_server_bind(),
        }
    }
}

impl Config {
    /// Get the default base directory for curator (~/.curator)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".curator")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("curator.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("curator.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to
    /// defaults when no config file exists yet
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
            config.validate()?;
        } else {
            debug!("No config file found, using defaults");
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if curator is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk.target_tokens == 0 {
            return Err(Error::Config(
                "chunk.target_tokens must be positive".to_string(),
            ));
        }

        if self.chunk.overlap_tokens >= self.chunk.target_tokens {
            return Err(Error::Config(
                "chunk.overlap_tokens must be < chunk.target_tokens".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be positive".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }

        if self.embedding.tokens_per_minute <= 0.0 {
            return Err(Error::Config(
                "embedding.tokens_per_minute must be positive".to_string(),
            ));
        }

        if self.chat.requests_per_second == 0 {
            return Err(Error::Config(
                "chat.requests_per_second must be positive".to_string(),
            ));
        }

        if self.queue.running_stale_secs <= 0 {
            return Err(Error::Config(
                "queue.running_stale_secs must be positive".to_string(),
            ));
        }

        url::Url::parse(&self.embedding.url)
            .map_err(|e| Error::Config(format!("embedding.url is invalid: {}", e)))?;
        url::Url::parse(&self.chat.url)
            .map_err(|e| Error::Config(format!("chat.url is invalid: {}", e)))?;
        url::Url::parse(&self.blob.url)
            .map_err(|e| Error::Config(format!("blob.url is invalid: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk.target_tokens, 400);
        assert_eq!(config.chunk.overlap_tokens, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.chunk.target_tokens = 250;

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.chunk.target_tokens, 250);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Invalid: overlap >= target
        config.chunk.overlap_tokens = config.chunk.target_tokens;
        assert!(config.validate().is_err());

        config.chunk.overlap_tokens = 50;
        assert!(config.validate().is_ok());

        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_bad_endpoint_url() {
        let mut config = Config::default();
        config.embedding.url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
