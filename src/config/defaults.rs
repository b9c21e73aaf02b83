//! Default values for configuration

/// Default target chunk size in estimated tokens
pub fn default_chunk_target_tokens() -> usize {
    400
}

/// Default overlap between adjacent chunks in estimated tokens
pub fn default_chunk_overlap_tokens() -> usize {
    50
}

/// Default chunk language tag
pub fn default_chunk_language() -> String {
    "en".to_string()
}

/// Default embedding endpoint URL
pub fn default_embedding_url() -> String {
    std::env::var("CURATOR_EMBEDDING_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997/v1/embeddings".to_string())
}

/// Default embedding model identifier
pub fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Default embedding dimension (must match model)
pub fn default_embedding_dimension() -> usize {
    1536
}

/// Default number of chunks per embedding request
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default embedding token budget per minute (token bucket refill)
pub fn default_embedding_tokens_per_minute() -> f64 {
    100_000.0
}

/// Default request timeout in seconds for remote endpoints
pub fn default_request_timeout_secs() -> u64 {
    60
}

/// Default chat endpoint URL
pub fn default_chat_url() -> String {
    std::env::var("CURATOR_CHAT_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8000/v1/chat/completions".to_string())
}

/// Default chat model identifier
pub fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Default sampling temperature for extraction calls
pub fn default_chat_temperature() -> f32 {
    0.2
}

/// Default max completion tokens for extraction calls
pub fn default_chat_max_tokens() -> u32 {
    800
}

/// Default chat requests per second cap
pub fn default_chat_requests_per_second() -> u32 {
    2
}

/// Default document window (characters) embedded in extraction prompts
pub fn default_chat_max_document_chars() -> usize {
    12_000
}

/// Default blob store base URL for documents referenced by storage path
pub fn default_blob_url() -> String {
    std::env::var("CURATOR_BLOB_URL").unwrap_or_else(|_| "http://127.0.0.1:9000/".to_string())
}

/// Default lease after which a running job becomes claimable again
pub fn default_running_stale_secs() -> i64 {
    300
}

/// Default per-document processing estimate used for UI completion times
pub fn default_secs_per_document() -> i64 {
    20
}

/// Default server bind address
pub fn default_server_bind() -> String {
    "127.0.0.1:8790".to_string()
}
