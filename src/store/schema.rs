//! SQLite schema definition

/// SQL schema for the curator database
pub const SCHEMA_SQL: &str = r#"
-- Projects: top-level research projects
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Guide questions: the flattened discussion guide, one row per question
CREATE TABLE IF NOT EXISTS guide_questions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    section TEXT,
    prompt TEXT NOT NULL,
    position INTEGER NOT NULL
);

-- Documents: transcripts and other source material
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    name TEXT NOT NULL,
    content TEXT,
    storage_path TEXT,
    last_modified TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Chunks: sentence-bounded slices of normalized document text
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    doc_id TEXT NOT NULL REFERENCES documents(id),
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    start_offset INTEGER NOT NULL,
    end_offset INTEGER NOT NULL,
    token_count INTEGER NOT NULL,
    version_hash TEXT NOT NULL,
    speaker TEXT,
    participant_id TEXT,
    keywords_json TEXT,
    language TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(doc_id, chunk_index)
);

-- Embeddings: one vector per chunk per model, f32 little-endian blob
CREATE TABLE IF NOT EXISTS embeddings (
    id TEXT PRIMARY KEY,
    chunk_id TEXT NOT NULL UNIQUE REFERENCES chunks(id),
    model_id TEXT NOT NULL,
    vector BLOB NOT NULL,
    dimension INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Ingest jobs: one per (project, document), claimed atomically by workers
CREATE TABLE IF NOT EXISTS ingest_jobs (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    document_id TEXT NOT NULL REFERENCES documents(id),
    status TEXT NOT NULL DEFAULT 'queued',
    retry_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    phase TEXT NOT NULL DEFAULT 'chunking',
    chunks_created INTEGER NOT NULL DEFAULT 0,
    chunks_total INTEGER NOT NULL DEFAULT 0,
    embeddings_created INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    started_at TEXT,
    updated_at TEXT NOT NULL,
    UNIQUE(project_id, document_id)
);

-- Analysis jobs: one per project, batches count documents
CREATE TABLE IF NOT EXISTS analysis_jobs (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL UNIQUE REFERENCES projects(id),
    status TEXT NOT NULL DEFAULT 'queued',
    batches_total INTEGER NOT NULL DEFAULT 0,
    batches_completed INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    updated_at TEXT NOT NULL
);

-- Analysis results: per (question, document) extraction, upserted
CREATE TABLE IF NOT EXISTS analysis_results (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id),
    question_id TEXT NOT NULL REFERENCES guide_questions(id),
    document_id TEXT NOT NULL REFERENCES documents(id),
    quote TEXT NOT NULL,
    summary TEXT NOT NULL,
    theme TEXT NOT NULL,
    confidence REAL NOT NULL,
    degraded INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_id, question_id, document_id)
);

-- Project ingest metadata: aggregate the UI polls, recomputed by full scan
CREATE TABLE IF NOT EXISTS project_ingest_metadata (
    project_id TEXT PRIMARY KEY REFERENCES projects(id),
    jobs_total INTEGER NOT NULL DEFAULT 0,
    jobs_completed INTEGER NOT NULL DEFAULT 0,
    jobs_failed INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'queued',
    estimated_completion TEXT,
    updated_at TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_guide_questions_project ON guide_questions(project_id, position);
CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id);
CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(doc_id);
CREATE INDEX IF NOT EXISTS idx_chunks_project ON chunks(project_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_chunk ON embeddings(chunk_id);
CREATE INDEX IF NOT EXISTS idx_ingest_jobs_claim ON ingest_jobs(status, created_at);
CREATE INDEX IF NOT EXISTS idx_ingest_jobs_project ON ingest_jobs(project_id);
CREATE INDEX IF NOT EXISTS idx_analysis_jobs_claim ON analysis_jobs(status, created_at);
CREATE INDEX IF NOT EXISTS idx_analysis_results_project ON analysis_results(project_id);
"#;
