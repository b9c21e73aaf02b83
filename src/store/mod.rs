//! Record storage using SQLite
//!
//! This module handles all persistent state:
//! - Projects, guide questions, and documents
//! - Chunks and their embeddings
//! - Ingest and analysis job rows with atomic claim semantics
//! - The per-project ingest aggregate the UI polls
//!
//! Job claiming relies on SQLite's `UPDATE ... RETURNING` so that N
//! concurrent workers racing for one queued job produce exactly one winner.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Job status state machine: queued -> running -> completed | failed.
/// Terminal states exit only through an operator requeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(Error::Other(format!("Unknown job status: {}", s))),
        }
    }
}

/// Ingest job phase, advisory progress for the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestPhase {
    Chunking,
    Embedding,
    Persisting,
}

impl std::fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestPhase::Chunking => write!(f, "chunking"),
            IngestPhase::Embedding => write!(f, "embedding"),
            IngestPhase::Persisting => write!(f, "persisting"),
        }
    }
}

impl FromStr for IngestPhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "chunking" => Ok(IngestPhase::Chunking),
            "embedding" => Ok(IngestPhase::Embedding),
            "persisting" => Ok(IngestPhase::Persisting),
            _ => Err(Error::Other(format!("Unknown ingest phase: {}", s))),
        }
    }
}

/// A research project
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

impl Project {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// One flattened guide question
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GuideQuestion {
    pub id: String,
    pub project_id: String,
    pub section: Option<String>,
    pub prompt: String,
    pub position: i64,
}

impl GuideQuestion {
    pub fn new(project_id: String, section: Option<String>, prompt: String, position: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id,
            section,
            prompt,
            position,
        }
    }
}

/// A source document (transcript)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub content: Option<String>,
    pub storage_path: Option<String>,
    pub last_modified: String,
    pub created_at: String,
}

impl Document {
    pub fn new(project_id: String, name: String, content: Option<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id,
            name,
            content,
            storage_path: None,
            last_modified: now.clone(),
            created_at: now,
        }
    }

    /// Revision marker tying chunks to the document version they were cut
    /// from. Changes whenever the document is modified.
    pub fn version_hash(&self) -> String {
        version_hash(&self.id, &self.last_modified)
    }
}

/// Compute the revision hash for a document version
pub fn version_hash(doc_id: &str, last_modified: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(doc_id.as_bytes());
    hasher.update(b":");
    hasher.update(last_modified.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// A stored chunk row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub project_id: String,
    pub doc_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub token_count: i64,
    pub version_hash: String,
    pub speaker: Option<String>,
    pub participant_id: Option<String>,
    pub keywords_json: Option<String>,
    pub language: String,
    pub created_at: String,
}

impl ChunkRecord {
    pub fn keywords(&self) -> Vec<String> {
        self.keywords_json
            .as_ref()
            .and_then(|j| serde_json::from_str(j).ok())
            .unwrap_or_default()
    }
}

/// A stored embedding row
#[derive(Debug, Clone, FromRow)]
pub struct EmbeddingRecord {
    pub id: String,
    pub chunk_id: String,
    pub model_id: String,
    pub vector: Vec<u8>,
    pub dimension: i64,
    pub created_at: String,
}

/// Encode an embedding vector as little-endian f32 bytes
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into an embedding vector
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::Other(format!(
            "Embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// An ingest job row, one per (project, document)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: String,
    pub project_id: String,
    pub document_id: String,
    pub status: String,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub phase: String,
    pub chunks_created: i64,
    pub chunks_total: i64,
    pub embeddings_created: i64,
    pub created_at: String,
    pub started_at: Option<String>,
    pub updated_at: String,
}

impl IngestJob {
    pub fn get_status(&self) -> Result<JobStatus> {
        self.status.parse()
    }
}

/// An analysis job row, one per project
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: String,
    pub project_id: String,
    pub status: String,
    pub batches_total: i64,
    pub batches_completed: i64,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub updated_at: String,
}

impl AnalysisJob {
    pub fn get_status(&self) -> Result<JobStatus> {
        self.status.parse()
    }

    /// Progress percentage for status output. With no batches counted yet,
    /// a running job reports a fixed placeholder instead of dividing by
    /// zero.
    pub fn progress_percent(&self) -> i64 {
        if self.batches_total > 0 {
            self.batches_completed * 100 / self.batches_total
        } else {
            match self.status.as_str() {
                "running" => 10,
                "completed" => 100,
                _ => 0,
            }
        }
    }
}

/// One extraction result per (question, document)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub project_id: String,
    pub question_id: String,
    pub document_id: String,
    pub quote: String,
    pub summary: String,
    pub theme: String,
    pub confidence: f64,
    pub degraded: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// The per-project ingest aggregate the UI polls
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProjectIngestMetadata {
    pub project_id: String,
    pub jobs_total: i64,
    pub jobs_completed: i64,
    pub jobs_failed: i64,
    pub status: String,
    pub estimated_completion: Option<String>,
    pub updated_at: String,
}

/// Database handle
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the curator database
    pub async fn connect(config: &Config) -> Result<Self> {
        let db_path = &config.paths.db_file;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if the database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='projects'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Project Operations =====

    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query("INSERT INTO projects (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&project.id)
            .bind(&project.name)
            .bind(&project.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    pub async fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(project)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let projects =
            sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(projects)
    }

    // ===== Guide Question Operations =====

    pub async fn insert_guide_question(&self, question: &GuideQuestion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO guide_questions (id, project_id, section, prompt, position)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&question.id)
        .bind(&question.project_id)
        .bind(&question.section)
        .bind(&question.prompt)
        .bind(question.position)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List guide questions in guide order
    pub async fn list_guide_questions(&self, project_id: &str) -> Result<Vec<GuideQuestion>> {
        let questions = sqlx::query_as::<_, GuideQuestion>(
            "SELECT * FROM guide_questions WHERE project_id = ? ORDER BY position",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    pub async fn delete_guide_questions(&self, project_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM guide_questions WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Document Operations =====

    pub async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, project_id, name, content, storage_path, last_modified, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.project_id)
        .bind(&doc.name)
        .bind(&doc.content)
        .bind(&doc.storage_path)
        .bind(&doc.last_modified)
        .bind(&doc.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    pub async fn list_documents(&self, project_id: &str) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE project_id = ? ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    pub async fn touch_document(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE documents SET last_modified = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Chunk Operations =====

    pub async fn insert_chunk(&self, chunk: &ChunkRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, project_id, doc_id, chunk_index, text, start_offset,
                end_offset, token_count, version_hash, speaker, participant_id,
                keywords_json, language, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.project_id)
        .bind(&chunk.doc_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(chunk.start_offset)
        .bind(chunk.end_offset)
        .bind(chunk.token_count)
        .bind(&chunk.version_hash)
        .bind(&chunk.speaker)
        .bind(&chunk.participant_id)
        .bind(&chunk.keywords_json)
        .bind(&chunk.language)
        .bind(&chunk.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List a document's chunks in index order
    pub async fn list_chunks(&self, doc_id: &str) -> Result<Vec<ChunkRecord>> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            "SELECT * FROM chunks WHERE doc_id = ? ORDER BY chunk_index",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Delete a document's chunks and their embeddings. Embeddings go first
    /// so a crash mid-delete never leaves an embedding without its chunk.
    pub async fn delete_document_chunks(&self, doc_id: &str) -> Result<u64> {
        sqlx::query(
            "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE doc_id = ?)",
        )
        .bind(doc_id)
        .execute(&self.pool)
        .await?;

        let result = sqlx::query("DELETE FROM chunks WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_chunks(&self, doc_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks WHERE doc_id = ?")
            .bind(doc_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ===== Embedding Operations =====

    pub async fn insert_embedding(&self, embedding: &EmbeddingRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO embeddings (id, chunk_id, model_id, vector, dimension, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&embedding.id)
        .bind(&embedding.chunk_id)
        .bind(&embedding.model_id)
        .bind(&embedding.vector)
        .bind(embedding.dimension)
        .bind(&embedding.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_embedding(&self, chunk_id: &str) -> Result<Option<EmbeddingRecord>> {
        let embedding =
            sqlx::query_as::<_, EmbeddingRecord>("SELECT * FROM embeddings WHERE chunk_id = ?")
                .bind(chunk_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(embedding)
    }

    pub async fn count_document_embeddings(&self, doc_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM embeddings
            WHERE chunk_id IN (SELECT id FROM chunks WHERE doc_id = ?)
            "#,
        )
        .bind(doc_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ===== Ingest Job Operations =====

    /// Create a queued ingest job for a document, or reset an existing
    /// terminal one back to queued. Jobs still queued or running are left
    /// alone. Returns true if a job was created or reset.
    pub async fn enqueue_ingest_job(&self, project_id: &str, document_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO ingest_jobs (id, project_id, document_id, status, created_at, updated_at)
            VALUES (?, ?, ?, 'queued', ?, ?)
            ON CONFLICT(project_id, document_id) DO UPDATE SET
                status = 'queued',
                error_message = NULL,
                phase = 'chunking',
                chunks_created = 0,
                chunks_total = 0,
                embeddings_created = 0,
                started_at = NULL,
                updated_at = excluded.updated_at
            WHERE ingest_jobs.status IN ('completed', 'failed')
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(project_id)
        .bind(document_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim the oldest claimable ingest job.
    ///
    /// Claimable means queued, or running with an expired lease (a worker
    /// died mid-job). The single conditional UPDATE with RETURNING is what
    /// guarantees exactly one winner among racing workers.
    pub async fn claim_next_ingest_job(&self, stale_secs: i64) -> Result<Option<IngestJob>> {
        let now = Utc::now().to_rfc3339();
        let cutoff = (Utc::now() - ChronoDuration::seconds(stale_secs)).to_rfc3339();

        let job = sqlx::query_as::<_, IngestJob>(
            r#"
            UPDATE ingest_jobs
            SET status = 'running', started_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM ingest_jobs
                WHERE status = 'queued' OR (status = 'running' AND updated_at < ?)
                ORDER BY created_at, id
                LIMIT 1
            )
            AND (status = 'queued' OR (status = 'running' AND updated_at < ?))
            RETURNING *
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(&cutoff)
        .bind(&cutoff)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ref job) = job {
            debug!(job_id = %job.id, document_id = %job.document_id, "Claimed ingest job");
        }
        Ok(job)
    }

    /// Advisory progress update; last writer wins
    pub async fn update_ingest_progress(
        &self,
        job_id: &str,
        phase: IngestPhase,
        chunks_created: i64,
        chunks_total: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET phase = ?, chunks_created = ?, chunks_total = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(phase.to_string())
        .bind(chunks_created)
        .bind(chunks_total)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a running ingest job completed, recording how many embeddings
    /// it produced. No-op if the job is not running (a stale worker
    /// finishing after its lease was re-claimed).
    pub async fn complete_ingest_job(&self, job_id: &str, embeddings_created: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'completed', error_message = NULL, embeddings_created = ?,
                updated_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(embeddings_created)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a running ingest job failed with an error message
    pub async fn fail_ingest_job(&self, job_id: &str, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'failed', error_message = ?, retry_count = retry_count + 1,
                updated_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_ingest_job(&self, job_id: &str) -> Result<Option<IngestJob>> {
        let job = sqlx::query_as::<_, IngestJob>("SELECT * FROM ingest_jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// The error message of the oldest failed ingest job, the one the UI
    /// surfaces next to the failure counts
    pub async fn first_ingest_error(&self, project_id: &str) -> Result<Option<String>> {
        let message: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT error_message FROM ingest_jobs
            WHERE project_id = ? AND status = 'failed'
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(message.flatten())
    }

    pub async fn list_ingest_jobs(&self, project_id: &str) -> Result<Vec<IngestJob>> {
        let jobs = sqlx::query_as::<_, IngestJob>(
            "SELECT * FROM ingest_jobs WHERE project_id = ? ORDER BY created_at, id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// Reset a project's failed jobs back to queued. Returns how many were
    /// requeued.
    pub async fn requeue_failed_ingest_jobs(&self, project_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ingest_jobs
            SET status = 'queued', error_message = NULL, retry_count = retry_count + 1,
                started_at = NULL, updated_at = ?
            WHERE project_id = ? AND status = 'failed'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(project_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete all of a project's ingest jobs (forced re-enqueue)
    pub async fn delete_ingest_jobs(&self, project_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM ingest_jobs WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ===== Analysis Job Operations =====

    /// Create or reset the project's analysis job. Same terminal-only reset
    /// rule as ingest jobs.
    pub async fn enqueue_analysis_job(&self, project_id: &str, batches_total: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO analysis_jobs (id, project_id, status, batches_total, created_at, updated_at)
            VALUES (?, ?, 'queued', ?, ?, ?)
            ON CONFLICT(project_id) DO UPDATE SET
                status = 'queued',
                batches_total = excluded.batches_total,
                batches_completed = 0,
                error_message = NULL,
                started_at = NULL,
                updated_at = excluded.updated_at
            WHERE analysis_jobs.status IN ('completed', 'failed')
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(project_id)
        .bind(batches_total)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically claim the oldest claimable analysis job
    pub async fn claim_next_analysis_job(&self, stale_secs: i64) -> Result<Option<AnalysisJob>> {
        let now = Utc::now().to_rfc3339();
        let cutoff = (Utc::now() - ChronoDuration::seconds(stale_secs)).to_rfc3339();

        let job = sqlx::query_as::<_, AnalysisJob>(
            r#"
            UPDATE analysis_jobs
            SET status = 'running', started_at = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM analysis_jobs
                WHERE status = 'queued' OR (status = 'running' AND updated_at < ?)
                ORDER BY created_at, id
                LIMIT 1
            )
            AND (status = 'queued' OR (status = 'running' AND updated_at < ?))
            RETURNING *
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(&cutoff)
        .bind(&cutoff)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ref job) = job {
            debug!(job_id = %job.id, project_id = %job.project_id, "Claimed analysis job");
        }
        Ok(job)
    }

    /// Persist analysis progress after each completed document batch
    pub async fn update_analysis_progress(
        &self,
        job_id: &str,
        batches_completed: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE analysis_jobs SET batches_completed = ?, updated_at = ? WHERE id = ?",
        )
        .bind(batches_completed)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn complete_analysis_job(&self, job_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE analysis_jobs
            SET status = 'completed', error_message = NULL, updated_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_analysis_job(&self, job_id: &str, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE analysis_jobs
            SET status = 'failed', error_message = ?, updated_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_analysis_job(&self, project_id: &str) -> Result<Option<AnalysisJob>> {
        let job =
            sqlx::query_as::<_, AnalysisJob>("SELECT * FROM analysis_jobs WHERE project_id = ?")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(job)
    }

    // ===== Analysis Result Operations =====

    /// Upsert one (question, document) extraction result
    pub async fn upsert_analysis_result(&self, result: &AnalysisResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_results (id, project_id, question_id, document_id, quote,
                summary, theme, confidence, degraded, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id, question_id, document_id) DO UPDATE SET
                quote = excluded.quote,
                summary = excluded.summary,
                theme = excluded.theme,
                confidence = excluded.confidence,
                degraded = excluded.degraded,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&result.id)
        .bind(&result.project_id)
        .bind(&result.question_id)
        .bind(&result.document_id)
        .bind(&result.quote)
        .bind(&result.summary)
        .bind(&result.theme)
        .bind(result.confidence)
        .bind(result.degraded)
        .bind(&result.created_at)
        .bind(&result.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_analysis_results(&self, project_id: &str) -> Result<Vec<AnalysisResult>> {
        let results = sqlx::query_as::<_, AnalysisResult>(
            "SELECT * FROM analysis_results WHERE project_id = ? ORDER BY document_id, question_id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(results)
    }

    // ===== Ingest Metadata Operations =====

    /// Seed the aggregate row at enqueue time with the completion estimate
    pub async fn seed_ingest_metadata(
        &self,
        project_id: &str,
        jobs_total: i64,
        estimated_completion: Option<String>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO project_ingest_metadata
                (project_id, jobs_total, jobs_completed, jobs_failed, status,
                 estimated_completion, updated_at)
            VALUES (?, ?, 0, 0, 'queued', ?, ?)
            ON CONFLICT(project_id) DO UPDATE SET
                jobs_total = excluded.jobs_total,
                jobs_completed = 0,
                jobs_failed = 0,
                status = 'queued',
                estimated_completion = excluded.estimated_completion,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(project_id)
        .bind(jobs_total)
        .bind(estimated_completion)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recompute the project aggregate by scanning all sibling jobs.
    ///
    /// Always a full scan, never incremental: concurrent workers finishing
    /// out of order would otherwise drift the counters. The aggregate is
    /// completed only when every sibling completed.
    pub async fn recompute_ingest_metadata(&self, project_id: &str) -> Result<()> {
        let (total, completed, failed, running): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(status = 'completed'), 0),
                   COALESCE(SUM(status = 'failed'), 0),
                   COALESCE(SUM(status = 'running'), 0)
            FROM ingest_jobs WHERE project_id = ?
            "#,
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        let status = if total == 0 {
            // Orphan metadata row: no jobs yet
            JobStatus::Queued
        } else if completed == total {
            JobStatus::Completed
        } else if completed + failed == total {
            JobStatus::Failed
        } else if running > 0 {
            JobStatus::Running
        } else {
            JobStatus::Queued
        };

        sqlx::query(
            r#"
            INSERT INTO project_ingest_metadata
                (project_id, jobs_total, jobs_completed, jobs_failed, status, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id) DO UPDATE SET
                jobs_total = excluded.jobs_total,
                jobs_completed = excluded.jobs_completed,
                jobs_failed = excluded.jobs_failed,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(project_id)
        .bind(total)
        .bind(completed)
        .bind(failed)
        .bind(status.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_ingest_metadata(
        &self,
        project_id: &str,
    ) -> Result<Option<ProjectIngestMetadata>> {
        let metadata = sqlx::query_as::<_, ProjectIngestMetadata>(
            "SELECT * FROM project_ingest_metadata WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(metadata)
    }
}
