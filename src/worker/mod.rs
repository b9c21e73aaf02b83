//! Stateless worker invocations
//!
//! A worker invocation claims at most one job, processes it to a terminal
//! state, and returns. All coordination happens through the store's atomic
//! claim; workers share no state and any number may run concurrently.
//! Every side effect is re-derivable (delete-then-recreate), so a job
//! abandoned mid-flight is safe to re-claim after its lease expires.

pub mod analysis;

pub use analysis::{run_analysis_worker, AnalysisOutcome};

use crate::blob::{BlobStore, HttpBlobStore};
use crate::chunk::{self, TextChunk};
use crate::config::Config;
use crate::embed::{create_embedder, Embedder, EmbeddingBatcher};
use crate::error::{Error, Result};
use crate::llm::ChatClient;
use crate::store::{
    encode_vector, ChunkRecord, Document, EmbeddingRecord, IngestJob, IngestPhase, Store,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Everything a worker invocation needs, built once and injected
pub struct Pipeline {
    pub config: Config,
    pub store: Store,
    pub batcher: EmbeddingBatcher,
    pub chat: ChatClient,
    pub blob: Arc<dyn BlobStore>,
}

impl Pipeline {
    /// Build a pipeline with HTTP backends from configuration
    pub fn from_config(config: Config, store: Store) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Self::with_backends(
            config.clone(),
            store,
            embedder,
            Arc::new(HttpBlobStore::new(&config.blob.url)?),
        )
    }

    /// Build a pipeline with explicit backends (tests substitute stubs here)
    pub fn with_backends(
        config: Config,
        store: Store,
        embedder: Arc<dyn Embedder>,
        blob: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let batcher = EmbeddingBatcher::new(embedder, &config.embedding);
        let chat = ChatClient::new(&config.chat)?;
        Ok(Self {
            config,
            store,
            batcher,
            chat,
            blob,
        })
    }
}

/// What a single ingest worker invocation produced
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub job_id: String,
    pub document_id: String,
    pub chunks_created: usize,
    pub embeddings_created: usize,
}

/// Claim and process at most one ingest job.
///
/// Returns `Ok(None)` when no job is claimable (idle, not an error). Any
/// processing failure is recorded on the job row and the project aggregate
/// before the error propagates.
pub async fn run_ingest_worker(pipeline: &Pipeline) -> Result<Option<IngestOutcome>> {
    let Some(job) = pipeline
        .store
        .claim_next_ingest_job(pipeline.config.queue.running_stale_secs)
        .await?
    else {
        return Ok(None);
    };

    match process_ingest_job(pipeline, &job).await {
        Ok(outcome) => {
            pipeline
                .store
                .complete_ingest_job(&job.id, outcome.embeddings_created as i64)
                .await?;
            pipeline
                .store
                .recompute_ingest_metadata(&job.project_id)
                .await?;
            info!(
                job_id = %job.id,
                chunks = outcome.chunks_created,
                embeddings = outcome.embeddings_created,
                "Ingest job completed"
            );
            Ok(Some(outcome))
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "Ingest job failed");
            pipeline
                .store
                .fail_ingest_job(&job.id, &e.to_string())
                .await?;
            pipeline
                .store
                .recompute_ingest_metadata(&job.project_id)
                .await?;
            Err(e)
        }
    }
}

/// Keep claiming and processing until the queue is drained.
///
/// Failed jobs stay failed (no in-worker retry); the drain moves on to the
/// next claimable job and reports how many of each it saw.
pub async fn drain_ingest_queue(pipeline: &Pipeline) -> Result<(usize, usize)> {
    let mut processed = 0;
    let mut failed = 0;
    loop {
        match run_ingest_worker(pipeline).await {
            Ok(Some(_)) => processed += 1,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Job failed during drain, continuing");
                failed += 1;
            }
        }
    }
    Ok((processed, failed))
}

async fn process_ingest_job(pipeline: &Pipeline, job: &IngestJob) -> Result<IngestOutcome> {
    let store = &pipeline.store;
    let doc = store
        .get_document(&job.document_id)
        .await?
        .ok_or_else(|| Error::DocumentNotFound(job.document_id.clone()))?;

    let text = load_document_text(pipeline, &doc).await?;
    let version_hash = doc.version_hash();

    // Idempotency by deletion: any chunks from a previous run of this
    // document (same or older version) go away before we re-create them
    store.delete_document_chunks(&doc.id).await?;

    let chunks = chunk::chunk(&text, &pipeline.config.chunk);
    let total = chunks.len() as i64;
    store
        .update_ingest_progress(&job.id, IngestPhase::Chunking, 0, total)
        .await?;

    if chunks.is_empty() {
        // An empty document ingests successfully with nothing to embed
        return Ok(IngestOutcome {
            job_id: job.id.clone(),
            document_id: doc.id.clone(),
            chunks_created: 0,
            embeddings_created: 0,
        });
    }

    // Embed in batches, reporting progress per batch
    let batch_size = pipeline.config.embedding.batch_size.max(1);
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let batch_vectors = pipeline.batcher.embed_all(texts).await?;
        vectors.extend(batch_vectors);
        store
            .update_ingest_progress(
                &job.id,
                IngestPhase::Embedding,
                vectors.len() as i64,
                total,
            )
            .await?;
    }

    // Persist chunks strictly before embeddings: an embedding must never
    // reference a chunk row that does not exist yet
    store
        .update_ingest_progress(&job.id, IngestPhase::Persisting, total, total)
        .await?;

    let records = build_chunk_records(&pipeline.config, &doc, &chunks, &version_hash);
    for record in &records {
        store.insert_chunk(record).await?;
    }

    let now = Utc::now().to_rfc3339();
    for (record, vector) in records.iter().zip(vectors.iter()) {
        store
            .insert_embedding(&EmbeddingRecord {
                id: Uuid::new_v4().to_string(),
                chunk_id: record.id.clone(),
                model_id: pipeline.batcher.model_name().to_string(),
                vector: encode_vector(vector),
                dimension: vector.len() as i64,
                created_at: now.clone(),
            })
            .await?;
    }

    Ok(IngestOutcome {
        job_id: job.id.clone(),
        document_id: doc.id.clone(),
        chunks_created: records.len(),
        embeddings_created: vectors.len(),
    })
}

async fn load_document_text(pipeline: &Pipeline, doc: &Document) -> Result<String> {
    if let Some(content) = &doc.content {
        return Ok(content.clone());
    }
    if let Some(path) = &doc.storage_path {
        let bytes = pipeline.blob.download(path).await?;
        return String::from_utf8(bytes)
            .map_err(|e| Error::Blob(format!("Blob '{}' is not valid UTF-8: {}", path, e)));
    }
    // Neither inline content nor a storage path: nothing to ingest
    Ok(String::new())
}

fn build_chunk_records(
    config: &Config,
    doc: &Document,
    chunks: &[TextChunk],
    version_hash: &str,
) -> Vec<ChunkRecord> {
    let now = Utc::now().to_rfc3339();
    chunks
        .iter()
        .map(|c| ChunkRecord {
            id: Uuid::new_v4().to_string(),
            project_id: doc.project_id.clone(),
            doc_id: doc.id.clone(),
            chunk_index: c.index as i64,
            text: c.text.clone(),
            start_offset: c.start_offset as i64,
            end_offset: c.end_offset as i64,
            token_count: c.token_count as i64,
            version_hash: version_hash.to_string(),
            speaker: c.speaker.clone(),
            participant_id: None,
            keywords_json: serde_json::to_string(&c.keywords).ok(),
            language: config.chunk.language.clone(),
            created_at: now.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Project;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StubEmbedder {
        dimension: usize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            if self.fail {
                return Err(Error::EmbeddingOther("stub failure".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32; self.dimension])
                .collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    struct StubBlob {
        content: Option<String>,
    }

    #[async_trait]
    impl BlobStore for StubBlob {
        async fn download(&self, path: &str) -> Result<Vec<u8>> {
            self.content
                .as_ref()
                .map(|c| c.clone().into_bytes())
                .ok_or_else(|| Error::Blob(format!("missing blob: {}", path)))
        }
    }

    async fn setup_pipeline(fail_embed: bool, blob: StubBlob) -> (Pipeline, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");
        config.chunk.target_tokens = 5;
        config.chunk.overlap_tokens = 2;

        let store = Store::connect(&config).await.unwrap();
        store.init_schema().await.unwrap();

        let pipeline = Pipeline::with_backends(
            config,
            store,
            Arc::new(StubEmbedder {
                dimension: 4,
                fail: fail_embed,
            }),
            Arc::new(blob),
        )
        .unwrap();
        (pipeline, tmp)
    }

    async fn insert_doc(pipeline: &Pipeline, content: Option<&str>) -> (Project, Document) {
        let project = Project::new("study".to_string());
        pipeline.store.insert_project(&project).await.unwrap();
        let doc = Document::new(
            project.id.clone(),
            "doc.txt".to_string(),
            content.map(|c| c.to_string()),
        );
        pipeline.store.insert_document(&doc).await.unwrap();
        pipeline
            .store
            .enqueue_ingest_job(&project.id, &doc.id)
            .await
            .unwrap();
        (project, doc)
    }

    #[tokio::test]
    async fn test_idle_when_queue_empty() {
        let (pipeline, _tmp) = setup_pipeline(false, StubBlob { content: None }).await;
        let outcome = run_ingest_worker(&pipeline).await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_successful_ingest_persists_chunks_and_embeddings() {
        let (pipeline, _tmp) =
            setup_pipeline(false, StubBlob { content: None }).await;
        let (project, doc) =
            insert_doc(&pipeline, Some("Hello world. This is a test. Short.")).await;

        let outcome = run_ingest_worker(&pipeline).await.unwrap().unwrap();
        assert!(outcome.chunks_created >= 2);
        assert_eq!(outcome.chunks_created, outcome.embeddings_created);

        let chunks = pipeline.store.list_chunks(&doc.id).await.unwrap();
        assert_eq!(chunks.len(), outcome.chunks_created);
        // Indexes contiguous from zero
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.version_hash, doc.version_hash());
        }

        // The completed row records the embedding count durably
        let jobs = pipeline.store.list_ingest_jobs(&project.id).await.unwrap();
        assert_eq!(jobs[0].status, "completed");
        assert_eq!(jobs[0].embeddings_created as usize, outcome.embeddings_created);

        let meta = pipeline
            .store
            .get_ingest_metadata(&project.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.status, "completed");
        assert_eq!(meta.jobs_completed, 1);
    }

    #[tokio::test]
    async fn test_reingest_is_idempotent() {
        let (pipeline, _tmp) = setup_pipeline(false, StubBlob { content: None }).await;
        let (project, doc) =
            insert_doc(&pipeline, Some("Hello world. This is a test. Short.")).await;

        let first = run_ingest_worker(&pipeline).await.unwrap().unwrap();

        pipeline
            .store
            .enqueue_ingest_job(&project.id, &doc.id)
            .await
            .unwrap();
        let second = run_ingest_worker(&pipeline).await.unwrap().unwrap();

        assert_eq!(first.chunks_created, second.chunks_created);
        let chunks = pipeline.store.list_chunks(&doc.id).await.unwrap();
        assert_eq!(chunks.len(), second.chunks_created);
        assert_eq!(
            pipeline.store.count_document_embeddings(&doc.id).await.unwrap(),
            second.embeddings_created as i64
        );
    }

    #[tokio::test]
    async fn test_empty_document_completes_with_zero_chunks() {
        let (pipeline, _tmp) = setup_pipeline(false, StubBlob { content: None }).await;
        let (project, doc) = insert_doc(&pipeline, Some("   ")).await;

        let outcome = run_ingest_worker(&pipeline).await.unwrap().unwrap();
        assert_eq!(outcome.chunks_created, 0);
        assert_eq!(pipeline.store.count_chunks(&doc.id).await.unwrap(), 0);

        let meta = pipeline
            .store
            .get_ingest_metadata(&project.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.status, "completed");
    }

    #[tokio::test]
    async fn test_embed_failure_marks_job_failed() {
        let (pipeline, _tmp) = setup_pipeline(true, StubBlob { content: None }).await;
        let (project, doc) = insert_doc(&pipeline, Some("Hello world. More text here.")).await;

        let err = run_ingest_worker(&pipeline).await.unwrap_err();
        assert!(err.to_string().contains("stub failure"));

        let jobs = pipeline.store.list_ingest_jobs(&project.id).await.unwrap();
        assert_eq!(jobs[0].status, "failed");
        assert!(jobs[0].error_message.as_deref().unwrap().contains("stub failure"));

        // Chunks were deleted before the failed embed and never re-created
        assert_eq!(pipeline.store.count_chunks(&doc.id).await.unwrap(), 0);

        let meta = pipeline
            .store
            .get_ingest_metadata(&project.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.jobs_failed, 1);
        assert_eq!(meta.status, "failed");
    }

    #[tokio::test]
    async fn test_blob_backed_document() {
        let (pipeline, _tmp) = setup_pipeline(
            false,
            StubBlob {
                content: Some("From the blob store. Second sentence.".to_string()),
            },
        )
        .await;

        let project = Project::new("study".to_string());
        pipeline.store.insert_project(&project).await.unwrap();
        let mut doc = Document::new(project.id.clone(), "remote.txt".to_string(), None);
        doc.storage_path = Some("docs/remote.txt".to_string());
        pipeline.store.insert_document(&doc).await.unwrap();
        pipeline
            .store
            .enqueue_ingest_job(&project.id, &doc.id)
            .await
            .unwrap();

        let outcome = run_ingest_worker(&pipeline).await.unwrap().unwrap();
        assert!(outcome.chunks_created >= 1);
    }

    #[tokio::test]
    async fn test_drain_processes_everything() {
        let (pipeline, _tmp) = setup_pipeline(false, StubBlob { content: None }).await;
        let project = Project::new("study".to_string());
        pipeline.store.insert_project(&project).await.unwrap();

        for i in 0..3 {
            let doc = Document::new(
                project.id.clone(),
                format!("doc-{}.txt", i),
                Some("Some sentence here. Another one.".to_string()),
            );
            pipeline.store.insert_document(&doc).await.unwrap();
            pipeline
                .store
                .enqueue_ingest_job(&project.id, &doc.id)
                .await
                .unwrap();
        }

        let (processed, failed) = drain_ingest_queue(&pipeline).await.unwrap();
        assert_eq!(processed, 3);
        assert_eq!(failed, 0);

        let meta = pipeline
            .store
            .get_ingest_metadata(&project.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.status, "completed");
        assert_eq!(meta.jobs_completed, 3);
    }
}
