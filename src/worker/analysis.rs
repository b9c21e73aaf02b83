//! Content-analysis worker
//!
//! Structurally the same claim/process/terminalize loop as ingest, but the
//! unit of work is a whole project: for every document, every guide
//! question is answered by the chat endpoint and the extraction upserted.
//! A single question failing degrades that one result row; only errors
//! escaping the per-document loop fail the job.

use super::Pipeline;
use crate::error::Result;
use crate::llm::extract_json_object;
use crate::store::{AnalysisJob, AnalysisResult, Document, GuideQuestion};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Summary text written to result rows when extraction fails
const DEGRADED_SUMMARY: &str = "Error occurred during analysis";

const SYSTEM_PROMPT: &str = "You are a qualitative research analyst. You are given one \
interview transcript and one discussion-guide question. Answer with a single JSON object \
with keys \"quote\" (verbatim supporting quote from the transcript), \"summary\" (1-2 \
sentence answer), \"theme\" (short thematic label), and \"confidence\" (0.0-1.0). If the \
transcript does not address the question, use an empty quote and low confidence.";

/// What a single analysis worker invocation produced
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub job_id: String,
    pub project_id: String,
    pub documents_processed: usize,
    pub results_written: usize,
    pub degraded_results: usize,
}

/// The JSON shape requested from the model
#[derive(Debug, Deserialize)]
struct Extraction {
    #[serde(default)]
    quote: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    theme: String,
    #[serde(default)]
    confidence: f64,
}

/// Claim and process at most one analysis job. `Ok(None)` means idle.
pub async fn run_analysis_worker(pipeline: &Pipeline) -> Result<Option<AnalysisOutcome>> {
    let Some(job) = pipeline
        .store
        .claim_next_analysis_job(pipeline.config.queue.running_stale_secs)
        .await?
    else {
        return Ok(None);
    };

    match process_analysis_job(pipeline, &job).await {
        Ok(outcome) => {
            pipeline.store.complete_analysis_job(&job.id).await?;
            info!(
                job_id = %job.id,
                documents = outcome.documents_processed,
                results = outcome.results_written,
                degraded = outcome.degraded_results,
                "Analysis job completed"
            );
            Ok(Some(outcome))
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "Analysis job failed");
            pipeline
                .store
                .fail_analysis_job(&job.id, &e.to_string())
                .await?;
            Err(e)
        }
    }
}

async fn process_analysis_job(
    pipeline: &Pipeline,
    job: &AnalysisJob,
) -> Result<AnalysisOutcome> {
    let store = &pipeline.store;

    // A failure loading the guide fails the whole job; without questions
    // there is nothing meaningful to degrade per-question
    let questions = store.list_guide_questions(&job.project_id).await?;
    let documents = store.list_documents(&job.project_id).await?;

    let mut outcome = AnalysisOutcome {
        job_id: job.id.clone(),
        project_id: job.project_id.clone(),
        documents_processed: 0,
        results_written: 0,
        degraded_results: 0,
    };

    for doc in &documents {
        let window = document_window(pipeline, doc).await?;

        for question in &questions {
            let result = match analyze_question(pipeline, doc, question, &window).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        question_id = %question.id,
                        document_id = %doc.id,
                        error = %e,
                        "Extraction failed, writing degraded result"
                    );
                    outcome.degraded_results += 1;
                    degraded_result(&job.project_id, question, doc)
                }
            };
            store.upsert_analysis_result(&result).await?;
            outcome.results_written += 1;
        }

        outcome.documents_processed += 1;
        store
            .update_analysis_progress(&job.id, outcome.documents_processed as i64)
            .await?;
    }

    Ok(outcome)
}

/// The slice of document text included in extraction prompts
async fn document_window(pipeline: &Pipeline, doc: &Document) -> Result<String> {
    let text = super::load_document_text(pipeline, doc).await?;
    let max = pipeline.config.chat.max_document_chars;
    Ok(text.chars().take(max).collect())
}

async fn analyze_question(
    pipeline: &Pipeline,
    doc: &Document,
    question: &GuideQuestion,
    window: &str,
) -> Result<AnalysisResult> {
    let user_prompt = match &question.section {
        Some(section) => format!(
            "Guide section: {}\nQuestion: {}\n\nTranscript:\n{}",
            section, question.prompt, window
        ),
        None => format!("Question: {}\n\nTranscript:\n{}", question.prompt, window),
    };

    let completion = pipeline.chat.complete(SYSTEM_PROMPT, &user_prompt).await?;
    let json = extract_json_object(&completion).ok_or_else(|| {
        crate::error::Error::Chat("Completion contained no JSON object".to_string())
    })?;
    let extraction: Extraction = serde_json::from_str(json)?;

    let now = Utc::now().to_rfc3339();
    Ok(AnalysisResult {
        id: Uuid::new_v4().to_string(),
        project_id: question.project_id.clone(),
        question_id: question.id.clone(),
        document_id: doc.id.clone(),
        quote: extraction.quote,
        summary: extraction.summary,
        theme: extraction.theme,
        confidence: extraction.confidence.clamp(0.0, 1.0),
        degraded: 0,
        created_at: now.clone(),
        updated_at: now,
    })
}

fn degraded_result(
    project_id: &str,
    question: &GuideQuestion,
    doc: &Document,
) -> AnalysisResult {
    let now = Utc::now().to_rfc3339();
    AnalysisResult {
        id: Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        question_id: question.id.clone(),
        document_id: doc.id.clone(),
        quote: String::new(),
        summary: DEGRADED_SUMMARY.to_string(),
        theme: String::new(),
        confidence: 0.0,
        degraded: 1,
        created_at: now.clone(),
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobStore;
    use crate::config::Config;
    use crate::embed::Embedder;
    use crate::error::Error;
    use crate::store::{Project, Store};
    use crate::worker::Pipeline;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NoopEmbedder;

    #[async_trait]
    impl Embedder for NoopEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
        fn dimension(&self) -> usize {
            4
        }
        fn model_name(&self) -> &str {
            "noop"
        }
    }

    struct NoopBlob;

    #[async_trait]
    impl BlobStore for NoopBlob {
        async fn download(&self, path: &str) -> Result<Vec<u8>> {
            Err(Error::Blob(format!("missing blob: {}", path)))
        }
    }

    async fn setup(chat_server: &MockServer) -> (Pipeline, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");
        config.chat.url = format!("{}/v1/chat/completions", chat_server.uri());
        config.chat.requests_per_second = 1000;

        let store = Store::connect(&config).await.unwrap();
        store.init_schema().await.unwrap();

        let pipeline =
            Pipeline::with_backends(config, store, Arc::new(NoopEmbedder), Arc::new(NoopBlob))
                .unwrap();
        (pipeline, tmp)
    }

    async fn seed_project(pipeline: &Pipeline, questions: usize, docs: usize) -> Project {
        let project = Project::new("study".to_string());
        pipeline.store.insert_project(&project).await.unwrap();

        for i in 0..questions {
            pipeline
                .store
                .insert_guide_question(&GuideQuestion::new(
                    project.id.clone(),
                    None,
                    format!("Question {}?", i),
                    i as i64,
                ))
                .await
                .unwrap();
        }
        for i in 0..docs {
            let doc = Document::new(
                project.id.clone(),
                format!("doc-{}.txt", i),
                Some("Participant: it worked well.".to_string()),
            );
            pipeline.store.insert_document(&doc).await.unwrap();
        }

        pipeline
            .store
            .enqueue_analysis_job(&project.id, docs as i64)
            .await
            .unwrap();
        project
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [ { "message": { "role": "assistant", "content": content } } ]
        })
    }

    #[tokio::test]
    async fn test_analysis_writes_result_per_question_per_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                r#"{"quote": "it worked well", "summary": "positive", "theme": "usability", "confidence": 0.9}"#,
            )))
            .mount(&server)
            .await;

        let (pipeline, _tmp) = setup(&server).await;
        let project = seed_project(&pipeline, 2, 3).await;

        let outcome = run_analysis_worker(&pipeline).await.unwrap().unwrap();
        assert_eq!(outcome.documents_processed, 3);
        assert_eq!(outcome.results_written, 6);
        assert_eq!(outcome.degraded_results, 0);

        let results = pipeline.store.list_analysis_results(&project.id).await.unwrap();
        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.degraded == 0));
        assert!(results.iter().all(|r| r.theme == "usability"));

        let job = pipeline.store.get_analysis_job(&project.id).await.unwrap().unwrap();
        assert_eq!(job.status, "completed");
        assert_eq!(job.batches_completed, 3);
    }

    #[tokio::test]
    async fn test_chat_failure_degrades_result_and_continues() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model unavailable"))
            .mount(&server)
            .await;

        let (pipeline, _tmp) = setup(&server).await;
        let project = seed_project(&pipeline, 2, 1).await;

        let outcome = run_analysis_worker(&pipeline).await.unwrap().unwrap();
        assert_eq!(outcome.results_written, 2);
        assert_eq!(outcome.degraded_results, 2);

        let results = pipeline.store.list_analysis_results(&project.id).await.unwrap();
        assert!(results.iter().all(|r| r.degraded == 1));
        assert!(results.iter().all(|r| r.summary == DEGRADED_SUMMARY));

        // The job itself still completes
        let job = pipeline.store.get_analysis_job(&project.id).await.unwrap().unwrap();
        assert_eq!(job.status, "completed");
    }

    #[tokio::test]
    async fn test_fenced_json_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                "Here is the analysis:\n```json\n{\"quote\": \"q\", \"summary\": \"s\", \"theme\": \"t\", \"confidence\": 0.5}\n```",
            )))
            .mount(&server)
            .await;

        let (pipeline, _tmp) = setup(&server).await;
        let project = seed_project(&pipeline, 1, 1).await;

        let outcome = run_analysis_worker(&pipeline).await.unwrap().unwrap();
        assert_eq!(outcome.degraded_results, 0);

        let results = pipeline.store.list_analysis_results(&project.id).await.unwrap();
        assert_eq!(results[0].summary, "s");
        assert_eq!(results[0].confidence, 0.5);
    }

    #[tokio::test]
    async fn test_empty_guide_completes_with_no_results() {
        let server = MockServer::start().await;
        let (pipeline, _tmp) = setup(&server).await;
        let project = seed_project(&pipeline, 0, 2).await;

        let outcome = run_analysis_worker(&pipeline).await.unwrap().unwrap();
        assert_eq!(outcome.results_written, 0);
        assert_eq!(outcome.documents_processed, 2);

        let job = pipeline.store.get_analysis_job(&project.id).await.unwrap().unwrap();
        assert_eq!(job.status, "completed");
    }

    #[tokio::test]
    async fn test_idle_when_no_analysis_job() {
        let server = MockServer::start().await;
        let (pipeline, _tmp) = setup(&server).await;
        assert!(run_analysis_worker(&pipeline).await.unwrap().is_none());
    }
}
