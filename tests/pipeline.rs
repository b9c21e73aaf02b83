//! End-to-end pipeline tests against mock HTTP backends.
//!
//! These exercise the public surface the way a deployment would: real
//! SQLite store, real HTTP embedder and chat client pointed at wiremock,
//! enqueue followed by worker drains.

use curator::config::Config;
use curator::queue;
use curator::store::{Document, GuideQuestion, Project, Store};
use curator::worker::{self, Pipeline};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Responds with one embedding per input, whatever the batch size
struct EchoEmbeddings {
    dimension: usize,
}

impl Respond for EchoEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = match serde_json::from_slice(&request.body) {
            Ok(v) => v,
            Err(_) => return ResponseTemplate::new(400),
        };
        let count = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
        let data: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({ "embedding": vec![i as f32 * 0.1; self.dimension] })
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": data }))
    }
}

async fn setup(server: &MockServer) -> (Pipeline, TempDir) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.paths.db_file = tmp.path().join("curator.db");
    config.chunk.target_tokens = 8;
    config.chunk.overlap_tokens = 2;
    config.embedding.url = format!("{}/v1/embeddings", server.uri());
    config.embedding.dimension = 4;
    config.embedding.batch_size = 2;
    config.chat.url = format!("{}/v1/chat/completions", server.uri());
    config.chat.requests_per_second = 1000;
    config.blob.url = format!("{}/blobs/", server.uri());

    let store = Store::connect(&config).await.unwrap();
    store.init_schema().await.unwrap();

    let pipeline = Pipeline::from_config(config, store).unwrap();
    (pipeline, tmp)
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(EchoEmbeddings { dimension: 4 })
        .mount(server)
        .await;
}

async fn seed_project(pipeline: &Pipeline, docs: &[&str]) -> (Project, Vec<Document>) {
    let project = Project::new("usability study".to_string());
    pipeline.store.insert_project(&project).await.unwrap();

    let mut documents = Vec::new();
    for (i, content) in docs.iter().enumerate() {
        let doc = Document::new(
            project.id.clone(),
            format!("session-{}.txt", i + 1),
            Some(content.to_string()),
        );
        pipeline.store.insert_document(&doc).await.unwrap();
        documents.push(doc);
    }
    (project, documents)
}

#[tokio::test]
async fn ingest_enqueue_then_drain_persists_everything() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    let (pipeline, _tmp) = setup(&server).await;

    let (project, docs) = seed_project(
        &pipeline,
        &[
            "Moderator: Thanks for joining. Participant: Happy to be here. It took a while to set up.",
            "The onboarding was confusing at first. After the second session it clicked.",
        ],
    )
    .await;

    let outcome = queue::enqueue_ingest(&pipeline.store, &pipeline.config, &project.id, false)
        .await
        .unwrap();
    assert_eq!(outcome.jobs_created, 2);

    let (processed, failed) = worker::drain_ingest_queue(&pipeline).await.unwrap();
    assert_eq!(processed, 2);
    assert_eq!(failed, 0);

    for doc in &docs {
        let chunks = pipeline.store.list_chunks(&doc.id).await.unwrap();
        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
            assert_eq!(chunk.version_hash, doc.version_hash());
        }
        assert_eq!(
            pipeline
                .store
                .count_document_embeddings(&doc.id)
                .await
                .unwrap(),
            chunks.len() as i64
        );
    }

    let meta = pipeline
        .store
        .get_ingest_metadata(&project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.status, "completed");
    assert_eq!(meta.jobs_completed, 2);
    assert_eq!(meta.jobs_failed, 0);
}

#[tokio::test]
async fn reingesting_a_document_does_not_duplicate_chunks() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    let (pipeline, _tmp) = setup(&server).await;

    let (project, docs) = seed_project(
        &pipeline,
        &["One short sentence. Then a second one. And a third for good measure."],
    )
    .await;

    queue::enqueue_ingest(&pipeline.store, &pipeline.config, &project.id, false)
        .await
        .unwrap();
    worker::drain_ingest_queue(&pipeline).await.unwrap();
    let first = pipeline.store.list_chunks(&docs[0].id).await.unwrap();

    // Terminal jobs are reset to queued; a second drain re-cuts the chunks
    queue::enqueue_ingest(&pipeline.store, &pipeline.config, &project.id, false)
        .await
        .unwrap();
    let (processed, _) = worker::drain_ingest_queue(&pipeline).await.unwrap();
    assert_eq!(processed, 1);

    let second = pipeline.store.list_chunks(&docs[0].id).await.unwrap();
    assert_eq!(first.len(), second.len());
    assert_eq!(
        pipeline
            .store
            .count_document_embeddings(&docs[0].id)
            .await
            .unwrap(),
        second.len() as i64
    );
}

#[tokio::test]
async fn analysis_writes_one_result_per_question_per_document() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content":
                "{\"quote\": \"it clicked\", \"summary\": \"Onboarding improved over time\", \"theme\": \"learning curve\", \"confidence\": 0.9}" } }]
        })))
        .mount(&server)
        .await;
    let (pipeline, _tmp) = setup(&server).await;

    let (project, _docs) = seed_project(
        &pipeline,
        &[
            "The onboarding was confusing at first. After the second session it clicked.",
            "Setup was quick. The dashboard made sense immediately.",
        ],
    )
    .await;

    for (i, prompt) in ["How was onboarding?", "What stood out?"].iter().enumerate() {
        pipeline
            .store
            .insert_guide_question(&GuideQuestion::new(
                project.id.clone(),
                None,
                prompt.to_string(),
                i as i64,
            ))
            .await
            .unwrap();
    }

    queue::enqueue_analysis(&pipeline.store, &pipeline.config, &project.id)
        .await
        .unwrap();
    let outcome = worker::run_analysis_worker(&pipeline).await.unwrap().unwrap();
    assert_eq!(outcome.documents_processed, 2);
    assert_eq!(outcome.results_written, 4);
    assert_eq!(outcome.degraded_results, 0);

    let results = pipeline
        .store
        .list_analysis_results(&project.id)
        .await
        .unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.degraded == 0));
    assert!(results
        .iter()
        .all(|r| r.summary == "Onboarding improved over time"));

    let job = pipeline
        .store
        .get_analysis_job(&project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "completed");
    assert_eq!(job.batches_completed, 2);
}

#[tokio::test]
async fn chat_failures_degrade_results_without_failing_the_job() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
        .mount(&server)
        .await;
    let (pipeline, _tmp) = setup(&server).await;

    let (project, _docs) = seed_project(&pipeline, &["Some transcript content here."]).await;
    pipeline
        .store
        .insert_guide_question(&GuideQuestion::new(
            project.id.clone(),
            None,
            "How was it?".to_string(),
            0,
        ))
        .await
        .unwrap();

    queue::enqueue_analysis(&pipeline.store, &pipeline.config, &project.id)
        .await
        .unwrap();
    let outcome = worker::run_analysis_worker(&pipeline).await.unwrap().unwrap();
    assert_eq!(outcome.degraded_results, 1);

    let results = pipeline
        .store
        .list_analysis_results(&project.id)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].degraded, 1);

    let job = pipeline
        .store
        .get_analysis_job(&project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "completed");
}

#[tokio::test]
async fn blob_backed_documents_are_fetched_over_http() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    Mock::given(method("GET"))
        .and(path("/blobs/transcripts/remote.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("Fetched from storage. It has two sentences."),
        )
        .mount(&server)
        .await;
    let (pipeline, _tmp) = setup(&server).await;

    let project = Project::new("remote study".to_string());
    pipeline.store.insert_project(&project).await.unwrap();
    let mut doc = Document::new(project.id.clone(), "remote.txt".to_string(), None);
    doc.storage_path = Some("transcripts/remote.txt".to_string());
    pipeline.store.insert_document(&doc).await.unwrap();

    queue::enqueue_ingest(&pipeline.store, &pipeline.config, &project.id, false)
        .await
        .unwrap();
    let (processed, failed) = worker::drain_ingest_queue(&pipeline).await.unwrap();
    assert_eq!(processed, 1);
    assert_eq!(failed, 0);

    let chunks = pipeline.store.list_chunks(&doc.id).await.unwrap();
    assert!(!chunks.is_empty());
    assert!(chunks[0].text.contains("Fetched from storage"));
}
