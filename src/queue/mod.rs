//! Job enqueuing
//!
//! Turns a project into queue state: one ingest job per document plus the
//! aggregate metadata row the UI polls, or one analysis job per project.
//! Enqueuing never processes anything; workers pick the jobs up later.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::Store;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::info;

/// What an enqueue call produced
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueOutcome {
    pub project_id: String,
    pub jobs_created: u64,
    pub estimated_completion: Option<String>,
}

/// Create ingest jobs for every document in the project.
///
/// Documents with a queued or running job are skipped; terminal jobs are
/// reset to queued. With `force`, all existing jobs are deleted first and
/// every document gets a fresh job. Also seeds the project's ingest
/// metadata row with a completion estimate.
pub async fn enqueue_ingest(
    store: &Store,
    config: &Config,
    project_id: &str,
    force: bool,
) -> Result<EnqueueOutcome> {
    let project = store
        .get_project(project_id)
        .await?
        .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;

    let documents = store.list_documents(&project.id).await?;

    if force {
        let deleted = store.delete_ingest_jobs(&project.id).await?;
        info!(project_id = %project.id, deleted, "Deleted existing ingest jobs (force)");
    }

    let mut jobs_created = 0u64;
    for doc in &documents {
        if store.enqueue_ingest_job(&project.id, &doc.id).await? {
            jobs_created += 1;
        }
    }

    let estimated_completion = if jobs_created > 0 {
        let eta = Utc::now()
            + ChronoDuration::seconds(jobs_created as i64 * config.queue.secs_per_document);
        Some(eta.to_rfc3339())
    } else {
        None
    };

    store
        .seed_ingest_metadata(
            &project.id,
            documents.len() as i64,
            estimated_completion.clone(),
        )
        .await?;
    // The seed resets counters; the scan restores them for skipped jobs
    store.recompute_ingest_metadata(&project.id).await?;

    info!(project_id = %project.id, jobs_created, "Enqueued ingest jobs");
    Ok(EnqueueOutcome {
        project_id: project.id,
        jobs_created,
        estimated_completion,
    })
}

/// Create (or reset) the project's analysis job. One batch per document.
pub async fn enqueue_analysis(
    store: &Store,
    config: &Config,
    project_id: &str,
) -> Result<EnqueueOutcome> {
    let project = store
        .get_project(project_id)
        .await?
        .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;

    let documents = store.list_documents(&project.id).await?;
    let created = store
        .enqueue_analysis_job(&project.id, documents.len() as i64)
        .await?;

    let jobs_created = u64::from(created);
    let estimated_completion = if created {
        let eta = Utc::now()
            + ChronoDuration::seconds(
                documents.len() as i64 * config.queue.secs_per_document,
            );
        Some(eta.to_rfc3339())
    } else {
        None
    };

    info!(project_id = %project.id, jobs_created, "Enqueued analysis job");
    Ok(EnqueueOutcome {
        project_id: project.id,
        jobs_created,
        estimated_completion,
    })
}
