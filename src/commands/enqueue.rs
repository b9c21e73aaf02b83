//! Enqueue and requeue commands

use crate::config::Config;
use crate::error::Result;
use crate::queue::{self, EnqueueOutcome};
use crate::store::{Project, Store};

/// Enqueue ingest jobs for every document in the project
pub async fn cmd_enqueue(
    store: &Store,
    config: &Config,
    project: &Project,
    force: bool,
) -> Result<EnqueueOutcome> {
    queue::enqueue_ingest(store, config, &project.id, force).await
}

/// Enqueue the project's analysis job
pub async fn cmd_enqueue_analysis(
    store: &Store,
    config: &Config,
    project: &Project,
) -> Result<EnqueueOutcome> {
    queue::enqueue_analysis(store, config, &project.id).await
}

/// Reset a project's failed ingest jobs back to queued
pub async fn cmd_requeue(store: &Store, project: &Project) -> Result<u64> {
    let requeued = store.requeue_failed_ingest_jobs(&project.id).await?;
    store.recompute_ingest_metadata(&project.id).await?;
    Ok(requeued)
}

pub fn print_enqueue_outcome(outcome: &EnqueueOutcome) {
    println!("✓ Enqueued {} job(s)", outcome.jobs_created);
    if let Some(eta) = &outcome.estimated_completion {
        println!("  Estimated completion: {}", eta);
    }
}
