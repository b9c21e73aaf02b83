//! Status command implementation

use crate::error::Result;
use crate::store::{AnalysisJob, IngestJob, Project, ProjectIngestMetadata, Store};
use serde::Serialize;

/// Everything `curator status <project>` reports
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub project: Project,
    pub metadata: Option<ProjectIngestMetadata>,
    pub jobs: Vec<IngestJob>,
    pub analysis: Option<AnalysisJob>,
    pub documents: usize,
}

/// Collect ingest and analysis status for a project
pub async fn cmd_status(store: &Store, project: &Project) -> Result<StatusReport> {
    Ok(StatusReport {
        project: project.clone(),
        metadata: store.get_ingest_metadata(&project.id).await?,
        jobs: store.list_ingest_jobs(&project.id).await?,
        analysis: store.get_analysis_job(&project.id).await?,
        documents: store.list_documents(&project.id).await?.len(),
    })
}

pub fn print_status(report: &StatusReport) {
    println!("Project: {} ({})", report.project.name, report.project.id);
    println!("Documents: {}", report.documents);

    match &report.metadata {
        Some(meta) => {
            println!(
                "Ingest: {} ({}/{} completed, {} failed)",
                meta.status, meta.jobs_completed, meta.jobs_total, meta.jobs_failed
            );
            if let Some(eta) = &meta.estimated_completion {
                println!("  Estimated completion: {}", eta);
            }
        }
        None => println!("Ingest: nothing enqueued yet"),
    }

    for job in &report.jobs {
        let error = job
            .error_message
            .as_deref()
            .map(|e| format!(" — {}", e))
            .unwrap_or_default();
        println!(
            "  [{}] doc {} ({}, {}/{} chunks, {} retries){}",
            job.status,
            job.document_id,
            job.phase,
            job.chunks_created,
            job.chunks_total,
            job.retry_count,
            error
        );
    }

    match &report.analysis {
        Some(job) => println!(
            "Analysis: {} ({}/{} documents, {}%)",
            job.status,
            job.batches_completed,
            job.batches_total,
            job.progress_percent()
        ),
        None => println!("Analysis: not enqueued"),
    }
}
