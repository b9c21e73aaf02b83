//! Worker commands

use crate::error::Result;
use crate::worker::{self, AnalysisOutcome, IngestOutcome, Pipeline};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Drain statistics for CLI output
#[derive(Debug, Clone, Serialize)]
pub struct WorkStats {
    pub processed: usize,
    pub failed: usize,
    pub chunks_created: usize,
    pub embeddings_created: usize,
}

/// Claim and process one ingest job. `Ok(None)` means the queue was idle.
pub async fn cmd_work_once(pipeline: &Pipeline) -> Result<Option<IngestOutcome>> {
    worker::run_ingest_worker(pipeline).await
}

/// Drain the ingest queue with a progress spinner
pub async fn cmd_work_drain(pipeline: &Pipeline) -> Result<WorkStats> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut stats = WorkStats {
        processed: 0,
        failed: 0,
        chunks_created: 0,
        embeddings_created: 0,
    };

    loop {
        spinner.set_message(format!(
            "processed {} job(s), {} failed",
            stats.processed, stats.failed
        ));
        match worker::run_ingest_worker(pipeline).await {
            Ok(Some(outcome)) => {
                stats.processed += 1;
                stats.chunks_created += outcome.chunks_created;
                stats.embeddings_created += outcome.embeddings_created;
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Job failed during drain, continuing");
                stats.failed += 1;
            }
        }
    }

    spinner.finish_and_clear();
    Ok(stats)
}

/// Claim and process one analysis job
pub async fn cmd_analyze_work(pipeline: &Pipeline) -> Result<Option<AnalysisOutcome>> {
    worker::run_analysis_worker(pipeline).await
}

pub fn print_work_stats(stats: &WorkStats) {
    println!("✓ Queue drained");
    println!("  Jobs processed: {}", stats.processed);
    println!("  Jobs failed: {}", stats.failed);
    println!("  Chunks created: {}", stats.chunks_created);
    println!("  Embeddings created: {}", stats.embeddings_created);
}
