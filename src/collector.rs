use std::sync::Arc;

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::branch::resolve_branch;
use crate::error::{FlowMetrixError, Result};
use crate::jenkins::JenkinsClient;
use crate::metrics::PipelineMetrics;
use crate::watermark::WatermarkStore;

/// Outcome of one pass over the monitored jobs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub jobs_polled: usize,
    pub jobs_failed: usize,
    pub builds_processed: usize,
}

/// Turns newly completed Jenkins builds into metrics, one job at a time.
///
/// Builds are processed in ascending order and the job's watermark only moves
/// past a build once its metrics were recorded. The first failure ends the
/// job's batch for the cycle so the build is retried next time instead of
/// being skipped.
pub struct Collector {
    client: JenkinsClient,
    metrics: Arc<PipelineMetrics>,
    jobs: Vec<String>,
    watermarks: WatermarkStore,
}

impl Collector {
    /// Creates a collector whose watermarks are seeded from Jenkins.
    pub async fn new(client: JenkinsClient, metrics: Arc<PipelineMetrics>, jobs: Vec<String>) -> Self {
        let watermarks = WatermarkStore::initialize(&client, &jobs).await;
        Self::with_watermarks(client, metrics, jobs, watermarks)
    }

    pub fn with_watermarks(
        client: JenkinsClient,
        metrics: Arc<PipelineMetrics>,
        jobs: Vec<String>,
        watermarks: WatermarkStore,
    ) -> Self {
        Self {
            client,
            metrics,
            jobs,
            watermarks,
        }
    }

    #[cfg(test)]
    pub(crate) fn watermarks(&self) -> &WatermarkStore {
        &self.watermarks
    }

    /// Runs one collection cycle over every monitored job, in configured order.
    ///
    /// Errors never escape: each job's failure is logged and the remaining
    /// jobs are still polled.
    pub async fn collect(&mut self, cancel: &CancellationToken) -> CycleSummary {
        info!("Checking for new builds...");
        let mut summary = CycleSummary::default();

        for index in 0..self.jobs.len() {
            if cancel.is_cancelled() {
                info!("Collection cancelled, stopping cycle early");
                break;
            }

            let job = self.jobs[index].clone();
            summary.jobs_polled += 1;

            match self.collect_job(&job, cancel).await {
                Ok(processed) => summary.builds_processed += processed,
                Err(e) => {
                    summary.jobs_failed += 1;
                    match &e {
                        FlowMetrixError::JobNotFound(_) => {
                            error!("Job '{job}' not found during collection. Please check JOBS_TO_MONITOR.");
                        }
                        FlowMetrixError::Network(_) => {
                            error!("Network error connecting to Jenkins for job '{job}': {e}");
                        }
                        FlowMetrixError::ApiError { .. } => {
                            error!("Jenkins API error for job '{job}': {e}");
                        }
                        _ => {
                            error!("An unexpected error occurred during collection for '{job}': {e:?}");
                        }
                    }
                }
            }
        }

        summary
    }

    /// Processes every build of `job` completed since its watermark.
    ///
    /// Returns the number of builds turned into metrics. Only a failure to
    /// read the job itself is returned as an error; build failures end the
    /// batch and are logged here.
    async fn collect_job(&mut self, job: &str, cancel: &CancellationToken) -> Result<usize> {
        let job_info = self.client.get_job_info(job).await?;
        let last_completed = job_info.last_completed_number();
        let last_processed = self.watermarks.get(job);

        if last_completed <= last_processed {
            info!("No new completed builds for '{job}'. Last processed: {last_processed}");
            return Ok(0);
        }

        info!(
            "Found new builds for '{job}'. Processing from {} to {last_completed}",
            last_processed + 1
        );

        let mut processed = 0;
        for build_number in (last_processed + 1)..=last_completed {
            if cancel.is_cancelled() {
                break;
            }

            match self.process_build(job, build_number).await {
                Ok(()) => {
                    self.watermarks.advance(job, build_number);
                    processed += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!("Network or API error while fetching build {job} #{build_number}: {e}");
                    break;
                }
                Err(e) => {
                    error!("Failed to process build {job} #{build_number} unexpectedly: {e:?}");
                    break;
                }
            }
        }

        Ok(processed)
    }

    /// Fetches one build and records its metrics.
    pub async fn process_build(&self, job: &str, build_number: u64) -> Result<()> {
        info!("Processing {job} #{build_number}...");

        let build = self.client.describe_build(job, build_number).await?;
        let branch = resolve_branch(&build.actions);

        self.metrics.observe_build(job, build_number, &build, &branch);

        info!(
            "Successfully processed {job} #{build_number} ({}, branch {branch})",
            build.status()
        );
        Ok(())
    }
}
