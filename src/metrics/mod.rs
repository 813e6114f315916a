//! Prometheus metrics exported by FlowMetrix.
//!
//! Metric names and label sets are what dashboards query, so they must stay
//! stable:
//! - `flowmetrix_pipeline_build_total{job_name, status, branch}`
//! - `flowmetrix_pipeline_build_duration_seconds{job_name, branch}`
//! - `flowmetrix_pipeline_stage_duration_seconds{job_name, stage_name, branch, status}`
//! - `flowmetrix_last_processed_build_number{job_name}`

mod server;

pub use server::MetricsServer;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::error::Result;
use crate::jenkins::BuildDescription;

// +Inf is appended by the histogram itself.
const BUILD_DURATION_BUCKETS: [f64; 8] = [30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0];
const STAGE_DURATION_BUCKETS: [f64; 8] = [5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0];

/// Owns the registry and every metric family the exporter publishes.
pub struct PipelineMetrics {
    registry: Registry,
    builds_total: CounterVec,
    build_duration: HistogramVec,
    stage_duration: HistogramVec,
    last_processed_build: IntGaugeVec,
}

impl PipelineMetrics {
    /// Creates the metric families and registers them with a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric definition is rejected by the registry.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let builds_total = CounterVec::new(
            Opts::new(
                "flowmetrix_pipeline_build_total",
                "Total number of pipeline builds",
            ),
            &["job_name", "status", "branch"],
        )?;

        let build_duration = HistogramVec::new(
            HistogramOpts::new(
                "flowmetrix_pipeline_build_duration_seconds",
                "Histogram of pipeline build durations in seconds",
            )
            .buckets(BUILD_DURATION_BUCKETS.to_vec()),
            &["job_name", "branch"],
        )?;

        let stage_duration = HistogramVec::new(
            HistogramOpts::new(
                "flowmetrix_pipeline_stage_duration_seconds",
                "Histogram of pipeline stage durations in seconds",
            )
            .buckets(STAGE_DURATION_BUCKETS.to_vec()),
            &["job_name", "stage_name", "branch", "status"],
        )?;

        let last_processed_build = IntGaugeVec::new(
            Opts::new(
                "flowmetrix_last_processed_build_number",
                "The last build number processed by the exporter",
            ),
            &["job_name"],
        )?;

        registry.register(Box::new(builds_total.clone()))?;
        registry.register(Box::new(build_duration.clone()))?;
        registry.register(Box::new(stage_duration.clone()))?;
        registry.register(Box::new(last_processed_build.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            builds_total,
            build_duration,
            stage_duration,
            last_processed_build,
        })
    }

    /// Records one finished build: counter, build and stage durations, and the
    /// last-processed gauge.
    pub fn observe_build(
        &self,
        job_name: &str,
        build_number: u64,
        build: &BuildDescription,
        branch: &str,
    ) {
        self.builds_total
            .with_label_values(&[job_name, build.status(), branch])
            .inc();
        self.build_duration
            .with_label_values(&[job_name, branch])
            .observe(build.duration_seconds());

        for stage in &build.stages {
            self.stage_duration
                .with_label_values(&[job_name, stage.name(), branch, stage.status()])
                .observe(stage.duration_seconds());
        }

        self.last_processed_build
            .with_label_values(&[job_name])
            .set(i64::try_from(build_number).unwrap_or(i64::MAX));
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    #[cfg(test)]
    pub(crate) fn build_count(&self, job_name: &str, status: &str, branch: &str) -> f64 {
        self.builds_total
            .with_label_values(&[job_name, status, branch])
            .get()
    }

    #[cfg(test)]
    pub(crate) fn build_duration_samples(&self, job_name: &str, branch: &str) -> (u64, f64) {
        let histogram = self.build_duration.with_label_values(&[job_name, branch]);
        (histogram.get_sample_count(), histogram.get_sample_sum())
    }

    #[cfg(test)]
    pub(crate) fn stage_duration_samples(
        &self,
        job_name: &str,
        stage_name: &str,
        branch: &str,
        status: &str,
    ) -> (u64, f64) {
        let histogram = self
            .stage_duration
            .with_label_values(&[job_name, stage_name, branch, status]);
        (histogram.get_sample_count(), histogram.get_sample_sum())
    }

    #[cfg(test)]
    pub(crate) fn last_processed(&self, job_name: &str) -> i64 {
        self.last_processed_build.with_label_values(&[job_name]).get()
    }

    /// Total builds counted for a job across all statuses and branches.
    #[cfg(test)]
    pub(crate) fn total_builds_for(&self, job_name: &str) -> f64 {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == "flowmetrix_pipeline_build_total")
            .flat_map(|family| family.get_metric())
            .filter(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|label| label.get_name() == "job_name" && label.get_value() == job_name)
            })
            .map(|metric| metric.get_counter().get_value())
            .sum()
    }
}
