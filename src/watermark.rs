use std::collections::HashMap;

use log::{debug, error, info};

use crate::error::FlowMetrixError;
use crate::jenkins::JenkinsClient;

/// Highest build number already turned into metrics, per job.
///
/// Lives only in memory; a restart rebuilds it from Jenkins.
#[derive(Debug, Default, Clone)]
pub struct WatermarkStore {
    marks: HashMap<String, u64>,
}

impl WatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store from each job's current build pointers.
    ///
    /// Jobs that cannot be looked up keep a watermark of 0 and are picked up
    /// by the polling loop once Jenkins knows them.
    pub async fn initialize(client: &JenkinsClient, jobs: &[String]) -> Self {
        info!("Initializing collector state...");
        let mut seeded = Vec::with_capacity(jobs.len());

        for job in jobs {
            match client.get_job_info(job).await {
                Ok(job_info) => {
                    let watermark = job_info.initial_watermark();
                    info!("Initial state for '{job}': last processed build is {watermark}");
                    seeded.push((job.as_str(), watermark));
                }
                Err(FlowMetrixError::JobNotFound(_)) => {
                    error!("Job '{job}' not found on Jenkins. Skipping initial state for this job.");
                }
                Err(e) => {
                    error!("Error initializing state for '{job}': {e}");
                }
            }
        }

        seeded.into_iter().collect()
    }

    pub fn get(&self, job: &str) -> u64 {
        self.marks.get(job).copied().unwrap_or(0)
    }

    /// Moves a job's watermark forward. Lower values are ignored so the
    /// watermark never goes backwards.
    pub fn advance(&mut self, job: &str, build_number: u64) {
        let mark = self.marks.entry(job.to_string()).or_insert(0);
        if build_number < *mark {
            debug!("Ignoring watermark {build_number} for '{job}', already at {mark}");
            return;
        }
        *mark = build_number;
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for WatermarkStore {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (job, build_number) in iter {
            store.advance(&job.into(), build_number);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    #[test]
    fn unknown_job_starts_at_zero() {
        let store = WatermarkStore::new();
        assert_eq!(store.get("anything"), 0);
    }

    #[test]
    fn advance_never_moves_backwards() {
        let mut store = WatermarkStore::new();
        store.advance("app", 10);
        store.advance("app", 7);
        assert_eq!(store.get("app"), 10);
        store.advance("app", 11);
        assert_eq!(store.get("app"), 11);
    }

    #[test]
    fn collects_from_pairs() {
        let store: WatermarkStore = [("A", 5), ("B", 10)].into_iter().collect();
        assert_eq!(store.get("A"), 5);
        assert_eq!(store.get("B"), 10);
    }

    #[tokio::test]
    async fn initialize_reads_job_pointers() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/job/done/api/json")
            .match_query(Matcher::Any)
            .with_body(r#"{"lastCompletedBuild":{"number":17},"lastBuild":{"number":18}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/job/running/api/json")
            .match_query(Matcher::Any)
            .with_body(r#"{"lastCompletedBuild":null,"lastBuild":{"number":1}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/job/missing/api/json")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/job/broken/api/json")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = JenkinsClient::new(
            &server.url(),
            Credentials::new("u", "t"),
            Duration::from_secs(5),
        )
        .unwrap();
        let jobs = ["done", "running", "missing", "broken"].map(String::from);

        let store = WatermarkStore::initialize(&client, &jobs).await;

        assert_eq!(store.get("done"), 17);
        assert_eq!(store.get("running"), 1);
        assert_eq!(store.get("missing"), 0);
        assert_eq!(store.get("broken"), 0);
    }
}
