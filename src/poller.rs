use std::time::Duration;

use log::info;
use tokio_util::sync::CancellationToken;

use crate::collector::Collector;

/// Runs collection cycles back to back, sleeping `interval` between them,
/// until `cancel` fires.
///
/// Returns the number of cycles that ran.
pub async fn run(collector: &mut Collector, interval: Duration, cancel: CancellationToken) -> u64 {
    info!("Starting main collection loop...");
    let mut cycles = 0;

    while !cancel.is_cancelled() {
        let summary = collector.collect(&cancel).await;
        cycles += 1;

        info!(
            "Collection cycle complete ({} jobs, {} builds processed, {} jobs failed). Sleeping for {} seconds.",
            summary.jobs_polled,
            summary.builds_processed,
            summary.jobs_failed,
            interval.as_secs()
        );

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    info!("Collection loop stopped after {cycles} cycles");
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::jenkins::JenkinsClient;
    use crate::metrics::PipelineMetrics;
    use crate::watermark::WatermarkStore;
    use mockito::{Matcher, Server};
    use std::sync::Arc;

    fn collector_for(url: &str, jobs: &[&str]) -> Collector {
        let client =
            JenkinsClient::new(url, Credentials::new("u", "t"), Duration::from_secs(5)).unwrap();
        Collector::with_watermarks(
            client,
            Arc::new(PipelineMetrics::new().unwrap()),
            jobs.iter().map(ToString::to_string).collect(),
            WatermarkStore::new(),
        )
    }

    #[tokio::test]
    async fn does_nothing_when_already_cancelled() {
        let mut server = Server::new_async().await;
        let job = server
            .mock("GET", "/job/app/api/json")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut collector = collector_for(&server.url(), &["app"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let cycles = run(&mut collector, Duration::from_secs(60), cancel).await;

        assert_eq!(cycles, 0);
        job.assert_async().await;
    }

    #[tokio::test]
    async fn keeps_polling_until_cancelled() {
        let mut server = Server::new_async().await;
        let job = server
            .mock("GET", "/job/app/api/json")
            .match_query(Matcher::Any)
            .with_body(r#"{"lastCompletedBuild":null}"#)
            .expect_at_least(2)
            .create_async()
            .await;

        let mut collector = collector_for(&server.url(), &["app"]);
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            stopper.cancel();
        });

        let cycles = run(&mut collector, Duration::from_millis(20), cancel).await;

        assert!(cycles >= 2, "expected several cycles, got {cycles}");
        job.assert_async().await;
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_sleep() {
        let mut collector = collector_for("http://127.0.0.1:9", &[]);
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });

        let started = std::time::Instant::now();
        let cycles = run(&mut collector, Duration::from_secs(3600), cancel).await;

        assert_eq!(cycles, 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
