use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::collector::Collector;
use crate::config::{parse_job_list, Config, Settings};
use crate::jenkins::JenkinsClient;
use crate::metrics::{MetricsServer, PipelineMetrics};
use crate::poller;

#[derive(Parser, Debug)]
#[command(name = "flowmetrix")]
#[command(author, version, about = "Jenkins pipeline metrics exporter for Prometheus", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "FLOWMETRIX_CONFIG")]
    config: Option<PathBuf>,

    /// Jenkins base URL [default: http://localhost:8080]
    #[arg(long, env = "JENKINS_URL")]
    jenkins_url: Option<String>,

    /// Jenkins user
    #[arg(long, env = "JENKINS_USER")]
    jenkins_user: Option<String>,

    /// Jenkins API token or password
    #[arg(long, env = "JENKINS_TOKEN", hide_env_values = true)]
    jenkins_token: Option<String>,

    /// Comma-separated list of jobs to monitor [default: my-pipeline-job]
    #[arg(short, long, env = "JOBS_TO_MONITOR", value_delimiter = ',')]
    jobs: Option<Vec<String>>,

    /// Seconds between collection cycles [default: 60]
    #[arg(long, env = "POLL_INTERVAL")]
    poll_interval: Option<u64>,

    /// Port for the Prometheus pull endpoint [default: 8000]
    #[arg(short, long, env = "LISTEN_PORT")]
    listen_port: Option<u16>,

    /// Timeout in seconds for each Jenkins request [default: 10]
    #[arg(long, env = "REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,
}

impl Cli {
    /// Parses arguments and environment. Misconfiguration exits with status 1;
    /// `--help` and `--version` print and exit 0.
    pub fn parse_or_exit() -> Self {
        Self::try_parse().unwrap_or_else(|e| {
            let _ = e.print();
            std::process::exit(parse_exit_code(&e));
        })
    }

    /// Merges flags and environment over the config file and built-in defaults.
    pub fn resolve(&self, file: Config) -> Result<Settings> {
        let defaults = Settings::default();

        let jobs = match self.jobs.as_ref().or(file.collector.jobs.as_ref()) {
            Some(jobs) => parse_job_list(jobs),
            None => defaults.jobs,
        };
        if jobs.is_empty() {
            anyhow::bail!("Invalid configuration: no jobs to monitor");
        }

        let poll_interval = self
            .poll_interval
            .or(file.collector.poll_interval)
            .map_or(defaults.poll_interval, Duration::from_secs);
        if poll_interval.is_zero() {
            anyhow::bail!("Invalid configuration: poll interval must be at least one second");
        }

        let request_timeout = self
            .request_timeout
            .or(file.jenkins.request_timeout)
            .map_or(defaults.request_timeout, Duration::from_secs);
        if request_timeout.is_zero() {
            anyhow::bail!("Invalid configuration: request timeout must be at least one second");
        }

        Ok(Settings {
            jenkins_url: self
                .jenkins_url
                .clone()
                .or(file.jenkins.url)
                .unwrap_or(defaults.jenkins_url),
            username: self.jenkins_user.clone().or(file.jenkins.user),
            token: self.jenkins_token.clone().or(file.jenkins.token),
            jobs,
            poll_interval,
            listen_port: self
                .listen_port
                .or(file.exporter.listen_port)
                .unwrap_or(defaults.listen_port),
            request_timeout,
        })
    }

    /// Runs the exporter: handshake, watermark seeding, metrics endpoint and
    /// the polling loop. Returns only on shutdown or a startup failure.
    pub async fn execute(&self) -> Result<()> {
        let file = Config::load(self.config.as_deref())?;
        let settings = self.resolve(file)?;

        info!("Connecting to Jenkins at {}", settings.jenkins_url);
        info!("Monitoring jobs: {:?}", settings.jobs);

        let credentials = settings.credentials()?;
        let client = JenkinsClient::new(&settings.jenkins_url, credentials, settings.request_timeout)?;

        let version = client
            .get_version()
            .await
            .with_context(|| format!("Failed to connect to Jenkins at {}", client.base_url()))?;
        info!("Successfully connected to Jenkins version {version}");

        let metrics = Arc::new(PipelineMetrics::new()?);
        let mut collector = Collector::new(client, Arc::clone(&metrics), settings.jobs.clone()).await;

        let shutdown = CancellationToken::new();
        let addr = SocketAddr::from(([0, 0, 0, 0], settings.listen_port));
        let server = MetricsServer::start(addr, metrics, shutdown.clone())
            .await
            .with_context(|| {
                format!(
                    "Failed to start Prometheus HTTP server on port {}",
                    settings.listen_port
                )
            })?;
        info!("Prometheus exporter started on {}", server.local_addr());

        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
            signal.cancel();
        });

        poller::run(&mut collector, settings.poll_interval, shutdown).await;
        server.wait().await;

        Ok(())
    }
}

fn parse_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectorConfig, ExporterConfig, JenkinsConfig};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("flowmetrix").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_file_values() {
        let cli = parse(&[
            "--jenkins-url",
            "https://ci.example.com",
            "--jobs",
            "app,team/service",
            "--listen-port",
            "9100",
        ]);
        let file = Config {
            jenkins: JenkinsConfig {
                url: Some("https://file.example.com".to_string()),
                user: Some("file-user".to_string()),
                token: Some("file-token".to_string()),
                request_timeout: None,
            },
            collector: CollectorConfig {
                jobs: Some(vec!["from-file".to_string()]),
                poll_interval: Some(15),
            },
            exporter: ExporterConfig {
                listen_port: Some(9999),
            },
        };

        let settings = cli.resolve(file).unwrap();

        assert_eq!(settings.jenkins_url, "https://ci.example.com");
        assert_eq!(settings.jobs, vec!["app", "team/service"]);
        assert_eq!(settings.listen_port, 9100);
        assert_eq!(settings.username.as_deref(), Some("file-user"));
        assert_eq!(settings.poll_interval, Duration::from_secs(15));
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn rejects_empty_job_list() {
        let cli = parse(&["--jobs", " , "]);
        assert!(cli.resolve(Config::default()).is_err());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let cli = parse(&["--poll-interval", "0", "--jobs", "app"]);
        let err = cli.resolve(Config::default()).unwrap_err();
        assert!(err.to_string().contains("poll interval"));
    }

    #[test]
    fn malformed_number_exits_with_status_one() {
        let err = Cli::try_parse_from(["flowmetrix", "--poll-interval", "abc"]).unwrap_err();
        assert_eq!(parse_exit_code(&err), 1);
    }

    #[test]
    fn help_exits_with_status_zero() {
        let err = Cli::try_parse_from(["flowmetrix", "--help"]).unwrap_err();
        assert_eq!(parse_exit_code(&err), 0);
    }
}
