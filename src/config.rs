use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::auth::Credentials;
use crate::error::FlowMetrixError;

pub const DEFAULT_JENKINS_URL: &str = "http://localhost:8080";
pub const DEFAULT_JOB: &str = "my-pipeline-job";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_LISTEN_PORT: u16 = 8000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Configuration file structure for FlowMetrix.
///
/// Every field is optional; values given on the command line or through the
/// environment take precedence over the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub jenkins: JenkinsConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub exporter: ExporterConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JenkinsConfig {
    /// Jenkins base URL
    pub url: Option<String>,

    /// Jenkins user the API token belongs to
    pub user: Option<String>,

    /// Jenkins API token or password
    pub token: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CollectorConfig {
    /// Jobs to monitor; folder jobs use `folder/job`
    pub jobs: Option<Vec<String>>,

    /// Seconds between collection cycles
    pub poll_interval: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExporterConfig {
    /// Port of the Prometheus pull endpoint
    pub listen_port: Option<u16>,
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./flowmetrix.toml
    /// 3. ./flowmetrix.json
    /// 4. ./flowmetrix.yaml
    /// 5. ./flowmetrix.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Self::load_from_path(path);
        }

        let candidates = [
            "flowmetrix.toml",
            "flowmetrix.json",
            "flowmetrix.yaml",
            "flowmetrix.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}

/// Fully resolved runtime settings, passed explicitly to the components that
/// need them.
#[derive(Debug, Clone)]
pub struct Settings {
    pub jenkins_url: String,
    pub username: Option<String>,
    pub token: Option<String>,
    pub jobs: Vec<String>,
    pub poll_interval: Duration,
    pub listen_port: u16,
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jenkins_url: DEFAULT_JENKINS_URL.to_string(),
            username: None,
            token: None,
            jobs: vec![DEFAULT_JOB.to_string()],
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            listen_port: DEFAULT_LISTEN_PORT,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Credentials for Jenkins; both user and token are required.
    pub fn credentials(&self) -> std::result::Result<Credentials, FlowMetrixError> {
        match (self.username.as_deref(), self.token.as_deref()) {
            (Some(user), Some(token)) if !user.is_empty() && !token.is_empty() => {
                Ok(Credentials::new(user, token))
            }
            _ => Err(FlowMetrixError::MissingCredentials),
        }
    }
}

/// Splits a comma-separated job list, trimming whitespace and dropping empty entries.
pub fn parse_job_list<I, S>(jobs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    jobs.into_iter()
        .flat_map(|entry| {
            entry
                .as_ref()
                .split(',')
                .map(str::trim)
                .filter(|job| !job.is_empty())
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.jenkins_url, "http://localhost:8080");
        assert_eq!(settings.jobs, vec!["my-pipeline-job"]);
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
        assert_eq!(settings.listen_port, 8000);
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[jenkins]
url = "https://jenkins.example.com"
user = "ci-bot"
token = "11aa22"
request-timeout = 5

[collector]
jobs = ["app", "team/service"]
poll-interval = 30

[exporter]
listen-port = 9100
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.jenkins.url.as_deref(), Some("https://jenkins.example.com"));
        assert_eq!(config.jenkins.user.as_deref(), Some("ci-bot"));
        assert_eq!(config.jenkins.request_timeout, Some(5));
        assert_eq!(
            config.collector.jobs,
            Some(vec!["app".to_string(), "team/service".to_string()])
        );
        assert_eq!(config.collector.poll_interval, Some(30));
        assert_eq!(config.exporter.listen_port, Some(9100));
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "jenkins": {
    "url": "https://jenkins.json.example"
  },
  "exporter": {
    "listen-port": 9200
  }
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.jenkins.url.as_deref(), Some("https://jenkins.json.example"));
        assert_eq!(config.exporter.listen_port, Some(9200));
        assert!(config.collector.jobs.is_none());
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let yaml_content = "collector:\n  jobs:\n    - nightly\n  poll-interval: 120\n";
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.collector.jobs, Some(vec!["nightly".to_string()]));
        assert_eq!(config.collector.poll_interval, Some(120));
    }

    #[test]
    fn test_unknown_extension_falls_back_through_formats() {
        let mut temp_file = NamedTempFile::with_suffix(".conf").unwrap();
        write!(temp_file, r#"{{"exporter": {{"listen-port": 9300}}}}"#).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.exporter.listen_port, Some(9300));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[jenkins\nurl = ").unwrap();

        let err = Config::load_from_path(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let result = Config::load(Some(Path::new("does-not-exist/flowmetrix.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_credentials_require_user_and_token() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.credentials(),
            Err(FlowMetrixError::MissingCredentials)
        ));

        settings.username = Some("ci-bot".to_string());
        settings.token = Some(String::new());
        assert!(settings.credentials().is_err());

        settings.token = Some("11aa22".to_string());
        let credentials = settings.credentials().unwrap();
        assert_eq!(credentials.username, "ci-bot");
        assert_eq!(credentials.token.as_str(), "11aa22");
    }

    #[test]
    fn test_parse_job_list() {
        assert_eq!(
            parse_job_list(["app, team/service ,,nightly"]),
            vec!["app", "team/service", "nightly"]
        );
        assert_eq!(parse_job_list(["a", "b,c"]), vec!["a", "b", "c"]);
        assert!(parse_job_list([" , "]).is_empty());
    }
}
