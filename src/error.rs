use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowMetrixError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JENKINS_USER and JENKINS_TOKEN must be set")]
    MissingCredentials,

    #[error("Job '{0}' not found on Jenkins")]
    JobNotFound(String),

    #[error("Jenkins API request failed with status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowMetrixError {
    /// Whether the failure came from talking to Jenkins (transport problems or
    /// non-2xx answers) rather than from something unexpected like a malformed body.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::ApiError { .. })
    }
}

pub type Result<T> = std::result::Result<T, FlowMetrixError>;
