use std::time::Duration;

use log::debug;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::OnceCell;
use url::Url;

use crate::auth::Credentials;
use crate::error::{FlowMetrixError, Result};

use super::types::{BuildDescription, JobInfo};

const VERSION_HEADER: &str = "X-Jenkins";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// CSRF crumb issued by Jenkins' crumb issuer.
#[derive(Debug, Clone)]
struct Crumb {
    header: HeaderName,
    value: HeaderValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrumbResponse {
    crumb: String,
    crumb_request_field: String,
}

/// Thin client for the parts of the Jenkins JSON API the exporter needs.
pub struct JenkinsClient {
    client: Client,
    base_url: Url,
    credentials: Credentials,
    crumb: OnceCell<Option<Crumb>>,
}

impl JenkinsClient {
    /// Creates a client for the Jenkins instance at `base_url`.
    ///
    /// Every request made by the client is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or the HTTP client cannot be built.
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("flowmetrix/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FlowMetrixError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(base_url)
            .map_err(|e| FlowMetrixError::Config(format!("Invalid Jenkins URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FlowMetrixError::Config(format!(
                "Invalid Jenkins URL: {base_url}"
            )));
        }

        Ok(Self {
            client,
            base_url,
            credentials,
            crumb: OnceCell::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs the startup handshake and returns the Jenkins version.
    pub async fn get_version(&self) -> Result<String> {
        let response = self.get(self.base_url.clone()).await?;

        response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
            .ok_or_else(|| FlowMetrixError::ApiError {
                status: response.status().as_u16(),
                message: format!("response from {} has no {VERSION_HEADER} header", self.base_url),
            })
    }

    /// Fetches job metadata (build pointers only).
    ///
    /// # Errors
    ///
    /// Returns [`FlowMetrixError::JobNotFound`] when Jenkins answers 404.
    pub async fn get_job_info(&self, job_name: &str) -> Result<JobInfo> {
        let mut url = self.endpoint(&job_segments(job_name), &["api", "json"])?;
        url.query_pairs_mut().append_pair("depth", "0");

        match self.get_json(url).await {
            Err(FlowMetrixError::ApiError { status: 404, .. }) => {
                Err(FlowMetrixError::JobNotFound(job_name.to_string()))
            }
            result => result,
        }
    }

    /// Fetches the stage view description of a single build.
    pub async fn describe_build(&self, job_name: &str, build_number: u64) -> Result<BuildDescription> {
        let number = build_number.to_string();
        let url = self.endpoint(&job_segments(job_name), &[&number, "wfapi", "describe"])?;
        self.get_json(url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let body = self.get(url).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get(&self, url: Url) -> Result<Response> {
        let request = self.client.get(url);
        let response = self.authorize(request).await?.send().await?;
        check_status(response).await
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let request = request.basic_auth(
            &self.credentials.username,
            Some(self.credentials.token.as_str()),
        );

        let crumb = self
            .crumb
            .get_or_try_init(|| self.fetch_crumb())
            .await?;

        Ok(match crumb {
            Some(crumb) => request.header(crumb.header.clone(), crumb.value.clone()),
            None => request,
        })
    }

    /// Asks the crumb issuer for a CSRF crumb.
    ///
    /// A non-2xx answer means CSRF protection is disabled and is remembered as
    /// "no crumb"; transport errors are returned so the next request tries again.
    async fn fetch_crumb(&self) -> Result<Option<Crumb>> {
        let url = self.endpoint(&[], &["crumbIssuer", "api", "json"])?;
        let response = self
            .client
            .get(url)
            .basic_auth(&self.credentials.username, Some(self.credentials.token.as_str()))
            .send()
            .await?;

        if !response.status().is_success() {
            debug!("Crumb issuer answered {}, sending requests without a crumb", response.status());
            return Ok(None);
        }

        let body = response.text().await?;
        let Ok(issued) = serde_json::from_str::<CrumbResponse>(&body) else {
            debug!("Crumb issuer returned an unexpected payload, sending requests without a crumb");
            return Ok(None);
        };

        let header = HeaderName::from_bytes(issued.crumb_request_field.as_bytes()).ok();
        let value = HeaderValue::from_str(&issued.crumb).ok();
        Ok(header.zip(value).map(|(header, value)| {
            debug!("Using Jenkins crumb header {header}");
            Crumb { header, value }
        }))
    }

    fn endpoint(&self, job_path: &[String], tail: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FlowMetrixError::Config(format!("Invalid Jenkins URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(job_path)
            .extend(tail);
        Ok(url)
    }
}

/// Path segments addressing a job, descending into folders on `/`.
fn job_segments(job_name: &str) -> Vec<String> {
    job_name
        .split('/')
        .filter(|part| !part.is_empty())
        .flat_map(|part| ["job".to_string(), part.to_string()])
        .collect()
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.text().await {
        Ok(body) if !body.trim().is_empty() => body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        _ => status
            .canonical_reason()
            .unwrap_or("Unable to read error response")
            .to_string(),
    };

    Err(FlowMetrixError::ApiError {
        status: status.as_u16(),
        message,
    })
}
