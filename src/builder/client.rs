//! Client side of the builder protocol

use super::{BuildFailure, BuildRequest, BuildResponse};
use crate::error::FnplaneError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;

/// Something that can run a build and hand back its artifact name and logs
#[async_trait]
pub trait BuildClient: Send + Sync {
    async fn build(&self, request: &BuildRequest) -> Result<BuildResponse, BuildFailure>;
}

/// [`BuildClient`] that posts to a builder over HTTP
#[derive(Clone)]
pub struct HttpBuildClient {
    url: String,
    agent: Agent,
}

impl HttpBuildClient {
    /// Client for the builder at `base_url`, e.g. `http://127.0.0.1:8000`
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, None)
    }

    /// Same as [`HttpBuildClient::new`], giving up on the whole exchange after `timeout`
    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();
        Self {
            url: format!("{}/", base_url.trim_end_matches('/')),
            agent: Agent::new_with_config(config),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn post(&self, payload: &[u8]) -> Result<(u16, String), ureq::Error> {
        let mut response = self
            .agent
            .post(&self.url)
            .header("Content-Type", "application/json")
            .send(payload)?;
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        Ok((status, body))
    }
}

#[async_trait]
impl BuildClient for HttpBuildClient {
    async fn build(&self, request: &BuildRequest) -> Result<BuildResponse, BuildFailure> {
        let payload = serde_json::to_vec(request).map_err(|e| transport(e.into()))?;

        let client = self.clone();
        let (status, body) = tokio::task::spawn_blocking(move || client.post(&payload))
            .await
            .map_err(|e| transport(FnplaneError::internal(format!("build request task: {}", e))))?
            .map_err(|e| transport(FnplaneError::HttpClient(e.to_string())))?;
        debug!(url = %self.url, status, "builder replied");

        if status == 200 {
            return serde_json::from_str(&body).map_err(|e| transport(e.into()));
        }

        let response = serde_json::from_str::<BuildResponse>(&body).unwrap_or(BuildResponse {
            artifact_filename: String::new(),
            build_logs: body,
        });
        let message = response
            .build_logs
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no logs returned")
            .to_string();

        Err(BuildFailure {
            error: FnplaneError::BuildRequest { status, message },
            artifact_filename: response.artifact_filename,
            build_logs: response.build_logs,
        })
    }
}

/// A failure that happened before the builder produced anything
fn transport(error: FnplaneError) -> BuildFailure {
    BuildFailure {
        error,
        artifact_filename: String::new(),
        build_logs: String::new(),
    }
}
