//! HTTP implementations of the executor and prober capabilities

use async_trait::async_trait;
use orchlet_core::{InstanceSpec, OrchletError, OrchletResult, ServiceRequest, TransportConfig};
use std::time::Duration;
use tracing::{debug, warn};

use crate::traits::{Executor, Prober};

fn build_client(timeout: Duration) -> OrchletResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| OrchletError::Network(format!("Failed to create HTTP client: {}", e)))
}

/// Posts the request payload as JSON to each instance
pub struct HttpExecutor {
    /// HTTP client for requests
    client: reqwest::Client,
    /// Path appended to the instance URL
    path: String,
    /// Timeout duration
    timeout: Duration,
}

impl HttpExecutor {
    /// Create a new HTTP executor
    pub fn new(path: String, timeout_secs: u64) -> OrchletResult<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        Ok(Self {
            client: build_client(timeout)?,
            path,
            timeout,
        })
    }

    /// Create an executor from transport configuration
    pub fn from_config(config: &TransportConfig) -> OrchletResult<Self> {
        Self::new(config.request_path.clone(), config.request_timeout_secs)
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url_for(&self, instance: &InstanceSpec) -> String {
        format!("{}{}", instance.endpoint.url(), self.path)
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(
        &self,
        instance: &InstanceSpec,
        request: &ServiceRequest,
    ) -> OrchletResult<serde_json::Value> {
        let url = self.url_for(instance);

        let response = self
            .client
            .post(&url)
            .header("x-request-id", request.id.to_string())
            .json(&request.payload)
            .send()
            .await
            .map_err(|e| OrchletError::Network(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %url, status = %status, "Instance returned error status");
            return Err(OrchletError::Network(format!(
                "{} responded with {}",
                url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| OrchletError::Network(format!("{}: {}", url, e)))?;

        debug!(endpoint = %url, bytes = body.len(), "Request executed");

        if body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Health prober issuing GET requests against a fixed path
pub struct HttpProber {
    /// HTTP client for health checks
    client: reqwest::Client,
    /// Health check path
    health_path: String,
    /// Timeout duration
    timeout: Duration,
}

impl HttpProber {
    /// Create a new HTTP prober
    pub fn new(health_path: String, timeout_secs: u64) -> OrchletResult<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        Ok(Self {
            client: build_client(timeout)?,
            health_path,
            timeout,
        })
    }

    /// Create a prober from transport configuration
    pub fn from_config(config: &TransportConfig) -> OrchletResult<Self> {
        Self::new(config.probe_path.clone(), config.probe_timeout_secs)
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn health_check(&self, instance: &InstanceSpec) -> OrchletResult<bool> {
        let url = format!("{}{}", instance.endpoint.url(), self.health_path);

        match self.client.get(&url).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                if healthy {
                    debug!(endpoint = %url, "Health check passed");
                } else {
                    warn!(
                        endpoint = %url,
                        status = %response.status(),
                        "Health check failed"
                    );
                }
                Ok(healthy)
            }
            Err(e) => Err(OrchletError::ProbeFailed(format!("{}: {}", url, e))),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
