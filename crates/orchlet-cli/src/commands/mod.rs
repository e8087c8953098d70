//! CLI commands implementation

use anyhow::{Context, Result};
use orchlet_core::{InstanceStatus, ServiceSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// API client for communicating with the daemon
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Executed request response from API
#[derive(Debug, Deserialize)]
pub struct ExecuteResponse {
    pub request_id: Uuid,
    pub service: String,
    pub result: Value,
}

/// Status response
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub services: usize,
    pub instances: usize,
    pub idle_workers: usize,
    pub shutting_down: bool,
}

/// Register an instance
pub async fn register(
    client: &ApiClient,
    service: &str,
    id: String,
    host: String,
    port: u16,
) -> Result<()> {
    #[derive(Serialize)]
    struct RegisterRequest {
        id: String,
        host: String,
        port: u16,
    }

    let response = client
        .client
        .post(client.url(&format!("/api/v1/services/{}/instances", service)))
        .json(&RegisterRequest { id, host, port })
        .send()
        .await?;

    if response.status().is_success() {
        let instance: InstanceStatus = response.json().await?;
        println!(
            "Instance '{}' registered for service '{}'",
            instance.instance_id, instance.service_name
        );
        println!("  Endpoint: {}", instance.endpoint.url());
    } else {
        let error = response.text().await?;
        eprintln!("Failed to register instance: {}", error);
    }

    Ok(())
}

/// List the instances of a service
pub async fn instances(client: &ApiClient, service: &str) -> Result<()> {
    let response = client
        .client
        .get(client.url(&format!("/api/v1/services/{}/instances", service)))
        .send()
        .await?;

    if response.status().is_success() {
        let instances: Vec<InstanceStatus> = response.json().await?;

        println!(
            "{:<20} {:<25} {:<8} {:<9} {:<8} {:<9} {:<25}",
            "ID", "ENDPOINT", "HEALTHY", "FAILURES", "CIRCUIT", "IN-FLIGHT", "LAST PROBE"
        );
        println!("{}", "-".repeat(110));
        for i in instances {
            let last_probe = i
                .last_probe_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "{:<20} {:<25} {:<8} {:<9} {:<8} {:<9} {:<25}",
                i.instance_id,
                i.endpoint.to_string(),
                i.healthy,
                i.consecutive_failures,
                i.circuit_state.to_string(),
                i.in_flight,
                last_probe
            );
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to list instances: {}", error);
    }

    Ok(())
}

/// List all services
pub async fn services(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/services"))
        .send()
        .await?;

    if response.status().is_success() {
        let services: Vec<ServiceSummary> = response.json().await?;

        if services.is_empty() {
            println!("No services registered");
        } else {
            println!(
                "{:<25} {:<10} {:<10} {:<14}",
                "SERVICE", "INSTANCES", "HEALTHY", "OPEN CIRCUITS"
            );
            println!("{}", "-".repeat(62));
            for s in services {
                println!(
                    "{:<25} {:<10} {:<10} {:<14}",
                    s.service_name, s.instances, s.healthy_instances, s.open_circuits
                );
            }
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to list services: {}", error);
    }

    Ok(())
}

/// Execute a request against a service
pub async fn call(client: &ApiClient, service: &str, payload: &str) -> Result<()> {
    let payload = parse_payload(payload)?;

    let response = client
        .client
        .post(client.url(&format!("/api/v1/services/{}/requests", service)))
        .json(&payload)
        .send()
        .await?;

    if response.status().is_success() {
        let executed: ExecuteResponse = response.json().await?;
        println!("Request {} to '{}' succeeded", executed.request_id, executed.service);
        println!("{}", serde_json::to_string_pretty(&executed.result)?);
    } else {
        let status = response.status();
        let error = response.text().await?;
        eprintln!("Request failed ({}): {}", status, error);
    }

    Ok(())
}

/// Show system status
pub async fn status(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/status"))
        .send()
        .await?;

    if response.status().is_success() {
        let status: StatusResponse = response.json().await?;

        println!("orchlet v{}", status.version);
        println!();
        println!("Services: {}", status.services);
        println!("Instances: {}", status.instances);
        println!("Idle workers: {}", status.idle_workers);
        if status.shutting_down {
            println!("Shutting down");
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to get status: {}", error);
    }

    Ok(())
}

fn parse_payload(payload: &str) -> Result<Value> {
    serde_json::from_str(payload).with_context(|| format!("payload is not valid JSON: {}", payload))
}
