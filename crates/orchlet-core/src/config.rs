//! Configuration types for orchlet

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{InstanceSpec, OrchletError, OrchletResult};

/// Main orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Health checking configuration
    pub health: HealthConfig,
    /// Circuit breaker configuration
    pub breaker: CircuitBreakerConfig,
    /// Request dispatch configuration
    pub dispatch: DispatchConfig,
    /// Strategy used for every newly created service group
    pub lb_strategy: LoadBalanceStrategy,
    /// HTTP transport used by the default executor and prober
    pub transport: TransportConfig,
    /// API server configuration
    pub api: ApiConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Instances registered at startup
    pub instances: Vec<InstanceConfig>,
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> OrchletResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchletError::Config(format!("Failed to read config file: {}", e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> OrchletResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> OrchletResult<()> {
        if self.health.interval_secs == 0 {
            return Err(OrchletError::Config(
                "health.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.dispatch.max_retry_attempts == 0 {
            return Err(OrchletError::Config(
                "dispatch.max_retry_attempts must be greater than zero".to_string(),
            ));
        }
        if self.dispatch.worker_pool_size == 0 {
            return Err(OrchletError::Config(
                "dispatch.worker_pool_size must be greater than zero".to_string(),
            ));
        }
        if self.dispatch.base_backoff_ms == 0 {
            return Err(OrchletError::Config(
                "dispatch.base_backoff_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Health checking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between health check cycles
    pub interval_secs: u64,
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// The circuit opens once consecutive failures exceed this value
    pub failure_threshold: u32,
    /// How long an open circuit keeps an instance out of rotation
    pub timeout_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_ms: 30_000,
        }
    }
}

/// Request dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Execution attempts allowed per request
    pub max_retry_attempts: u32,
    /// Backoff unit; the wait after failed attempt n is `base * 2^n`
    pub base_backoff_ms: u64,
    /// Number of requests dispatched concurrently
    pub worker_pool_size: usize,
}

impl DispatchConfig {
    /// Backoff to wait after the given (1-based) failed attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            base_backoff_ms: 100,
            worker_pool_size: 20,
        }
    }
}

/// Load balancing strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalanceStrategy {
    /// Round-robin load balancing
    #[default]
    RoundRobin,
    /// Least connections load balancing
    LeastConnections,
    /// Random load balancing
    Random,
}

/// HTTP transport configuration for the default executor and prober
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Path requests are posted to
    pub request_path: String,
    /// Path probed for health
    pub probe_path: String,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Probe timeout in seconds
    pub probe_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_path: "/".to_string(),
            probe_path: "/health".to_string(),
            request_timeout_secs: 30,
            probe_timeout_secs: 5,
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind the REST API server
    pub address: String,
    /// Port for the REST API server
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Statically configured instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub service: String,
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl From<&InstanceConfig> for InstanceSpec {
    fn from(cfg: &InstanceConfig) -> Self {
        InstanceSpec::new(&cfg.service, &cfg.id, &cfg.host, cfg.port)
    }
}
