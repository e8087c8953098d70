//! Error types for orchlet

use thiserror::Error;

/// Main error type for orchlet
#[derive(Error, Debug)]
pub enum OrchletError {
    /// No instance is able to take the request
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A single execution attempt against one instance failed
    #[error("Attempt {attempt} against instance {instance_id} failed: {reason}")]
    AttemptFailed {
        instance_id: String,
        attempt: u32,
        reason: String,
    },

    /// Every allowed execution attempt failed
    #[error("Request to {service} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        service: String,
        attempts: u32,
        #[source]
        last_error: Box<OrchletError>,
    },

    /// A health probe raised an error or reported the instance unhealthy
    #[error("Health probe failed: {0}")]
    ProbeFailed(String),

    /// The backoff sleep between attempts was cut short by shutdown
    #[error("Interrupted during backoff: {0}")]
    InterruptedDuringBackoff(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchletError {
    /// Whether this error is one the caller of a request is meant to see.
    ///
    /// Attempt and probe failures are absorbed by the retry loop and the
    /// health checker; only the terminal outcomes escape.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            OrchletError::ServiceUnavailable(_)
                | OrchletError::RetriesExhausted { .. }
                | OrchletError::InterruptedDuringBackoff(_)
        )
    }
}

/// Result type for orchlet operations
pub type OrchletResult<T> = Result<T, OrchletError>;

impl From<serde_json::Error> for OrchletError {
    fn from(err: serde_json::Error) -> Self {
        OrchletError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for OrchletError {
    fn from(err: toml::de::Error) -> Self {
        OrchletError::Config(format!("Failed to parse config: {}", err))
    }
}
