//! Per-instance circuit breaker
//!
//! The breaker has two states. It opens when the failure count observed by
//! the health checker exceeds a threshold, and it closes only on a recorded
//! success. An open breaker stops blocking once its timeout has elapsed, even
//! though its state stays `Open` until the next success.

use orchlet_core::CircuitState;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker state machine for a single instance
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    /// Set while the circuit is open
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a closed breaker with no recorded failures
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// Close the circuit and forget previous failures
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
        self.opened_at = None;
    }

    /// Count one more failure, returning the new count
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    /// Open the circuit if failures exceed `threshold`.
    ///
    /// Every call past the threshold restarts the open window at `now`.
    /// Returns `true` only when this call moved the breaker from closed to open.
    pub fn trip_if_exceeded(&mut self, threshold: u32, now: Instant) -> bool {
        if self.consecutive_failures <= threshold {
            return false;
        }
        let was_closed = self.state == CircuitState::Closed;
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        was_closed
    }

    /// Whether traffic must currently be kept away from the instance
    pub fn blocks(&self, now: Instant, timeout: Duration) -> bool {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened_at)) => now.saturating_duration_since(opened_at) < timeout,
            _ => false,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
