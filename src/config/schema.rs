//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section defaults, so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::admission::AcquireOptions;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// Admission gate settings.
    pub gate: GateConfig,

    /// Retry schedule.
    pub retry: RetryConfig,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Admission gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Gate identifier for logging/metrics.
    pub name: String,

    /// Maximum concurrently admitted work units.
    pub capacity: usize,

    /// Default patience for a queued acquisition, in milliseconds.
    /// `None` waits indefinitely.
    pub acquire_timeout_ms: Option<u64>,
}

impl GateConfig {
    /// Acquisition options carrying the configured timeout.
    pub fn acquire_options(&self) -> AcquireOptions {
        let options = AcquireOptions::default();
        match self.acquire_timeout_ms {
            Some(ms) => options.timeout(Duration::from_millis(ms)),
            None => options,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            capacity: 10,
            acquire_timeout_ms: None,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Fraction of each delay to randomize by (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            jitter: 0.1,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Qualifying failures that open a closed circuit.
    pub failure_threshold: u32,

    /// Consecutive probe successes that close a half-open circuit.
    pub success_threshold: u32,

    /// Time after the last failure before a probe is allowed, in milliseconds.
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            reset_timeout_ms: 30_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
