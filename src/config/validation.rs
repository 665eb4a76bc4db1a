//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity > 0, thresholds > 0, jitter in [0, 1])
//! - Check cross-field consistency (base delay not above max delay)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CoreConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted; constructors still panic on the same
//!   violations when handed unvalidated values

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::CoreConfig;

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("gate.capacity must be greater than zero")]
    ZeroCapacity,

    #[error("gate.name must not be empty")]
    EmptyGateName,

    #[error("gate.acquire_timeout_ms must be greater than zero when set")]
    ZeroAcquireTimeout,

    #[error("retry.max_attempts must be greater than zero")]
    ZeroMaxAttempts,

    #[error("retry.base_delay_ms ({base}) exceeds retry.max_delay_ms ({max})")]
    BaseDelayAboveMax { base: u64, max: u64 },

    #[error("retry.jitter must be within [0, 1], got {0}")]
    JitterOutOfRange(f64),

    #[error("circuit_breaker.{0} must be greater than zero")]
    ZeroThreshold(&'static str),

    #[error("observability.log_level '{0}' is not a valid filter")]
    InvalidLogLevel(String),
}

/// Check `config`, collecting every violation.
pub fn validate_config(config: &CoreConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.gate.capacity == 0 {
        errors.push(ValidationError::ZeroCapacity);
    }
    if config.gate.name.trim().is_empty() {
        errors.push(ValidationError::EmptyGateName);
    }
    if config.gate.acquire_timeout_ms == Some(0) {
        errors.push(ValidationError::ZeroAcquireTimeout);
    }

    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::ZeroMaxAttempts);
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::BaseDelayAboveMax {
            base: retry.base_delay_ms,
            max: retry.max_delay_ms,
        });
    }
    if !(0.0..=1.0).contains(&retry.jitter) {
        errors.push(ValidationError::JitterOutOfRange(retry.jitter));
    }

    let breaker = &config.circuit_breaker;
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::ZeroThreshold("failure_threshold"));
    }
    if breaker.success_threshold == 0 {
        errors.push(ValidationError::ZeroThreshold("success_threshold"));
    }

    let level = &config.observability.log_level;
    if EnvFilter::try_new(level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
