//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → circuit_breaker.rs (reject at once if the circuit is open)
//!     → retries.rs (repeat with backoff, one derived context per attempt)
//!         → admission::Gate (optional: one slot held across all attempts)
//!     → circuit_breaker.rs (record success / qualifying failure)
//! ```
//!
//! # Design Decisions
//! - The breaker sits outside retries and admission: an open circuit never
//!   consumes a retry attempt or a gate slot
//! - Circuit-open rejections are terminal for a composed retrier
//!   (`RetryOptions::terminal_on_open_circuit`)
//! - Backoff delays are capped exponential with proportional jitter

pub mod backoff;
pub mod circuit_breaker;
pub mod registry;
pub mod retries;

pub use circuit_breaker::{
    BreakerError, BreakerSettings, BreakerStats, CircuitBreaker, CircuitOpenError, CircuitState,
};
pub use registry::BreakerRegistry;
pub use retries::{
    retry_with_gate, AbortPhase, Retrier, RetryContext, RetryError, RetryOptions, RetryPolicy,
};
