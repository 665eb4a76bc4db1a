//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! admission / resilience produce:
//!     → tracing events (grants, rejections, retries, circuit transitions)
//!     → metrics.rs (counters, gauges, histograms via the metrics facade)
//!
//! Host application consumes:
//!     → logging.rs (fmt subscriber with EnvFilter)
//!     → its own metrics recorder/exporter
//! ```
//!
//! # Design Decisions
//! - Structured fields, not formatted strings, for gate/breaker names
//! - Metrics are cheap no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
