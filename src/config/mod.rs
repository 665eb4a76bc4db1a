//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CoreConfig (validated, immutable)
//!     → Gate::from_config / RetryPolicy::from / BreakerSettings::from
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; components copy what they need
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{CircuitBreakerConfig, CoreConfig, GateConfig, ObservabilityConfig, RetryConfig};
pub use validation::{validate_config, ValidationError};
