//! Bounded-concurrency execution core for async work.
//!
//! Admits, queues, cancels, times out, retries, and circuit-breaks units of
//! asynchronous work while carrying the caller's execution context across
//! every suspension point.
//!
//! Layering, outermost first:
//! ```text
//! CircuitBreaker::run → Retrier::run / retry_with_gate → Gate::acquire → work
//! Gate::wrap(stream)  → one slot per pulled item
//! ```

pub mod admission;
pub mod config;
pub mod context;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use admission::{AcquireOptions, Backpressured, Gate, GateError, GateStats, ReleaseToken};
pub use config::CoreConfig;
pub use context::{ContextAccessor, ContextCarrier, ContextError, TaskLocal, TraceContext, Untraced};
pub use lifecycle::{CancelSignal, CancelSource};
pub use resilience::{
    retry_with_gate, BreakerError, BreakerRegistry, CircuitBreaker, CircuitOpenError, CircuitState,
    Retrier, RetryError, RetryOptions, RetryPolicy,
};
