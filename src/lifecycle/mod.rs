//! Lifecycle signals shared by every subsystem.
//!
//! # Data Flow
//! ```text
//! Caller owns a CancelSource
//!     → hands CancelSignal clones to Gate::acquire / Retrier::run
//!     → cancel() fires every observer, including ones created later
//! ```
//!
//! # Design Decisions
//! - Cancellation is observable, never polled: waiters select on it
//! - A pre-fired signal is indistinguishable from one that fires later,
//!   except that callers reject before queueing

pub mod cancel;

pub use cancel::{CancelSignal, CancelSource};
