//! Admission subsystem.
//!
//! # Data Flow
//! ```text
//! acquire(options)
//!     → gate.rs (fast path if a slot is free and nobody waits)
//!     → wait_queue.rs (otherwise enqueue at tail, suspend on a oneshot)
//!     → settle: granted | timed out | cancelled, exactly once
//!     → token.rs (ReleaseToken, released explicitly or on drop)
//!
//! release
//!     → running -= 1
//!     → head waiter granted under the same lock (running += 1)
//!
//! Gate::wrap(stream)
//!     → backpressure.rs (one slot per pull, released by the next pull)
//! ```
//!
//! # Design Decisions
//! - Strict FIFO among queued waiters; no priorities, no barging
//! - Rejected waiters never touch `running`
//! - Double release is a bug and panics

pub mod backpressure;
pub mod gate;
pub mod token;
mod wait_queue;

pub use backpressure::Backpressured;
pub use gate::{AcquireOptions, Gate, GateError, GateStats};
pub use token::ReleaseToken;
