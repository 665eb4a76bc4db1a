//! Context propagation subsystem.
//!
//! # Data Flow
//! ```text
//! schedule time:  accessor.current() → snapshot (owned by the carrier)
//!     ... queueing, backoff, I/O waits ...
//! execution time: accessor.scope(snapshot, work) → prior context restored
//! ```
//!
//! # Design Decisions
//! - Capture once, replay once: the schedule/execution split is explicit
//! - Accessors are pluggable; tokio task-locals are the stock backend
//! - `TraceContext` is the ready-made identity retries derive from

pub mod accessor;
pub mod carrier;
pub mod trace;

pub use accessor::{ContextAccessor, TaskLocal, Untraced};
pub use carrier::{ContextCarrier, ContextError};
pub use trace::{trace_accessor, TraceContext, CURRENT_TRACE};
