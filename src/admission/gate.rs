//! Bounded admission gate with a strict FIFO wait list.
//!
//! # Responsibilities
//! - Admit at most `capacity` concurrent holders
//! - Queue everyone else in arrival order
//! - Reject waiters on timeout or cancellation without touching `running`
//!
//! # Design Decisions
//! - Fast path only when nobody is queued, so newcomers never overtake waiters
//! - A released slot is handed straight to the head waiter under the same lock
//! - Timeout, cancellation and grant race through one settle step; the node
//!   state decides the winner, and a grant that landed first always wins

use std::future::pending;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::Stream;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};

use crate::admission::backpressure::Backpressured;
use crate::admission::token::ReleaseToken;
use crate::admission::wait_queue::{NodeState, WaitQueue};
use crate::config::GateConfig;
use crate::lifecycle::CancelSignal;
use crate::observability::metrics;

/// Errors returned while waiting for a gate slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The waiter was not admitted within its timeout.
    #[error("no gate slot became free within {0:?}")]
    Timeout(Duration),

    /// The waiter's cancellation signal fired before it was admitted.
    #[error("gate acquisition was cancelled")]
    Aborted,
}

/// Per-acquisition options.
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Give up if no slot is granted within this duration.
    pub timeout: Option<Duration>,
    /// Give up when this signal fires.
    pub cancel: Option<CancelSignal>,
}

impl AcquireOptions {
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cancel_on(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }
}

/// Point-in-time view of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStats {
    pub capacity: usize,
    pub running: usize,
    pub waiting: usize,
    pub total_acquired: u64,
    pub total_released: u64,
    pub total_timeouts: u64,
    pub total_cancelled: u64,
}

#[derive(Debug)]
struct GateState {
    running: usize,
    queue: WaitQueue,
    total_acquired: u64,
    total_released: u64,
    total_timeouts: u64,
    total_cancelled: u64,
}

#[derive(Debug)]
pub(crate) struct GateInner {
    name: String,
    capacity: usize,
    state: Mutex<GateState>,
}

impl GateInner {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().expect("gate state mutex poisoned")
    }

    /// Give one slot back and pass it to the next waiter, if any.
    pub(crate) fn release_slot(&self) {
        let mut state = self.lock();
        state.running -= 1;
        state.total_released += 1;
        self.dispatch(&mut state);
        metrics::set_gate_running(&self.name, state.running);
    }

    fn dispatch(&self, state: &mut GateState) {
        while state.running < self.capacity {
            let Some(grant) = state.queue.grant_front() else {
                break;
            };
            state.running += 1;
            state.total_acquired += 1;
            // A closed receiver means the acquirer is being dropped; its
            // waiter guard sees the granted node and hands the slot on.
            let _ = grant.send(());
            tracing::trace!(
                gate = %self.name,
                running = state.running,
                waiting = state.queue.len(),
                "Slot handed to queued waiter"
            );
        }
    }
}

/// A capacity-bounded admission gate.
///
/// Cloning a `Gate` yields another handle to the same slots.
#[derive(Debug, Clone)]
pub struct Gate {
    inner: Arc<GateInner>,
}

impl Gate {
    /// Create a gate admitting at most `capacity` concurrent holders.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_name("default", capacity)
    }

    /// Create a named gate; the name labels logs and metrics.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_name(name: impl Into<String>, capacity: usize) -> Self {
        assert!(capacity > 0, "gate capacity must be greater than zero");
        Self {
            inner: Arc::new(GateInner {
                name: name.into(),
                capacity,
                state: Mutex::new(GateState {
                    running: 0,
                    queue: WaitQueue::new(),
                    total_acquired: 0,
                    total_released: 0,
                    total_timeouts: 0,
                    total_cancelled: 0,
                }),
            }),
        }
    }

    /// Build a gate from validated configuration.
    pub fn from_config(config: &GateConfig) -> Self {
        Self::with_name(config.name.clone(), config.capacity)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn stats(&self) -> GateStats {
        let state = self.inner.lock();
        GateStats {
            capacity: self.inner.capacity,
            running: state.running,
            waiting: state.queue.len(),
            total_acquired: state.total_acquired,
            total_released: state.total_released,
            total_timeouts: state.total_timeouts,
            total_cancelled: state.total_cancelled,
        }
    }

    /// Wait for a slot.
    ///
    /// A cancellation signal that has already fired rejects immediately,
    /// without queueing, even if a slot is free.
    pub async fn acquire(&self, options: AcquireOptions) -> Result<ReleaseToken, GateError> {
        if options.cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
            self.inner.lock().total_cancelled += 1;
            metrics::record_gate_rejection(&self.inner.name, "cancelled");
            return Err(GateError::Aborted);
        }

        let started = Instant::now();
        let (grant_tx, grant_rx) = oneshot::channel();
        let key = {
            let mut state = self.inner.lock();
            if state.running < self.inner.capacity && state.queue.is_empty() {
                state.running += 1;
                state.total_acquired += 1;
                metrics::set_gate_running(&self.inner.name, state.running);
                metrics::record_admission(&self.inner.name, Duration::ZERO);
                return Ok(ReleaseToken::new(self.inner.clone()));
            }
            let key = state.queue.push_back(grant_tx);
            tracing::debug!(
                gate = %self.inner.name,
                running = state.running,
                waiting = state.queue.len(),
                "Gate full, waiter queued"
            );
            key
        };

        let mut waiter = Waiter {
            gate: &self.inner,
            key,
            claimed: false,
        };

        let timer = async {
            match options.timeout {
                Some(timeout) => sleep(timeout).await,
                None => pending::<()>().await,
            }
        };
        let cancelled = async {
            match &options.cancel {
                Some(signal) => signal.cancelled().await,
                None => pending::<()>().await,
            }
        };

        let rejection = tokio::select! {
            biased;
            _ = grant_rx => None,
            _ = timer => Some(GateError::Timeout(options.timeout.unwrap_or_default())),
            _ = cancelled => Some(GateError::Aborted),
        };

        let result = waiter.settle(rejection);
        match &result {
            Ok(_) => metrics::record_admission(&self.inner.name, started.elapsed()),
            Err(GateError::Timeout(timeout)) => {
                tracing::debug!(gate = %self.inner.name, ?timeout, "Gate waiter timed out");
                metrics::record_gate_rejection(&self.inner.name, "timeout");
            }
            Err(GateError::Aborted) => {
                tracing::debug!(gate = %self.inner.name, "Gate waiter cancelled");
                metrics::record_gate_rejection(&self.inner.name, "cancelled");
            }
        }
        result
    }

    /// Run `work` while holding a slot.
    ///
    /// The slot is released on every exit path: normal return, an error
    /// inside `work`'s output, a panic, or the returned future being dropped.
    pub async fn run<F, Fut>(&self, work: F, options: AcquireOptions) -> Result<Fut::Output, GateError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future,
    {
        let mut token = self.acquire(options).await?;
        let output = work().await;
        token.release();
        Ok(output)
    }

    /// Throttle a stream so each pull needs a slot. See [`Backpressured`].
    pub fn wrap<S: Stream>(&self, upstream: S) -> Backpressured<S> {
        self.wrap_with(upstream, AcquireOptions::default())
    }

    /// Like [`wrap`](Self::wrap), applying `options` to every pull's acquisition.
    pub fn wrap_with<S: Stream>(&self, upstream: S, options: AcquireOptions) -> Backpressured<S> {
        Backpressured::new(self.clone(), upstream, options)
    }
}

/// Owns a queued node for the lifetime of one `acquire` call.
struct Waiter<'a> {
    gate: &'a Arc<GateInner>,
    key: usize,
    claimed: bool,
}

impl Waiter<'_> {
    /// Resolve the node exactly once. A grant that already landed beats a
    /// timer or signal that fired in the same turn.
    fn settle(&mut self, rejection: Option<GateError>) -> Result<ReleaseToken, GateError> {
        let mut state = self.gate.lock();
        if state.queue.state(self.key) == Some(NodeState::Granted) {
            self.claimed = true;
            return Ok(ReleaseToken::new(self.gate.clone()));
        }

        // The grant sender is only dropped once the node is granted, so a
        // queued node always arrives here with a rejection.
        let error = rejection.unwrap_or(GateError::Aborted);
        let outcome = match error {
            GateError::Timeout(_) => {
                state.total_timeouts += 1;
                NodeState::TimedOut
            }
            GateError::Aborted => {
                state.total_cancelled += 1;
                NodeState::Cancelled
            }
        };
        state.queue.reject(self.key, outcome);
        Err(error)
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        let settled = state.queue.remove(self.key);
        if settled == Some(NodeState::Granted) && !self.claimed {
            // Granted while the acquiring future was being dropped.
            state.running -= 1;
            state.total_released += 1;
            self.gate.dispatch(&mut state);
        }
    }
}
