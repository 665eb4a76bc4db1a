//! Retry logic.
//!
//! # Responsibilities
//! - Repeat failed work up to `max_attempts` with exponential backoff + jitter
//! - Derive one child context per attempt from a single parent captured at
//!   schedule time
//! - Stop early on unretryable errors and on cancellation
//! - Hold one gate slot across every attempt when composed with a gate
//!
//! # Design Decisions
//! - The parent context is captured when `run` is called, before the returned
//!   future is ever polled
//! - Unretryable errors return at once: no further attempt, no sleep
//! - Cancellation is checked before each attempt and raced against backoff;
//!   a running attempt is never interrupted
//! - With a gate the slot is never released between attempts, so backing-off
//!   work keeps its FIFO position (and can delay queued work)

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::admission::{AcquireOptions, Gate, GateError};
use crate::config::RetryConfig;
use crate::context::accessor::{ContextAccessor, TaskLocal, Untraced};
use crate::context::carrier::replay;
use crate::context::trace::{trace_accessor, TraceContext};
use crate::lifecycle::CancelSignal;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::circuit_breaker::BreakerError;

/// Attempt schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of each delay to randomize by, in `[0, 1]`.
    pub jitter: f64,
}

impl RetryPolicy {
    /// Delay to sleep after failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay, self.max_delay, self.jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

/// Identity of one attempt, handed to the work and to context derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// 1-indexed attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    pub is_final: bool,
}

impl RetryContext {
    pub fn new(attempt: u32, max_attempts: u32) -> Self {
        Self {
            attempt,
            max_attempts,
            is_final: attempt >= max_attempts,
        }
    }
}

/// Where a retry sequence was when its cancellation signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortPhase {
    /// Between attempts, while sleeping.
    Backoff,
    /// Before the attempt could start.
    Execution,
}

impl fmt::Display for AbortPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortPhase::Backoff => write!(f, "backoff"),
            AbortPhase::Execution => write!(f, "execution"),
        }
    }
}

/// Why a retry sequence gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed.
    #[error("all {attempts} attempts failed; last error: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    /// The cancellation signal fired.
    #[error("retry cancelled during {phase} of attempt {attempt}")]
    Aborted { attempt: u32, phase: AbortPhase },

    /// The retry predicate rejected the error.
    #[error("attempt {attempt} failed with a non-retryable error: {error}")]
    NotRetryable { attempt: u32, error: E },

    /// The gate slot for the whole sequence could not be acquired.
    #[error(transparent)]
    Gate(#[from] GateError),
}

impl<E> RetryError<E> {
    /// The work's own error, if the sequence ended on one.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last_error, .. } => Some(last_error),
            RetryError::NotRetryable { error, .. } => Some(error),
            RetryError::Aborted { .. } | RetryError::Gate(_) => None,
        }
    }
}

type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Per-call retry options.
pub struct RetryOptions<E> {
    cancel: Option<CancelSignal>,
    retry_if: Option<RetryPredicate<E>>,
}

impl<E> RetryOptions<E> {
    pub fn new() -> Self {
        Self {
            cancel: None,
            retry_if: None,
        }
    }

    #[must_use]
    pub fn cancel_on(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Only retry errors for which `predicate` returns true.
    #[must_use]
    pub fn retry_if(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    pub fn cancel_signal(&self) -> Option<&CancelSignal> {
        self.cancel.as_ref()
    }

    fn should_retry(&self, error: &E) -> bool {
        self.retry_if.as_ref().map_or(true, |predicate| predicate(error))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled)
    }

    /// Sleep for `delay`, or return `false` if cancelled first.
    async fn backoff(&self, delay: Duration) -> bool {
        match &self.cancel {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            },
            None => {
                tokio::time::sleep(delay).await;
                true
            }
        }
    }
}

impl<E: 'static> RetryOptions<BreakerError<E>> {
    /// Never retry a circuit-open rejection; other errors keep the existing
    /// predicate.
    #[must_use]
    pub fn terminal_on_open_circuit(mut self) -> Self {
        let inner = self.retry_if.take();
        self.retry_if = Some(Arc::new(move |error: &BreakerError<E>| {
            !error.is_open() && inner.as_ref().map_or(true, |predicate| predicate(error))
        }));
        self
    }
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            cancel: self.cancel.clone(),
            retry_if: self.retry_if.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("cancel", &self.cancel)
            .field("retry_if", &self.retry_if.is_some())
            .finish()
    }
}

type DeriveFn<V> = Arc<dyn Fn(&V, &RetryContext) -> V + Send + Sync>;

/// Runs work under a [`RetryPolicy`], one derived context per attempt.
pub struct Retrier<A: ContextAccessor = Untraced> {
    policy: RetryPolicy,
    accessor: A,
    derive: DeriveFn<A::Value>,
}

impl Retrier<Untraced> {
    /// A retrier that propagates no context.
    ///
    /// # Panics
    /// Panics if the policy is invalid (see [`Retrier::with_context`]).
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_context(policy, Untraced, |_, _| ())
    }
}

impl Retrier<TaskLocal<TraceContext>> {
    /// A retrier that runs each attempt under a child span of the caller's
    /// [`TraceContext`].
    pub fn traced(policy: RetryPolicy) -> Self {
        Self::with_context(policy, trace_accessor(), TraceContext::for_attempt)
    }
}

impl<A: ContextAccessor> Retrier<A> {
    /// A retrier that captures `accessor`'s value at schedule time and runs
    /// attempt `n` under `derive(parent, n)`.
    ///
    /// # Panics
    /// Panics if `max_attempts` is zero or `jitter` is outside `[0, 1]`.
    pub fn with_context(
        policy: RetryPolicy,
        accessor: A,
        derive: impl Fn(&A::Value, &RetryContext) -> A::Value + Send + Sync + 'static,
    ) -> Self {
        assert!(policy.max_attempts > 0, "retry policy needs at least one attempt");
        assert!(
            (0.0..=1.0).contains(&policy.jitter),
            "retry jitter must be within [0, 1]"
        );
        Self {
            policy,
            accessor,
            derive: Arc::new(derive),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `work` until it succeeds, the policy is exhausted, the error is
    /// unretryable, or `options`' signal fires.
    ///
    /// The parent context is read here, synchronously; awaiting the returned
    /// future later (after queueing, say) does not change what attempts see.
    pub fn run<'a, T, E, F, Fut>(
        &'a self,
        work: F,
        options: RetryOptions<E>,
    ) -> impl Future<Output = Result<T, RetryError<E>>> + 'a
    where
        F: FnMut(RetryContext) -> Fut + 'a,
        Fut: Future<Output = Result<T, E>> + 'a,
        T: 'a,
        E: 'a,
    {
        let parent = self.accessor.current();
        self.attempt_all(parent, work, options)
    }

    async fn attempt_all<T, E, F, Fut>(
        &self,
        parent: Option<A::Value>,
        mut work: F,
        options: RetryOptions<E>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(RetryContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            if options.is_cancelled() {
                tracing::debug!(attempt, "Retry cancelled before attempt");
                metrics::record_retry_attempt("aborted");
                return Err(RetryError::Aborted {
                    attempt,
                    phase: AbortPhase::Execution,
                });
            }

            let retry = RetryContext::new(attempt, max_attempts);
            let child = parent.as_ref().map(|parent| (self.derive)(parent, &retry));
            let error = match replay(&self.accessor, child, work(retry)).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "Retry succeeded");
                    }
                    metrics::record_retry_attempt("success");
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !options.should_retry(&error) {
                tracing::debug!(attempt, "Error is not retryable");
                metrics::record_retry_attempt("not_retryable");
                return Err(RetryError::NotRetryable { attempt, error });
            }

            if retry.is_final {
                tracing::warn!(attempts = attempt, "Retry attempts exhausted");
                metrics::record_retry_attempt("exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            metrics::record_retry_attempt("retry");
            let delay = self.policy.delay_for(attempt);
            tracing::debug!(attempt, delay = ?delay, "Attempt failed, backing off");
            if !options.backoff(delay).await {
                tracing::debug!(attempt, "Retry cancelled during backoff");
                metrics::record_retry_attempt("aborted");
                return Err(RetryError::Aborted {
                    attempt,
                    phase: AbortPhase::Backoff,
                });
            }
        }
    }
}

impl<A: ContextAccessor + fmt::Debug> fmt::Debug for Retrier<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .field("accessor", &self.accessor)
            .finish_non_exhaustive()
    }
}

/// Run `work` under `retrier` while holding exactly one `gate` slot.
///
/// The slot is acquired once before the first attempt and released once after
/// the sequence ends, however it ends. If `acquire` has no cancellation signal
/// of its own, the retry signal also cancels the wait for the slot.
///
/// When the retry signal fires before the slot is granted, the result is
/// `RetryError::Aborted` in the `Execution` phase of attempt 1, the same as a
/// retry cancelled before its first attempt. A slot timeout, or a separate
/// `acquire` signal, surfaces as `RetryError::Gate`.
pub fn retry_with_gate<'a, A, T, E, F, Fut>(
    retrier: &'a Retrier<A>,
    gate: &'a Gate,
    work: F,
    options: RetryOptions<E>,
    mut acquire: AcquireOptions,
) -> impl Future<Output = Result<T, RetryError<E>>> + 'a
where
    A: ContextAccessor,
    F: FnMut(RetryContext) -> Fut + 'a,
    Fut: Future<Output = Result<T, E>> + 'a,
    T: 'a,
    E: 'a,
{
    let inherits_signal = acquire.cancel.is_none() && options.cancel_signal().is_some();
    if inherits_signal {
        acquire.cancel = options.cancel_signal().cloned();
    }
    // Context is captured now, before any time is spent queueing for the slot.
    let attempts = retrier.run(work, options);
    async move {
        let mut slot = match gate.acquire(acquire).await {
            Ok(slot) => slot,
            Err(GateError::Aborted) if inherits_signal => {
                tracing::debug!(gate = %gate.name(), "Retry cancelled while waiting for a gate slot");
                metrics::record_retry_attempt("aborted");
                return Err(RetryError::Aborted {
                    attempt: 1,
                    phase: AbortPhase::Execution,
                });
            }
            Err(error) => return Err(error.into()),
        };
        let result = attempts.await;
        slot.release();
        result
    }
}
