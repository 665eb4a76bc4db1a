//! Circuit breaker: a causality boundary in front of admission.
//!
//! # States
//! - Closed: normal operation, work passes through
//! - Open: dependency assumed down, work is rejected before it runs
//! - Half-Open: a single probe tests whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures >= failure_threshold since the last reset
//! Open → Half-Open: reset_timeout elapsed since the last failure (on read)
//! Half-Open → Closed: success_threshold consecutive probe successes
//! Half-Open → Open: any probe failure
//! ```
//!
//! # Design Decisions
//! - Fail before the gate: the state check precedes any slot acquisition,
//!   so a rejected call never queues or consumes capacity
//! - Open → Half-Open is evaluated lazily on read; no timers
//! - One probe at a time; concurrent callers are rejected as Half-Open
//! - Errors the caller does not classify as failures pass through untouched
//! - Results from calls admitted before a transition are discarded

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Circuit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
        }
    }
}

/// Work was rejected without running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{breaker}' is {state} ({failures} failures)")]
pub struct CircuitOpenError {
    pub breaker: String,
    /// `Open`, or `HalfOpen` when a probe was already in flight.
    pub state: CircuitState,
    /// When an Open circuit will admit a probe. `None` while Half-Open,
    /// where the next attempt waits on the in-flight probe instead.
    pub next_attempt_at: Option<Instant>,
    pub failures: u32,
}

/// Result of running work through a breaker.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// True for rejections; these must not be retried.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }

    pub fn open_error(&self) -> Option<&CircuitOpenError> {
        match self {
            BreakerError::Open(error) => Some(error),
            BreakerError::Inner(_) => None,
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(error) => Some(error),
            BreakerError::Open(_) => None,
        }
    }
}

/// Observability snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerStats {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub last_failure_at: Option<Instant>,
    pub last_state_change: Instant,
    pub total_rejections: u64,
    pub probe_in_flight: bool,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure_at: Option<Instant>,
    last_state_change: Instant,
    total_rejections: u64,
    probe_in_flight: bool,
    /// Bumped on every transition; permits from an older generation are stale.
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Normal,
    Probe,
}

#[derive(Debug, Clone, Copy)]
struct Permit {
    kind: PermitKind,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    /// Error not classified as a failure, or work abandoned mid-flight.
    Ignored,
}

/// A named circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// # Panics
    /// Panics if either threshold is zero.
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        assert!(settings.failure_threshold > 0, "failure_threshold must be greater than zero");
        assert!(settings.success_threshold > 0, "success_threshold must be greater than zero");
        Self {
            name: name.into(),
            settings,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure_at: None,
                last_state_change: Instant::now(),
                total_rejections: 0,
                probe_in_flight: false,
                generation: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().expect("circuit breaker mutex poisoned")
    }

    /// Current state, moving Open to Half-Open if the reset timeout elapsed.
    pub fn state(&self) -> CircuitState {
        let mut state = self.lock();
        self.refresh(&mut state, Instant::now());
        state.state
    }

    pub fn stats(&self) -> BreakerStats {
        let mut state = self.lock();
        self.refresh(&mut state, Instant::now());
        BreakerStats {
            state: state.state,
            failures: state.failures,
            successes: state.successes,
            last_failure_at: state.last_failure_at,
            last_state_change: state.last_state_change,
            total_rejections: state.total_rejections,
            probe_in_flight: state.probe_in_flight,
        }
    }

    /// Administrative override for tests and operations.
    ///
    /// Forcing Open restarts the reset timeout from now.
    pub fn force_state(&self, target: CircuitState) {
        let now = Instant::now();
        let mut state = self.lock();
        tracing::warn!(
            breaker = %self.name,
            from = %state.state,
            to = %target,
            "Circuit state forced"
        );
        if target == CircuitState::Open {
            state.last_failure_at = Some(now);
        }
        self.transition(&mut state, target, now);
    }

    /// Run `work`, counting every error as a failure.
    pub async fn run<T, E, F, Fut>(&self, work: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_classified(work, |_| true).await
    }

    /// Run `work`; only errors for which `is_failure` returns true count
    /// toward tripping. Other errors neither trip nor reset the circuit.
    pub async fn run_classified<T, E, F, Fut, P>(&self, work: F, is_failure: P) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let permit = self.admit()?;
        let guard = PermitGuard {
            breaker: self,
            permit,
            settled: false,
        };

        let result = work().await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(error) if is_failure(error) => Outcome::Failure,
            Err(_) => Outcome::Ignored,
        };
        guard.finish(outcome);
        result.map_err(BreakerError::Inner)
    }

    fn admit(&self) -> Result<Permit, CircuitOpenError> {
        let now = Instant::now();
        let mut state = self.lock();
        self.refresh(&mut state, now);

        let current = state.state;
        let kind = match current {
            CircuitState::Closed => PermitKind::Normal,
            CircuitState::HalfOpen if !state.probe_in_flight => {
                state.probe_in_flight = true;
                tracing::debug!(breaker = %self.name, "Half-open probe admitted");
                PermitKind::Probe
            }
            rejected => {
                state.total_rejections += 1;
                let next_attempt_at = match rejected {
                    CircuitState::Open => state
                        .last_failure_at
                        .map(|failed_at| failed_at + self.settings.reset_timeout),
                    _ => None,
                };
                tracing::debug!(breaker = %self.name, state = %rejected, "Circuit rejected call");
                metrics::record_circuit_rejection(&self.name, rejected);
                return Err(CircuitOpenError {
                    breaker: self.name.clone(),
                    state: rejected,
                    next_attempt_at,
                    failures: state.failures,
                });
            }
        };
        Ok(Permit {
            kind,
            generation: state.generation,
        })
    }

    fn record(&self, permit: Permit, outcome: Outcome) {
        let now = Instant::now();
        let mut state = self.lock();
        if permit.generation != state.generation {
            return;
        }

        match (permit.kind, state.state) {
            (PermitKind::Normal, CircuitState::Closed) => match outcome {
                Outcome::Success => state.failures = 0,
                Outcome::Failure => {
                    state.failures += 1;
                    state.last_failure_at = Some(now);
                    if state.failures >= self.settings.failure_threshold {
                        self.transition(&mut state, CircuitState::Open, now);
                    }
                }
                Outcome::Ignored => {}
            },
            (PermitKind::Probe, CircuitState::HalfOpen) => {
                state.probe_in_flight = false;
                match outcome {
                    Outcome::Success => {
                        state.successes += 1;
                        if state.successes >= self.settings.success_threshold {
                            self.transition(&mut state, CircuitState::Closed, now);
                        }
                    }
                    Outcome::Failure => {
                        state.failures += 1;
                        state.last_failure_at = Some(now);
                        self.transition(&mut state, CircuitState::Open, now);
                    }
                    Outcome::Ignored => {}
                }
            }
            _ => {}
        }
    }

    fn refresh(&self, state: &mut BreakerState, now: Instant) {
        if state.state != CircuitState::Open {
            return;
        }
        let elapsed = state
            .last_failure_at
            .map_or(true, |failed_at| now.duration_since(failed_at) >= self.settings.reset_timeout);
        if elapsed {
            self.transition(state, CircuitState::HalfOpen, now);
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = state.state;
        state.state = to;
        state.last_state_change = now;
        state.generation += 1;
        state.successes = 0;
        state.probe_in_flight = false;
        if to == CircuitState::Closed {
            state.failures = 0;
        }
        tracing::info!(
            breaker = %self.name,
            from = %from,
            to = %to,
            failures = state.failures,
            "Circuit breaker state change"
        );
        metrics::record_circuit_transition(&self.name, to);
    }
}

/// Settles a permit exactly once; an abandoned probe frees the probe slot.
struct PermitGuard<'a> {
    breaker: &'a CircuitBreaker,
    permit: Permit,
    settled: bool,
}

impl PermitGuard<'_> {
    fn finish(mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.record(self.permit, outcome);
    }
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record(self.permit, Outcome::Ignored);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::poll;
    use std::pin::pin;

    fn breaker(failure_threshold: u32, success_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerSettings {
                failure_threshold,
                success_threshold,
                reset_timeout: Duration::from_millis(100),
            },
        )
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.run(|| async { Err("boom") }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.run(|| async { Ok(()) }).await
    }

    #[test]
    #[should_panic(expected = "failure_threshold")]
    fn test_zero_threshold_panics() {
        let _ = breaker(0, 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, 1);
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();
        succeed(&cb).await.unwrap();
        fail(&cb).await.unwrap_err();
        fail(&cb).await.unwrap_err();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().failures, 2);
    }

    #[tokio::test]
    async fn test_unclassified_errors_pass_through() {
        let cb = breaker(1, 1);
        let result = cb
            .run_classified(|| async { Err::<(), _>("not found") }, |error| *error == "unavailable")
            .await;

        assert!(matches!(result, Err(BreakerError::Inner("not found"))));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejection_reports_next_attempt() {
        let cb = breaker(1, 1);
        fail(&cb).await.unwrap_err();
        let tripped_at = cb.stats().last_failure_at.unwrap();

        let error = succeed(&cb).await.unwrap_err();
        let open = error.open_error().unwrap();
        assert_eq!(open.state, CircuitState::Open);
        assert_eq!(open.failures, 1);
        assert_eq!(open.next_attempt_at, Some(tripped_at + Duration::from_millis(100)));
        assert_eq!(cb.stats().total_rejections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens() {
        let cb = breaker(1, 1);
        fail(&cb).await.unwrap_err();
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        fail(&cb).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_threshold_needs_consecutive_probes() {
        let cb = breaker(1, 2);
        fail(&cb).await.unwrap_err();
        tokio::time::advance(Duration::from_millis(100)).await;

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_frees_probe_slot() {
        let cb = breaker(1, 1);
        fail(&cb).await.unwrap_err();
        tokio::time::advance(Duration::from_millis(100)).await;

        {
            let mut probe = pin!(cb.run(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, &str>(())
            }));
            assert!(poll!(probe.as_mut()).is_pending());
            assert!(cb.stats().probe_in_flight);
        }

        assert!(!cb.stats().probe_in_flight);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_state_overrides() {
        let cb = breaker(5, 1);
        cb.force_state(CircuitState::Open);
        assert!(succeed(&cb).await.unwrap_err().is_open());

        cb.force_state(CircuitState::Closed);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.stats().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_stale_result_after_forced_transition_is_ignored() {
        let cb = breaker(1, 1);
        let mut slow = pin!(cb.run(|| async {
            tokio::task::yield_now().await;
            Err::<(), _>("late")
        }));
        assert!(poll!(slow.as_mut()).is_pending());

        cb.force_state(CircuitState::Closed);
        slow.await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().failures, 0);
    }
}
