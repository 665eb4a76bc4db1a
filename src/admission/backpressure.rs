//! Backpressure-aware stream adapter.
//!
//! # Responsibilities
//! - Require a gate slot before every upstream pull
//! - Keep the slot for item k until the consumer asks for item k+1
//! - Release on every exit path: exhaustion, gate failure, close, drop
//!
//! # Design Decisions
//! - No buffering: at most one upstream item is in flight
//! - The final pull that reports exhaustion still costs one acquire, which
//!   is released immediately
//! - Single consumer: `Stream` takes `Pin<&mut Self>`, so overlapping pulls
//!   cannot be expressed

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::Stream;
use pin_project::pin_project;

use crate::admission::gate::{AcquireOptions, Gate, GateError};
use crate::admission::token::ReleaseToken;

enum Phase {
    /// Waiting for the consumer's next pull. Holds the previous item's slot.
    Idle,
    Acquiring(BoxFuture<'static, Result<ReleaseToken, GateError>>),
    Pulling,
    Done,
}

/// Stream returned by [`Gate::wrap`].
///
/// Yields `Ok(item)` for upstream items and `Err(GateError)` when a pull's
/// acquisition times out or is cancelled; the next poll tries again.
#[pin_project]
#[must_use = "streams do nothing unless polled"]
pub struct Backpressured<S> {
    #[pin]
    upstream: S,
    gate: Gate,
    options: AcquireOptions,
    held: Option<ReleaseToken>,
    phase: Phase,
}

impl<S> Backpressured<S> {
    pub(crate) fn new(gate: Gate, upstream: S, options: AcquireOptions) -> Self {
        Self {
            upstream,
            gate,
            options,
            held: None,
            phase: Phase::Idle,
        }
    }

    /// Stop iterating and give back any slot held for the last item, or
    /// abandon a pull still queued for one.
    ///
    /// `reason` is only logged. After `close`, the stream only yields `None`.
    /// Dropping the stream has the same effect on the slot.
    pub fn close(self: Pin<&mut Self>, reason: &str) {
        let this = self.project();
        if let Some(mut token) = this.held.take() {
            token.release();
        }
        *this.phase = Phase::Done;
        tracing::trace!(gate = %this.gate.name(), reason, "Backpressured stream closed");
    }

    /// Whether a slot is currently held on behalf of this stream.
    pub fn holds_slot(&self) -> bool {
        self.held.is_some()
    }
}

impl<S: Stream> Stream for Backpressured<S> {
    type Item = Result<S::Item, GateError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match this.phase {
                Phase::Idle => {
                    // Next pull releases the previous item's slot.
                    if let Some(mut token) = this.held.take() {
                        token.release();
                    }
                    let gate = this.gate.clone();
                    let options = this.options.clone();
                    *this.phase =
                        Phase::Acquiring(Box::pin(async move { gate.acquire(options).await }));
                }
                Phase::Acquiring(acquiring) => {
                    let acquired = match acquiring.as_mut().poll(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(acquired) => acquired,
                    };
                    match acquired {
                        Ok(token) => {
                            *this.held = Some(token);
                            *this.phase = Phase::Pulling;
                        }
                        Err(error) => {
                            *this.phase = Phase::Idle;
                            return Poll::Ready(Some(Err(error)));
                        }
                    }
                }
                Phase::Pulling => {
                    let pulled = match this.upstream.as_mut().poll_next(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(pulled) => pulled,
                    };
                    match pulled {
                        Some(item) => {
                            *this.phase = Phase::Idle;
                            return Poll::Ready(Some(Ok(item)));
                        }
                        None => {
                            if let Some(mut token) = this.held.take() {
                                token.release();
                            }
                            *this.phase = Phase::Done;
                            return Poll::Ready(None);
                        }
                    }
                }
                Phase::Done => return Poll::Ready(None),
            }
        }
    }
}
