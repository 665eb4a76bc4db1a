//! Schedule-time context capture with single-shot replay.
//!
//! # Responsibilities
//! - Snapshot the ambient context when work is *scheduled*
//! - Install that snapshot while the work *executes*, then restore
//! - Refuse a second run
//!
//! # Design Decisions
//! - The snapshot is owned by the carrier and handed to the accessor
//!   explicitly; no global "current" slot is consulted at run time
//! - No snapshot means nothing is installed, not an empty value

use std::future::Future;

use thiserror::Error;

use crate::context::accessor::ContextAccessor;

/// Errors from running a [`ContextCarrier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context carrier has already run")]
    AlreadyRun,
}

/// Work bound to the context that was active when it was scheduled.
pub struct ContextCarrier<A: ContextAccessor, F> {
    accessor: A,
    snapshot: Option<A::Value>,
    work: Option<F>,
}

impl<A, F, Fut> ContextCarrier<A, F>
where
    A: ContextAccessor,
    F: FnOnce() -> Fut,
    Fut: Future,
{
    /// Capture the accessor's current value now.
    pub fn capture(accessor: A, work: F) -> Self {
        let snapshot = accessor.current();
        Self::with_snapshot(accessor, snapshot, work)
    }

    /// Bind `work` to an explicit snapshot instead of the current value.
    pub fn with_snapshot(accessor: A, snapshot: Option<A::Value>, work: F) -> Self {
        Self {
            accessor,
            snapshot,
            work: Some(work),
        }
    }

    pub fn snapshot(&self) -> Option<&A::Value> {
        self.snapshot.as_ref()
    }

    pub fn has_run(&self) -> bool {
        self.work.is_none()
    }

    /// Execute the work with the captured snapshot installed.
    pub async fn run(&mut self) -> Result<Fut::Output, ContextError> {
        let work = self.work.take().ok_or(ContextError::AlreadyRun)?;
        let snapshot = self.snapshot.take();
        Ok(replay(&self.accessor, snapshot, work()).await)
    }
}

/// Poll `work` under `snapshot` if there is one, otherwise as-is.
pub(crate) async fn replay<A, Fut>(accessor: &A, snapshot: Option<A::Value>, work: Fut) -> Fut::Output
where
    A: ContextAccessor,
    Fut: Future,
{
    match snapshot {
        Some(value) => accessor.scope(value, work).await,
        None => work.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::accessor::{TaskLocal, Untraced};

    tokio::task_local! {
        static TENANT: &'static str;
    }

    #[tokio::test]
    async fn test_replays_schedule_time_value() {
        let accessor = TaskLocal::new(&TENANT);
        let mut carrier = TENANT.sync_scope("scheduled", || {
            ContextCarrier::capture(accessor, || async { TENANT.try_with(|t| *t).ok() })
        });
        assert_eq!(carrier.snapshot(), Some(&"scheduled"));

        let seen = TENANT
            .scope("executing", async { carrier.run().await })
            .await
            .unwrap();
        assert_eq!(seen, Some("scheduled"));
    }

    #[tokio::test]
    async fn test_restores_prior_value_after_run() {
        let accessor = TaskLocal::new(&TENANT);
        let mut carrier = TENANT.sync_scope("scheduled", || {
            ContextCarrier::capture(accessor, || async {})
        });

        let after = TENANT
            .scope("outer", async {
                carrier.run().await.unwrap();
                TENANT.get()
            })
            .await;
        assert_eq!(after, "outer");
    }

    #[tokio::test]
    async fn test_no_context_installs_nothing() {
        let accessor = TaskLocal::new(&TENANT);
        let mut carrier =
            ContextCarrier::capture(accessor, || async { TENANT.try_with(|t| *t).ok() });
        assert!(carrier.snapshot().is_none());

        let seen = TENANT
            .scope("executing", async { carrier.run().await })
            .await
            .unwrap();
        assert_eq!(seen, Some("executing"));
    }

    #[tokio::test]
    async fn test_second_run_fails() {
        let mut carrier = ContextCarrier::capture(Untraced, || async { 1 });
        assert_eq!(carrier.run().await, Ok(1));
        assert!(carrier.has_run());
        assert_eq!(carrier.run().await, Err(ContextError::AlreadyRun));
    }
}
