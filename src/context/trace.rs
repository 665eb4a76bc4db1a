//! Trace identity carried across queueing and retries.

use uuid::Uuid;

use crate::context::accessor::TaskLocal;
use crate::resilience::retries::RetryContext;

tokio::task_local! {
    /// Trace identity of the task currently executing, if one was installed.
    pub static CURRENT_TRACE: TraceContext;
}

/// A trace/span pair in the W3C sense: `trace_id` is shared by everything
/// caused by one request, `span_id` identifies one unit of work within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    /// Retry attempt this span executes, for spans derived by a retrier.
    pub attempt: Option<u32>,
}

impl TraceContext {
    /// Start a new trace.
    pub fn root() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            attempt: None,
        }
    }

    /// A new span in the same trace, parented on this one.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            attempt: None,
        }
    }

    /// The span one retry attempt runs under.
    pub fn for_attempt(&self, retry: &RetryContext) -> Self {
        Self {
            attempt: Some(retry.attempt),
            ..self.child()
        }
    }

    /// The trace installed on the current task, if any.
    pub fn current() -> Option<Self> {
        CURRENT_TRACE.try_with(Clone::clone).ok()
    }
}

/// Accessor for [`CURRENT_TRACE`].
pub fn trace_accessor() -> TaskLocal<TraceContext> {
    TaskLocal::new(&CURRENT_TRACE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_span_keeps_trace_and_links_parent() {
        let root = TraceContext::root();
        let retry = RetryContext::new(2, 3);
        let span = root.for_attempt(&retry);

        assert_eq!(span.trace_id, root.trace_id);
        assert_ne!(span.span_id, root.span_id);
        assert_eq!(span.parent_span_id, Some(root.span_id));
        assert_eq!(span.attempt, Some(2));
    }

    #[tokio::test]
    async fn test_current_reads_installed_trace() {
        assert!(TraceContext::current().is_none());
        let root = TraceContext::root();
        let seen = CURRENT_TRACE.scope(root.clone(), async { TraceContext::current() }).await;
        assert_eq!(seen, Some(root));
    }
}
