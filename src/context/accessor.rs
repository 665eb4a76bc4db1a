//! Ambient-context accessors.

use std::future::Future;

use tokio::task::futures::TaskLocalFuture;
use tokio::task::LocalKey;

/// Reads the caller's ambient context and installs a value around a future.
///
/// Implementations only describe *where* context lives. Capturing and
/// replaying it is done by [`ContextCarrier`](crate::context::ContextCarrier)
/// with the snapshot passed explicitly.
pub trait ContextAccessor: Clone {
    type Value: Clone;
    type Scoped<F: Future>: Future<Output = F::Output>;

    /// The value active right now, if any.
    fn current(&self) -> Option<Self::Value>;

    /// Poll `work` with `value` installed, restoring the prior state between polls
    /// and after completion.
    fn scope<F: Future>(&self, value: Self::Value, work: F) -> Self::Scoped<F>;
}

/// Accessor over a tokio `task_local!` key.
#[derive(Debug)]
pub struct TaskLocal<T: 'static> {
    key: &'static LocalKey<T>,
}

impl<T: 'static> TaskLocal<T> {
    pub const fn new(key: &'static LocalKey<T>) -> Self {
        Self { key }
    }
}

impl<T: 'static> Clone for TaskLocal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for TaskLocal<T> {}

impl<T: Clone + 'static> ContextAccessor for TaskLocal<T> {
    type Value = T;
    type Scoped<F: Future> = TaskLocalFuture<T, F>;

    fn current(&self) -> Option<T> {
        self.key.try_with(T::clone).ok()
    }

    fn scope<F: Future>(&self, value: T, work: F) -> TaskLocalFuture<T, F> {
        self.key.scope(value, work)
    }
}

/// Accessor for callers with no ambient context.
#[derive(Debug, Clone, Copy, Default)]
pub struct Untraced;

impl ContextAccessor for Untraced {
    type Value = ();
    type Scoped<F: Future> = F;

    fn current(&self) -> Option<()> {
        None
    }

    fn scope<F: Future>(&self, _value: (), work: F) -> F {
        work
    }
}
