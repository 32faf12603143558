//! PendingAttempt - caller-facing handle for one query against one resource

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{AttemptStatus, DispatchSnapshot};
use tracing::trace;

use crate::engine::Dispatch;
use crate::error::AttemptError;

/// Hook run once when the dispatch no longer wants an attempt's result
pub type CancelHook = Box<dyn FnOnce() + Send>;

/// Attempt state owned by the engine's pending list
pub(crate) struct AttemptInner {
    number: u64,
    index: usize,
    state: Mutex<AttemptState>,
}

struct AttemptState {
    status: AttemptStatus,
    cancel_hook: Option<CancelHook>,
}

impl AttemptInner {
    pub(crate) fn new(number: u64, index: usize) -> Arc<Self> {
        Arc::new(Self {
            number,
            index,
            state: Mutex::new(AttemptState {
                status: AttemptStatus::Pending,
                cancel_hook: None,
            }),
        })
    }

    pub(crate) fn number(&self) -> u64 {
        self.number
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    fn lock(&self) -> MutexGuard<'_, AttemptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self) -> AttemptStatus {
        self.lock().status
    }

    /// Pending -> completed. Returns false if the attempt was already finalized.
    pub(crate) fn mark_completed(&self) -> bool {
        let mut state = self.lock();
        if state.status != AttemptStatus::Pending {
            return false;
        }
        state.status = AttemptStatus::Completed;
        state.cancel_hook = None;
        true
    }

    /// Pending -> aborted, then run the cancel hook (outside the lock).
    pub(crate) fn abort(&self) -> bool {
        let hook = {
            let mut state = self.lock();
            if state.status != AttemptStatus::Pending {
                return false;
            }
            state.status = AttemptStatus::Aborted;
            state.cancel_hook.take()
        };

        trace!(attempt = self.number, index = self.index, "Attempt aborted");
        if let Some(hook) = hook {
            hook();
        }
        true
    }

    fn set_cancel_hook(&self, hook: Option<CancelHook>) {
        let mut state = self.lock();
        // Finalized attempts never run a hook
        if state.status == AttemptStatus::Pending {
            state.cancel_hook = hook;
        }
    }

    fn has_cancel_hook(&self) -> bool {
        self.lock().cancel_hook.is_some()
    }
}

/// Handle passed to the per-resource callback
///
/// Exactly one of [`complete`](Self::complete), [`finish`](Self::finish) or
/// [`fail`](Self::fail) takes effect; later calls, and calls after the attempt
/// was cancelled, are ignored.
pub struct PendingAttempt<R, P, T> {
    inner: Arc<AttemptInner>,
    dispatch: Dispatch<R, P, T>,
}

impl<R, P, T> Clone for PendingAttempt<R, P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            dispatch: self.dispatch.clone(),
        }
    }
}

impl<R, P, T> PendingAttempt<R, P, T>
where
    R: Send + Sync + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    pub(crate) fn new(inner: Arc<AttemptInner>, dispatch: Dispatch<R, P, T>) -> Self {
        Self { inner, dispatch }
    }

    /// Attempt number, 1 for the first attempt of a dispatch
    pub fn number(&self) -> u64 {
        self.inner.number()
    }

    /// Index of the queried resource
    pub fn index(&self) -> usize {
        self.inner.index()
    }

    pub fn status(&self) -> AttemptStatus {
        self.inner.status()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == AttemptStatus::Pending
    }

    /// Register the hook run if this attempt is superseded or the dispatch ends
    ///
    /// Replaces any previous hook. Ignored once the attempt is finalized.
    pub fn set_cancel_hook(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner.set_cancel_hook(Some(Box::new(hook)));
    }

    pub fn clear_cancel_hook(&self) {
        self.inner.set_cancel_hook(None);
    }

    pub fn has_cancel_hook(&self) -> bool {
        self.inner.has_cancel_hook()
    }

    /// Report success with data
    pub fn complete(&self, data: T) {
        self.dispatch.complete_attempt(&self.inner, Some(data));
    }

    /// Report success without data
    ///
    /// Completes the dispatch but notifies no subscriber.
    pub fn finish(&self) {
        self.dispatch.complete_attempt(&self.inner, None);
    }

    /// Report failure of this attempt
    pub fn fail(&self, error: impl Into<AttemptError>) {
        self.dispatch.fail_attempt(&self.inner, error.into());
    }

    /// The owning dispatch
    pub fn dispatch(&self) -> &Dispatch<R, P, T> {
        &self.dispatch
    }

    /// Current state of the owning dispatch
    pub fn snapshot(&self) -> DispatchSnapshot<P> {
        self.dispatch.snapshot()
    }
}

impl<R, P, T> fmt::Debug for PendingAttempt<R, P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAttempt")
            .field("number", &self.inner.number)
            .field("index", &self.inner.index)
            .field("status", &self.inner.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_abort_runs_hook_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let attempt = AttemptInner::new(1, 0);

        let counter = Arc::clone(&calls);
        attempt.set_cancel_hook(Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(attempt.abort());
        assert!(!attempt.abort());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(attempt.status(), AttemptStatus::Aborted);
    }

    #[test]
    fn test_abort_without_hook_still_aborts() {
        let attempt = AttemptInner::new(3, 2);
        assert!(attempt.abort());
        assert_eq!(attempt.status(), AttemptStatus::Aborted);
        assert!(!attempt.mark_completed());
    }

    #[test]
    fn test_completed_attempt_ignores_abort_and_hooks() {
        let calls = Arc::new(AtomicU32::new(0));
        let attempt = AttemptInner::new(1, 0);
        assert!(attempt.mark_completed());
        assert!(!attempt.mark_completed());

        let counter = Arc::clone(&calls);
        attempt.set_cancel_hook(Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        assert!(!attempt.has_cancel_hook());
        assert!(!attempt.abort());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(attempt.status(), AttemptStatus::Completed);
    }
}
