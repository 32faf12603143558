//! Registry - shared configuration for many dispatches
//!
//! Remembers the index of the last resource that answered so the next
//! dispatch starts there, and tracks live dispatches for lookup and cleanup.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use contracts::{ConfigPatch, DispatchStatus, RedundancyConfig};
use tracing::{debug, info, instrument};

use crate::attempt::PendingAttempt;
use crate::engine::{Dispatch, DispatchOwner, DoneCallback, QueryCallback, WeakDispatch};
use crate::error::{DispatchFailure, DispatcherError};
use crate::metrics::{MetricsSnapshot, RegistryMetrics};

struct Shared<R, P, T> {
    config: Mutex<RedundancyConfig<R>>,
    /// Weak so the registry never keeps a finished dispatch alive
    dispatches: Mutex<Vec<WeakDispatch<R, P, T>>>,
    metrics: RegistryMetrics,
}

impl<R, P, T> Shared<R, P, T> {
    fn config(&self) -> MutexGuard<'_, RedundancyConfig<R>> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatches(&self) -> MutexGuard<'_, Vec<WeakDispatch<R, P, T>>> {
        self.dispatches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R, P, T> Shared<R, P, T>
where
    R: Send + Sync + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    fn cleanup(&self) {
        self.dispatches()
            .retain(|entry| entry.upgrade().is_some_and(|dispatch| dispatch.is_pending()));
    }
}

impl<R, P, T> DispatchOwner for Shared<R, P, T>
where
    R: Send + Sync + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    fn attempt_issued(&self) {
        self.metrics.inc_attempts();
    }

    fn promote_index(&self, index: usize) {
        self.config().index = index;
        observability::record_start_index(index);
        debug!(index, "Start index moved to last successful resource");
    }

    fn dispatch_finished(&self, status: DispatchStatus) {
        self.metrics.record_finished(status);
        self.cleanup();
    }

    fn late_delivery(&self) {
        self.metrics.record_late_delivery();
    }
}

/// Creates dispatches sharing one configuration
pub struct Registry<R, P, T> {
    shared: Arc<Shared<R, P, T>>,
}

impl<R, P, T> Clone for Registry<R, P, T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R, P, T> Registry<R, P, T>
where
    R: Clone + Send + Sync + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    /// Create a registry
    ///
    /// # Errors
    /// - [`DispatcherError::EmptyResources`] if the resource list is empty
    pub fn new(config: RedundancyConfig<R>) -> Result<Self, DispatcherError> {
        if config.resources.is_empty() {
            return Err(DispatcherError::EmptyResources);
        }

        info!(
            resources = config.resources.len(),
            index = config.index,
            random = config.random,
            "Registry created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config: Mutex::new(config),
                dispatches: Mutex::new(Vec::new()),
                metrics: RegistryMetrics::new(),
            }),
        })
    }

    /// Start a dispatch against a snapshot of the current configuration
    ///
    /// Must be called inside a tokio runtime.
    pub fn dispatch(
        &self,
        payload: P,
        callback: impl Fn(&R, &Arc<P>, PendingAttempt<R, P, T>) + Send + Sync + 'static,
    ) -> Dispatch<R, P, T> {
        self.start(payload, Arc::new(callback), Vec::new())
    }

    /// [`dispatch`](Self::dispatch) with one completion subscriber
    pub fn dispatch_with(
        &self,
        payload: P,
        callback: impl Fn(&R, &Arc<P>, PendingAttempt<R, P, T>) + Send + Sync + 'static,
        on_complete: impl Fn(Result<&T, &DispatchFailure>, &Arc<P>, &Dispatch<R, P, T>)
            + Send
            + Sync
            + 'static,
    ) -> Dispatch<R, P, T> {
        let on_complete: DoneCallback<R, P, T> = Arc::new(on_complete);
        self.start(payload, Arc::new(callback), vec![on_complete])
    }

    #[instrument(name = "registry_dispatch", skip_all)]
    fn start(
        &self,
        payload: P,
        callback: QueryCallback<R, P, T>,
        subscribers: Vec<DoneCallback<R, P, T>>,
    ) -> Dispatch<R, P, T> {
        let config = self.shared.config().clone();
        let owner = Arc::downgrade(&self.shared);
        let owner: Weak<dyn DispatchOwner> = owner;
        let dispatch = Dispatch::spawn(
            config,
            Arc::new(payload),
            callback,
            subscribers,
            Some(owner),
        );

        self.shared.metrics.inc_dispatched();
        self.shared.dispatches().push(dispatch.downgrade());
        // The driver may already have finished on another worker
        if !dispatch.is_pending() {
            self.shared.cleanup();
        }
        dispatch
    }

    /// First tracked dispatch matching `predicate`
    pub fn find(&self, predicate: impl Fn(&Dispatch<R, P, T>) -> bool) -> Option<Dispatch<R, P, T>> {
        // Predicate runs without the list locked
        let live: Vec<_> = self
            .shared
            .dispatches()
            .iter()
            .filter_map(WeakDispatch::upgrade)
            .collect();
        live.into_iter().find(|dispatch| predicate(dispatch))
    }

    /// Drop every tracked dispatch that is no longer pending
    pub fn cleanup(&self) {
        self.shared.cleanup();
    }

    /// Number of tracked dispatches
    pub fn dispatches(&self) -> usize {
        self.shared.dispatches().len()
    }

    /// Start index for the next dispatch
    pub fn index(&self) -> usize {
        self.shared.config().index
    }

    pub fn set_index(&self, index: usize) {
        self.shared.config().index = index;
    }

    /// Merge a partial configuration; running dispatches are unaffected
    pub fn set_config(&self, patch: ConfigPatch<R>) {
        self.shared.config().apply(patch);
    }

    /// Copy of the current configuration
    pub fn config(&self) -> RedundancyConfig<R> {
        self.shared.config().clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}
