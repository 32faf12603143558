//! Dispatch - per-request rotation state machine
//!
//! One driver task per dispatch issues attempts against resources in rotation.
//! Only one timer is armed at a time; it is raced against a wake-up signal so
//! finalization and fail-over can interrupt it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use contracts::{DispatchSnapshot, DispatchStatus, FailurePolicy, LoopLimit, RedundancyConfig};
use rand::Rng;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument, trace, warn};

use crate::attempt::{AttemptInner, PendingAttempt};
use crate::error::{AttemptError, DispatchFailure};

/// Smallest number of attempts kept pending before the oldest is evicted
const MIN_PENDING_BOUND: usize = 5;

static NEXT_DISPATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Per-resource callback: `(resource, payload, attempt)`
pub type QueryCallback<R, P, T> =
    Arc<dyn Fn(&R, &Arc<P>, PendingAttempt<R, P, T>) + Send + Sync>;

/// Completion subscriber: `(result, payload, dispatch)`
pub type DoneCallback<R, P, T> =
    Arc<dyn Fn(Result<&T, &DispatchFailure>, &Arc<P>, &Dispatch<R, P, T>) + Send + Sync>;

/// Whoever created the dispatch and wants to hear about it
pub(crate) trait DispatchOwner: Send + Sync {
    fn attempt_issued(&self);

    /// Remember `index` as the start index for future dispatches
    fn promote_index(&self, index: usize);

    fn dispatch_finished(&self, status: DispatchStatus);

    fn late_delivery(&self);
}

/// What the armed timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Query the next resource in the current loop
    Rotate(usize),
    /// Start a new loop at the start index
    NewLoop,
    /// Loop limit reached; fail when the grace delay ends
    Expire(u32),
}

enum Outcome<T> {
    Success {
        data: Option<T>,
        /// Index to remember in the owner
        winner: Option<usize>,
    },
    Failure(DispatchFailure),
}

struct State<R, P, T> {
    status: DispatchStatus,
    loop_number: u32,
    attempt: u64,
    index: usize,
    pending: VecDeque<Arc<AttemptInner>>,
    /// Attempts still allowed to deliver data after a timeout failure
    late: Vec<Arc<AttemptInner>>,
    subscribers: Vec<DoneCallback<R, P, T>>,
    /// Latest attempt failed under fail-over: skip the rotation delay
    skip_rotation: bool,
}

struct Core<R, P, T> {
    id: u64,
    /// Snapshot taken at creation
    config: RedundancyConfig<R>,
    payload: Arc<P>,
    callback: QueryCallback<R, P, T>,
    start_time: Instant,
    start_index: usize,
    max_index: usize,
    state: Mutex<State<R, P, T>>,
    wake: Notify,
    owner: Option<Weak<dyn DispatchOwner>>,
}

impl<R, P, T> Core<R, P, T> {
    fn lock(&self) -> MutexGuard<'_, State<R, P, T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn owner(&self) -> Option<Arc<dyn DispatchOwner>> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }

    fn pending_bound(&self) -> usize {
        (self.max_index * 2).max(MIN_PENDING_BOUND)
    }
}

/// Handle to one redundant dispatch
///
/// Cheap to clone. The dispatch keeps running while any handle or attempt
/// exists, or while it is still pending.
pub struct Dispatch<R, P, T> {
    core: Arc<Core<R, P, T>>,
}

impl<R, P, T> Clone for Dispatch<R, P, T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

/// Non-owning reference to a dispatch
pub(crate) struct WeakDispatch<R, P, T> {
    core: Weak<Core<R, P, T>>,
}

impl<R, P, T> WeakDispatch<R, P, T> {
    pub(crate) fn upgrade(&self) -> Option<Dispatch<R, P, T>> {
        self.core.upgrade().map(|core| Dispatch { core })
    }
}

impl<R, P, T> PartialEq for Dispatch<R, P, T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<R, P, T> Eq for Dispatch<R, P, T> {}

impl<R, P, T> fmt::Debug for Dispatch<R, P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.lock();
        f.debug_struct("Dispatch")
            .field("id", &self.core.id)
            .field("status", &state.status)
            .field("attempt", &state.attempt)
            .field("index", &state.index)
            .finish()
    }
}

/// Start a standalone dispatch with one completion subscriber
///
/// Must be called inside a tokio runtime. No callback runs before the
/// caller's next await point.
pub fn dispatch<R, P, T>(
    config: RedundancyConfig<R>,
    payload: P,
    callback: impl Fn(&R, &Arc<P>, PendingAttempt<R, P, T>) + Send + Sync + 'static,
    on_complete: impl Fn(Result<&T, &DispatchFailure>, &Arc<P>, &Dispatch<R, P, T>)
        + Send
        + Sync
        + 'static,
) -> Dispatch<R, P, T>
where
    R: Send + Sync + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    let on_complete: DoneCallback<R, P, T> = Arc::new(on_complete);
    Dispatch::spawn(
        config,
        Arc::new(payload),
        Arc::new(callback),
        vec![on_complete],
        None,
    )
}

impl<R, P, T> Dispatch<R, P, T>
where
    R: Send + Sync + 'static,
    P: Send + Sync + 'static,
    T: Send + 'static,
{
    /// Start a standalone dispatch
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: RedundancyConfig<R>,
        payload: P,
        callback: impl Fn(&R, &Arc<P>, PendingAttempt<R, P, T>) + Send + Sync + 'static,
    ) -> Self {
        Self::spawn(config, Arc::new(payload), Arc::new(callback), Vec::new(), None)
    }

    pub(crate) fn spawn(
        config: RedundancyConfig<R>,
        payload: Arc<P>,
        callback: QueryCallback<R, P, T>,
        subscribers: Vec<DoneCallback<R, P, T>>,
        owner: Option<Weak<dyn DispatchOwner>>,
    ) -> Self {
        let start_index = pick_start_index(&config);
        let max_index = config.max_index().unwrap_or(0);
        let id = NEXT_DISPATCH_ID.fetch_add(1, Ordering::Relaxed);

        let dispatch = Self {
            core: Arc::new(Core {
                id,
                config,
                payload,
                callback,
                start_time: Instant::now(),
                start_index,
                max_index,
                state: Mutex::new(State {
                    status: DispatchStatus::Pending,
                    loop_number: 0,
                    attempt: 0,
                    index: start_index,
                    pending: VecDeque::new(),
                    late: Vec::new(),
                    // Attached before the driver exists, so no outcome can slip past them
                    subscribers,
                    skip_rotation: false,
                }),
                wake: Notify::new(),
                owner,
            }),
        };

        debug!(dispatch_id = id, start_index, max_index, "Dispatch created");

        let driver = dispatch.clone();
        tokio::spawn(async move {
            driver.drive().await;
        });

        dispatch
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub(crate) fn downgrade(&self) -> WeakDispatch<R, P, T> {
        WeakDispatch {
            core: Arc::downgrade(&self.core),
        }
    }

    pub fn status(&self) -> DispatchStatus {
        self.core.lock().status
    }

    pub fn is_pending(&self) -> bool {
        self.status().is_pending()
    }

    pub fn payload(&self) -> &Arc<P> {
        &self.core.payload
    }

    pub fn start_index(&self) -> usize {
        self.core.start_index
    }

    pub fn start_time(&self) -> Instant {
        self.core.start_time
    }

    /// Current state of the dispatch
    pub fn snapshot(&self) -> DispatchSnapshot<P> {
        let core = &self.core;
        let state = core.lock();
        DispatchSnapshot {
            status: state.status,
            loop_number: state.loop_number,
            attempt: state.attempt,
            start_index: core.start_index,
            index: state.index,
            max_index: core.max_index,
            start_time: core.start_time,
            payload: Arc::clone(&core.payload),
            queries_sent: state.attempt,
            queries_pending: state.pending.len(),
        }
    }

    /// Add a completion subscriber, or replace all of them
    ///
    /// Ignored once the dispatch has ended.
    pub fn subscribe(
        &self,
        callback: impl Fn(Result<&T, &DispatchFailure>, &Arc<P>, &Dispatch<R, P, T>)
            + Send
            + Sync
            + 'static,
        replace: bool,
    ) {
        let mut state = self.core.lock();
        if !state.status.is_pending() {
            return;
        }
        if replace {
            state.subscribers.clear();
        }
        state.subscribers.push(Arc::new(callback));
    }

    /// Cancel the dispatch and every pending attempt
    ///
    /// Subscribers receive [`DispatchFailure::Cancelled`]. No-op once ended.
    pub fn cancel(&self) {
        if self.finalize(Outcome::Failure(DispatchFailure::Cancelled)) {
            info!(dispatch_id = self.core.id, "Dispatch cancelled");
        }
    }

    /// Complete the dispatch from outside any attempt
    pub fn complete(&self, data: T) {
        self.finalize(Outcome::Success {
            data: Some(data),
            winner: None,
        });
    }

    /// Complete the dispatch without data; no subscriber is notified
    pub fn finish(&self) {
        self.finalize(Outcome::Success {
            data: None,
            winner: None,
        });
    }

    #[instrument(name = "dispatch_driver", skip(self), fields(dispatch_id = self.core.id))]
    async fn drive(self) {
        // Callers attach subscribers before anything fires
        tokio::task::yield_now().await;

        if self.core.config.resources.is_empty() {
            self.finalize(Outcome::Failure(DispatchFailure::NoResources));
            return;
        }

        loop {
            if !self.issue_attempt() {
                return;
            }

            // Synchronous completions inside the callback land before the timer
            tokio::task::yield_now().await;

            let Some((step, delay)) = self.plan_next() else {
                return;
            };
            if !self.wait(step, delay).await {
                return;
            }
            if !self.advance(step) {
                return;
            }
        }
    }

    fn issue_attempt(&self) -> bool {
        let core = &self.core;
        let (attempt, evicted) = {
            let mut state = core.lock();
            if !state.status.is_pending() {
                return false;
            }

            state.attempt += 1;
            state.skip_rotation = false;
            let attempt = AttemptInner::new(state.attempt, state.index);
            state.pending.push_back(Arc::clone(&attempt));

            let evicted = if state.pending.len() > core.pending_bound() {
                state.pending.pop_front()
            } else {
                None
            };
            (attempt, evicted)
        };

        if let Some(evicted) = evicted {
            debug!(
                attempt = evicted.number(),
                index = evicted.index(),
                "Pending window full, cancelling oldest attempt"
            );
            if evicted.abort() {
                observability::record_attempt_cancelled();
            }
        }

        let index = attempt.index();
        let Some(resource) = core.config.resources.get(index) else {
            self.finalize(Outcome::Failure(DispatchFailure::NoResources));
            return false;
        };

        debug!(attempt = attempt.number(), index, "Sending query");
        observability::record_attempt_issued(index);
        if let Some(owner) = core.owner() {
            owner.attempt_issued();
        }

        (core.callback)(resource, &core.payload, PendingAttempt::new(attempt, self.clone()));
        true
    }

    /// Decide the next step and its delay; finalizes when there is none
    fn plan_next(&self) -> Option<(Step, Duration)> {
        let core = &self.core;
        let (index, loop_number) = {
            let state = core.lock();
            if !state.status.is_pending() {
                return None;
            }
            (state.index, state.loop_number)
        };

        // Delay callbacks run without the lock held
        let len = core.max_index + 1;
        let next_index = (index + 1) % len;
        let step = if core.max_index < 1 || next_index == core.start_index {
            let next_loop = loop_number + 1;
            let limit = core.config.limit.resolve(next_loop, core.start_time);
            if LoopLimit::is_reached(limit, next_loop) {
                Step::Expire(next_loop)
            } else {
                Step::NewLoop
            }
        } else {
            Step::Rotate(next_index)
        };

        let delay = match step {
            Step::Rotate(next) => {
                let queries_sent = (next + len - core.start_index) % len;
                core.config
                    .rotate
                    .resolve(queries_sent, loop_number, next, core.start_time)
            }
            Step::NewLoop | Step::Expire(_) => {
                core.config
                    .timeout
                    .resolve(loop_number + 1, core.start_index, core.start_time)
            }
        };

        if delay.is_zero() {
            let failure = match step {
                Step::Expire(loops) => DispatchFailure::LimitReached { loops },
                Step::Rotate(_) | Step::NewLoop => DispatchFailure::Halted,
            };
            debug!(?step, "Zero delay, no further attempts");
            self.finalize(Outcome::Failure(failure));
            return None;
        }

        trace!(?step, delay_ms = delay.as_millis() as u64, "Timer armed");
        Some((step, delay))
    }

    /// Sleep until the step is due. Returns false if the dispatch ended.
    async fn wait(&self, step: Step, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            {
                let mut state = self.core.lock();
                if !state.status.is_pending() {
                    return false;
                }
                let due_now = match step {
                    Step::Rotate(_) => std::mem::take(&mut state.skip_rotation),
                    Step::Expire(_) => state.pending.is_empty(),
                    Step::NewLoop => false,
                };
                if due_now {
                    trace!(?step, "Skipping remaining delay");
                    return true;
                }
            }

            tokio::select! {
                _ = sleep_until(deadline) => return true,
                _ = self.core.wake.notified() => {}
            }
        }
    }

    /// Apply a due step. Returns false if no further attempt follows.
    fn advance(&self, step: Step) -> bool {
        if let Step::Expire(loops) = step {
            self.finalize(Outcome::Failure(DispatchFailure::LimitReached { loops }));
            return false;
        }

        let mut state = self.core.lock();
        if !state.status.is_pending() {
            return false;
        }
        match step {
            Step::Rotate(next) => state.index = next,
            Step::NewLoop => {
                state.loop_number += 1;
                state.index = self.core.start_index;
            }
            Step::Expire(_) => {}
        }
        true
    }

    /// First caller wins; everything after is a no-op
    fn finalize(&self, outcome: Outcome<T>) -> bool {
        let core = &self.core;
        let (status, cancelled, subscribers, attempts) = {
            let mut state = core.lock();
            if !state.status.is_pending() {
                return false;
            }

            let status = match &outcome {
                Outcome::Success { .. } => DispatchStatus::Completed,
                Outcome::Failure(DispatchFailure::Cancelled) => DispatchStatus::Aborted,
                Outcome::Failure(_) => DispatchStatus::Failed,
            };
            state.status = status;

            let keep_late = core.config.data_after_timeout
                && matches!(&outcome, Outcome::Failure(failure) if failure.is_timeout());
            let pending: Vec<_> = state.pending.drain(..).collect();
            let cancelled = if keep_late {
                state.late = pending;
                Vec::new()
            } else {
                pending
            };

            (status, cancelled, state.subscribers.clone(), state.attempt)
        };

        // Stops the armed timer
        core.wake.notify_one();

        for attempt in &cancelled {
            if attempt.abort() {
                observability::record_attempt_cancelled();
            }
        }

        if let Some(owner) = core.owner() {
            if let Outcome::Success {
                winner: Some(index),
                ..
            } = &outcome
            {
                owner.promote_index(*index);
            }
            owner.dispatch_finished(status);
        }

        observability::record_dispatch_outcome(status, attempts);
        observability::record_dispatch_latency_ms(
            core.start_time.elapsed().as_secs_f64() * 1000.0,
        );

        match outcome {
            Outcome::Success {
                data: Some(data), ..
            } => {
                debug!(dispatch_id = core.id, attempts, "Dispatch completed");
                self.notify(&subscribers, Ok(&data));
            }
            Outcome::Success { data: None, .. } => {
                debug!(dispatch_id = core.id, attempts, "Dispatch completed without data");
            }
            Outcome::Failure(failure) => {
                if !matches!(failure, DispatchFailure::Cancelled) {
                    warn!(dispatch_id = core.id, attempts, error = %failure, "Dispatch failed");
                }
                self.notify(&subscribers, Err(&failure));
            }
        }
        true
    }

    fn notify(&self, subscribers: &[DoneCallback<R, P, T>], result: Result<&T, &DispatchFailure>) {
        for subscriber in subscribers {
            subscriber(result, &self.core.payload, self);
        }
    }

    pub(crate) fn complete_attempt(&self, attempt: &Arc<AttemptInner>, data: Option<T>) {
        if !attempt.mark_completed() {
            trace!(attempt = attempt.number(), "Ignoring result of finalized attempt");
            return;
        }

        let core = &self.core;
        let mut state = core.lock();
        let status = state.status;

        if status.is_pending() {
            detach(&mut state.pending, attempt);
            drop(state);

            let index = attempt.index();
            let winner = (!core.config.random && index != core.start_index).then_some(index);
            debug!(attempt = attempt.number(), index, "Attempt completed");
            self.finalize(Outcome::Success { data, winner });
            return;
        }

        let is_late = status == DispatchStatus::Failed && detach_late(&mut state.late, attempt);
        let Some(data) = data.filter(|_| is_late) else {
            trace!(attempt = attempt.number(), %status, "Ignoring result after dispatch ended");
            return;
        };

        state.status = DispatchStatus::Completed;
        let rest: Vec<_> = state.late.drain(..).collect();
        let subscribers = state.subscribers.clone();
        drop(state);

        for other in &rest {
            if other.abort() {
                observability::record_attempt_cancelled();
            }
        }
        if let Some(owner) = core.owner() {
            owner.late_delivery();
        }
        observability::record_late_delivery();

        info!(
            dispatch_id = core.id,
            attempt = attempt.number(),
            index = attempt.index(),
            "Late data delivered after timeout"
        );
        self.notify(&subscribers, Ok(&data));
    }

    pub(crate) fn fail_attempt(&self, attempt: &Arc<AttemptInner>, error: AttemptError) {
        if !attempt.mark_completed() {
            return;
        }

        let core = &self.core;
        let mut state = core.lock();
        if !state.status.is_pending() {
            detach_late(&mut state.late, attempt);
            return;
        }
        detach(&mut state.pending, attempt);

        match core.config.failure_policy {
            FailurePolicy::FailFast => {
                drop(state);
                debug!(attempt = attempt.number(), error = %error, "Attempt failed, failing fast");
                self.finalize(Outcome::Failure(DispatchFailure::Attempt(error)));
            }
            FailurePolicy::FailOver => {
                if attempt.number() == state.attempt {
                    state.skip_rotation = true;
                }
                drop(state);
                debug!(
                    attempt = attempt.number(),
                    index = attempt.index(),
                    error = %error,
                    "Attempt failed, rotating"
                );
                core.wake.notify_one();
            }
        }
    }
}

fn pick_start_index<R>(config: &RedundancyConfig<R>) -> usize {
    let len = config.resources.len();
    let index = if config.random && len > 1 {
        rand::rng().random_range(0..len)
    } else {
        config.index
    };
    index.min(len.saturating_sub(1))
}

fn detach(list: &mut VecDeque<Arc<AttemptInner>>, attempt: &Arc<AttemptInner>) {
    list.retain(|item| !Arc::ptr_eq(item, attempt));
}

fn detach_late(list: &mut Vec<Arc<AttemptInner>>, attempt: &Arc<AttemptInner>) -> bool {
    let before = list.len();
    list.retain(|item| !Arc::ptr_eq(item, attempt));
    list.len() != before
}
