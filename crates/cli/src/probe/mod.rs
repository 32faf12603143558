//! TCP connect probes driven by a redundancy registry

mod stats;
mod target;

pub use stats::ProbeStats;
pub use target::endpoints;

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dispatcher::{AttemptError, Dispatch, DispatchStatus, PendingAttempt, Registry};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tracing::debug;

/// Endpoint that accepted the connection
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeHit {
    pub endpoint: String,
    pub index: usize,
    pub connect_ms: f64,
}

/// Registry over `host:port` endpoints; the payload is the probe number
pub type ProbeRegistry = Registry<String, u32, ProbeHit>;
pub type ProbeAttempt = PendingAttempt<String, u32, ProbeHit>;
pub type ProbeDispatch = Dispatch<String, u32, ProbeHit>;

/// Outcome of a probe, `Err` carries the failure reason
pub type ProbeOutcome = Result<ProbeHit, String>;

/// Per-resource callback: connect to the endpoint in a task the cancel hook aborts
pub fn connect_attempt(
    connect_timeout: Duration,
) -> impl Fn(&String, &Arc<u32>, ProbeAttempt) + Send + Sync + 'static {
    move |endpoint: &String, probe: &Arc<u32>, attempt: ProbeAttempt| {
        let endpoint = endpoint.clone();
        let probe = **probe;
        let pending = attempt.clone();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            match timeout(connect_timeout, TcpStream::connect(endpoint.as_str())).await {
                Ok(Ok(_stream)) => {
                    let connect_ms = started.elapsed().as_secs_f64() * 1000.0;
                    debug!(probe, endpoint = %endpoint, connect_ms, "Connected");
                    let hit = ProbeHit {
                        index: pending.index(),
                        endpoint,
                        connect_ms,
                    };
                    pending.complete(hit);
                }
                Ok(Err(err)) => {
                    debug!(probe, endpoint = %endpoint, error = %err, "Connect failed");
                    pending.fail(AttemptError::with_source(
                        format!("connect to {endpoint} failed"),
                        err,
                    ));
                }
                Err(_) => {
                    debug!(probe, endpoint = %endpoint, "Connect timed out");
                    pending.fail(format!("connect to {endpoint} timed out"));
                }
            }
        });

        abort_on_cancel(&attempt, task.abort_handle());
    }
}

/// Abort the connect task when the attempt is cancelled
///
/// Covers a dispatch that ended before the hook was registered.
fn abort_on_cancel(attempt: &ProbeAttempt, task: AbortHandle) {
    let hook = task.clone();
    attempt.set_cancel_hook(move || hook.abort());
    if !attempt.is_pending() {
        task.abort();
    }
}

/// Start one probe
///
/// The receiver yields the first outcome delivered to the dispatch.
pub fn start(
    registry: &ProbeRegistry,
    probe: u32,
    connect_timeout: Duration,
) -> (ProbeDispatch, oneshot::Receiver<ProbeOutcome>) {
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));

    let dispatch = registry.dispatch_with(
        probe,
        connect_attempt(connect_timeout),
        move |result, _, _| {
            let outcome = result.cloned().map_err(|failure| failure.to_string());
            if let Some(tx) = tx.lock().ok().and_then(|mut slot| slot.take()) {
                // Receiver gone means the run was interrupted
                let _ = tx.send(outcome);
            }
        },
    );
    (dispatch, rx)
}

/// One finished probe
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub probe: u32,
    pub status: DispatchStatus,
    pub attempts: u64,
    pub latency_ms: f64,
    pub outcome: ProbeOutcome,
}

impl ProbeReport {
    pub fn new(probe: u32, dispatch: &ProbeDispatch, outcome: ProbeOutcome) -> Self {
        let snapshot = dispatch.snapshot();
        Self {
            probe,
            status: snapshot.status,
            attempts: snapshot.attempt,
            latency_ms: snapshot.start_time.elapsed().as_secs_f64() * 1000.0,
            outcome,
        }
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(hit) => write!(
                f,
                "probe #{}: {} (#{}) after {} attempt(s), {:.1} ms",
                self.probe, hit.endpoint, hit.index, self.attempts, self.latency_ms
            ),
            Err(reason) => write!(
                f,
                "probe #{}: {} after {} attempt(s), {:.1} ms",
                self.probe, reason, self.attempts, self.latency_ms
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatcher::{LoopLimit, RedundancyConfig};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_refused_endpoint_fails_over_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = listener.local_addr().unwrap().to_string();

        // Long rotation delay: only the refused connect can move the probe on
        let config = RedundancyConfig::new(vec!["127.0.0.1:1".to_string(), live.clone()])
            .with_rotate(Duration::from_secs(30));
        let registry = ProbeRegistry::new(config).unwrap();

        let (dispatch, outcome) = start(&registry, 1, Duration::from_millis(500));
        let outcome = tokio::time::timeout(Duration::from_secs(5), outcome)
            .await
            .unwrap()
            .unwrap();

        let hit = outcome.unwrap();
        assert_eq!(hit.endpoint, live);
        assert_eq!(hit.index, 1);
        assert_eq!(registry.index(), 1);

        let report = ProbeReport::new(1, &dispatch, Ok(hit));
        assert_eq!(report.status, DispatchStatus::Completed);
        assert_eq!(report.attempts, 2);
        assert!(report.to_string().starts_with(&format!("probe #1: {live} (#1)")));
    }

    #[tokio::test]
    async fn test_connect_task_aborted_when_dispatch_ended_first() {
        let config = RedundancyConfig::new(vec!["127.0.0.1:1".to_string()]);
        let registry = ProbeRegistry::new(config).unwrap();

        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let dispatch = registry.dispatch(1, move |_: &String, _: &Arc<u32>, attempt: ProbeAttempt| {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(attempt);
            }
        });
        let attempt = rx.await.unwrap();

        // Dispatch ends between spawning the work and registering the hook
        dispatch.cancel();
        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(3600)));
        abort_on_cancel(&attempt, task.abort_handle());

        let joined = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap();
        assert!(joined.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_connect_task_kept_while_attempt_pending() {
        let config = RedundancyConfig::new(vec!["127.0.0.1:1".to_string()]);
        let registry = ProbeRegistry::new(config).unwrap();

        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let dispatch = registry.dispatch(1, move |_: &String, _: &Arc<u32>, attempt: ProbeAttempt| {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(attempt);
            }
        });
        let attempt = rx.await.unwrap();

        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(3600)));
        abort_on_cancel(&attempt, task.abort_handle());
        assert!(attempt.has_cancel_hook());
        assert!(!task.is_finished());

        dispatch.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap();
        assert!(joined.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_all_endpoints_refused() {
        let config = RedundancyConfig::new(vec!["127.0.0.1:1".to_string()])
            .with_limit(LoopLimit::Fixed(1));
        let registry = ProbeRegistry::new(config).unwrap();

        let (dispatch, outcome) = start(&registry, 7, Duration::from_millis(500));
        let outcome = tokio::time::timeout(Duration::from_secs(5), outcome)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.unwrap_err(), "loop limit reached after 1 loop(s)");
        assert_eq!(dispatch.status(), DispatchStatus::Failed);
    }
}
