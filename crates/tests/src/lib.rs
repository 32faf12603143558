//! # Integration Tests
//!
//! Cross-crate tests.
//!
//! Covers:
//! - Settings file to runtime configuration
//! - Registry scenarios over simulated backends (paused clock)
//! - Run statistics over dispatch outcomes

#[cfg(test)]
mod contract_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ConfigPatch, FailurePolicy, LoopLimit, RedundancyConfig};
    use tokio::time::Instant;

    #[test]
    fn test_settings_become_config() {
        let settings = ConfigLoader::load_from_str(
            r#"
resources = ["a:1", "b:1"]
timeout_ms = 40
rotate_ms = 10
limit = 0
data_after_timeout = true
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let config = settings.into_config();
        let now = Instant::now();
        assert_eq!(config.max_index(), Some(1));
        assert_eq!(config.timeout.resolve(1, 0, now), Duration::from_millis(40));
        assert_eq!(config.rotate.resolve(1, 0, 1, now), Duration::from_millis(10));
        assert_eq!(config.limit.resolve(1, now), 0);
        assert!(config.data_after_timeout);
        assert_eq!(config.failure_policy, FailurePolicy::FailOver);
    }

    #[test]
    fn test_patch_merges_into_config() {
        let mut config = RedundancyConfig::new(vec!["a", "b"]);
        config.apply(ConfigPatch {
            limit: Some(LoopLimit::Fixed(5)),
            failure_policy: Some(FailurePolicy::FailFast),
            ..ConfigPatch::default()
        });

        assert_eq!(config.limit.resolve(1, Instant::now()), 5);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.resources, vec!["a", "b"]);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use config_loader::ConfigLoader;
    use dispatcher::{DispatchStatus, PendingAttempt, Registry};
    use observability::DispatchStatsAggregator;
    use tokio::time::{sleep, Instant};

    /// How a simulated backend reacts to a query
    #[derive(Debug, Clone, Copy)]
    enum Backend {
        /// Answers with its name after the delay
        Answer(u64),
        /// Reports failure after the delay
        Fail(u64),
        /// Never answers
        Silent,
    }

    type Attempt = PendingAttempt<String, u32, String>;

    /// Backends keyed by resource name, shared with the callback
    fn simulate(
        backends: HashMap<&'static str, Backend>,
        cancelled: Arc<Mutex<Vec<String>>>,
    ) -> impl Fn(&String, &Arc<u32>, Attempt) + Send + Sync + 'static {
        move |resource: &String, _: &Arc<u32>, attempt: Attempt| {
            let name = resource.clone();
            let cancelled = Arc::clone(&cancelled);
            let hook_name = name.clone();
            attempt.set_cancel_hook(move || cancelled.lock().unwrap().push(hook_name));

            match backends.get(name.as_str()).copied().unwrap_or(Backend::Silent) {
                Backend::Answer(delay) => {
                    tokio::spawn(async move {
                        sleep(Duration::from_millis(delay)).await;
                        attempt.complete(name);
                    });
                }
                Backend::Fail(delay) => {
                    tokio::spawn(async move {
                        sleep(Duration::from_millis(delay)).await;
                        attempt.fail(format!("{name} unavailable"));
                    });
                }
                Backend::Silent => {}
            }
        }
    }

    fn registry_from_file(content: &str) -> (tempfile::NamedTempFile, Registry<String, u32, String>) {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let settings = ConfigLoader::load_from_path(file.path()).unwrap();
        let registry = Registry::new(settings.into_config()).unwrap();
        (file, registry)
    }

    type Outcomes = Arc<Mutex<Vec<(u64, Result<String, String>)>>>;

    fn record_into(
        outcomes: &Outcomes,
    ) -> impl Fn(
        Result<&String, &dispatcher::DispatchFailure>,
        &Arc<u32>,
        &dispatcher::Dispatch<String, u32, String>,
    ) + Send
           + Sync
           + 'static {
        let outcomes = Arc::clone(outcomes);
        move |result: Result<&String, &dispatcher::DispatchFailure>,
              _: &Arc<u32>,
              dispatch: &dispatcher::Dispatch<String, u32, String>| {
            let at = dispatch.start_time().elapsed().as_millis() as u64;
            let result = result.cloned().map_err(|failure| failure.to_string());
            outcomes.lock().unwrap().push((at, result));
        }
    }

    /// Slow primary, fast backup: rotation reaches the backup, the next
    /// dispatch starts there directly
    #[tokio::test(start_paused = true)]
    async fn test_failover_then_sticky_backup() {
        let (_file, registry) = registry_from_file(
            r#"
resources = ["primary", "backup"]
rotate_ms = 100
timeout_ms = 1000
"#,
        );
        let cancelled: Arc<Mutex<Vec<String>>> = Arc::default();
        let backends = HashMap::from([
            ("primary", Backend::Silent),
            ("backup", Backend::Answer(20)),
        ]);
        let outcomes: Outcomes = Arc::default();

        registry.dispatch_with(
            1,
            simulate(backends.clone(), Arc::clone(&cancelled)),
            record_into(&outcomes),
        );
        sleep(Duration::from_millis(500)).await;

        assert_eq!(
            *outcomes.lock().unwrap(),
            vec![(120, Ok("backup".to_string()))]
        );
        assert_eq!(registry.index(), 1);
        assert_eq!(*cancelled.lock().unwrap(), vec!["primary".to_string()]);

        let second = registry.dispatch_with(2, simulate(backends, cancelled), record_into(&outcomes));
        sleep(Duration::from_millis(500)).await;

        assert_eq!(second.start_index(), 1);
        assert_eq!(second.snapshot().attempt, 1);
        assert_eq!(outcomes.lock().unwrap()[1], (20, Ok("backup".to_string())));
    }

    /// Fail-over policy: an explicit failure moves on without waiting
    #[tokio::test(start_paused = true)]
    async fn test_failures_rotate_immediately() {
        let (_file, registry) = registry_from_file(
            r#"
resources = ["a", "b", "c"]
rotate_ms = 1000
timeout_ms = 1000
"#,
        );
        let backends = HashMap::from([
            ("a", Backend::Fail(5)),
            ("b", Backend::Fail(5)),
            ("c", Backend::Answer(5)),
        ]);
        let outcomes: Outcomes = Arc::default();

        let dispatch = registry.dispatch_with(
            1,
            simulate(backends, Arc::default()),
            record_into(&outcomes),
        );
        sleep(Duration::from_millis(100)).await;

        assert_eq!(*outcomes.lock().unwrap(), vec![(15, Ok("c".to_string()))]);
        assert_eq!(dispatch.snapshot().attempt, 3);
        assert_eq!(registry.index(), 2);
    }

    /// Fail-fast policy: the first explicit failure ends the dispatch
    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_from_file() {
        let (_file, registry) = registry_from_file(
            r#"
resources = ["a", "b"]
rotate_ms = 1000
failure_policy = "fail_fast"
"#,
        );
        let backends = HashMap::from([("a", Backend::Fail(5)), ("b", Backend::Answer(1))]);
        let outcomes: Outcomes = Arc::default();

        let dispatch = registry.dispatch_with(
            1,
            simulate(backends, Arc::default()),
            record_into(&outcomes),
        );
        sleep(Duration::from_millis(100)).await;

        assert_eq!(
            *outcomes.lock().unwrap(),
            vec![(5, Err("attempt failed: a unavailable".to_string()))]
        );
        assert_eq!(dispatch.status(), DispatchStatus::Failed);
        assert_eq!(registry.index(), 0);
    }

    /// Late data: a slow answer after exhaustion still completes the dispatch
    #[tokio::test(start_paused = true)]
    async fn test_late_answer_after_exhaustion() {
        let (_file, registry) = registry_from_file(
            r#"
resources = ["slow"]
timeout_ms = 50
limit = 1
data_after_timeout = true
"#,
        );
        let backends = HashMap::from([("slow", Backend::Answer(80))]);
        let outcomes: Outcomes = Arc::default();

        let dispatch = registry.dispatch_with(
            1,
            simulate(backends, Arc::default()),
            record_into(&outcomes),
        );
        sleep(Duration::from_millis(200)).await;

        assert_eq!(
            *outcomes.lock().unwrap(),
            vec![
                (50, Err("loop limit reached after 1 loop(s)".to_string())),
                (80, Ok("slow".to_string())),
            ]
        );
        assert_eq!(dispatch.status(), DispatchStatus::Completed);

        let metrics = registry.metrics();
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.late_deliveries, 1);
    }

    /// Many dispatches folded into run statistics
    #[tokio::test(start_paused = true)]
    async fn test_run_statistics() {
        let (_file, registry) = registry_from_file(
            r#"
resources = ["a", "b"]
rotate_ms = 10
timeout_ms = 10
limit = 1
"#,
        );
        let backends = HashMap::from([("a", Backend::Silent), ("b", Backend::Answer(5))]);
        let stats = Arc::new(Mutex::new(DispatchStatsAggregator::new()));
        let started = Instant::now();

        for probe in 0..4 {
            let stats = Arc::clone(&stats);
            let dispatch = registry.dispatch(probe, simulate(backends.clone(), Arc::default()));
            dispatch.subscribe(
                move |result, _, dispatch| {
                    let snapshot = dispatch.snapshot();
                    let latency = snapshot.start_time.elapsed().as_secs_f64() * 1000.0;
                    let winner = result.ok().map(|_| snapshot.index);
                    stats
                        .lock()
                        .unwrap()
                        .update(snapshot.status, snapshot.attempt, latency, winner);
                },
                false,
            );
            sleep(Duration::from_millis(100)).await;
        }

        let summary = stats.lock().unwrap().summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.completed, 4);
        assert_eq!(summary.winners.get(&1), Some(&4));
        // First dispatch rotates, the rest start at the backup
        assert_eq!(summary.attempts.max, 2.0);
        assert_eq!(summary.attempts.min, 1.0);
        assert!(started.elapsed() >= Duration::from_millis(400));
        assert_eq!(registry.dispatches(), 0);
    }
}
