//! `probe` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::ProbeArgs;
use crate::error::CliError;
use crate::probe::{self, ProbeRegistry, ProbeReport, ProbeStats};

/// Execute the `probe` command
pub async fn run_probe(args: &ProbeArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let settings = super::load_settings(&args.config)?;
    let mut config = settings.into_config();
    config.resources = probe::endpoints(&config.resources, args.port)?;
    let endpoints = config.resources.clone();

    info!(
        endpoints = endpoints.len(),
        index = config.index,
        random = config.random,
        policy = ?config.failure_policy,
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::install_prometheus(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let registry = ProbeRegistry::new(config).context("Failed to create registry")?;
    let connect_timeout = Duration::from_millis(args.connect_timeout_ms);
    let count = args.count.max(1);
    let mut stats = ProbeStats::new();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    for probe_number in 1..=count {
        let (dispatch, outcome) = probe::start(&registry, probe_number, connect_timeout);

        let outcome = tokio::select! {
            outcome = outcome => outcome.map_err(|_| CliError::ProbeLost { probe: probe_number })?,
            _ = &mut shutdown => {
                warn!("Received shutdown signal, cancelling probe");
                dispatch.cancel();
                break;
            }
        };

        let report = ProbeReport::new(probe_number, &dispatch, outcome);
        println!("{report}");
        stats.record(&report);

        if probe_number < count && args.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    stats.print_summary(&endpoints, registry.index(), registry.metrics());

    if stats.completed() == 0 {
        anyhow::bail!("No endpoint answered");
    }
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
