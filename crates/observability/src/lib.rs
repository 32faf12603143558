//! # Observability
//!
//! Tracing and Prometheus metrics for redundant dispatch.
//!
//! The dispatcher records attempts and outcomes through the helpers in
//! [`metrics`]; they are no-ops until a recorder is installed, so library users
//! pay nothing unless they call [`install_prometheus`].
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig::for_verbosity(1, false))?;
//! let dispatch = registry.dispatch(payload, callback);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_attempt_cancelled, record_attempt_issued, record_dispatch_latency_ms,
    record_dispatch_outcome, record_late_delivery, record_start_index, DispatchStatsAggregator,
    DispatchSummary, RunningStats, StatsSummary,
};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Prometheus listener port (None = no exporter)
    pub metrics_port: Option<u16>,
    /// Ignore `RUST_LOG` and always use `level`
    pub force_level: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            level: "info".to_string(),
            metrics_port: None,
            force_level: false,
        }
    }
}

impl ObservabilityConfig {
    /// Level from a `-v` count; `quiet` pins the filter to warnings
    pub fn for_verbosity(verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        Self {
            level: level.to_string(),
            force_level: quiet,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }

    fn filter(&self) -> EnvFilter {
        if self.force_level {
            return EnvFilter::new(&self.level);
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Install the global tracing subscriber, and the exporter if a port is set
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_prometheus(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        level = %config.level,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// Serve dispatch metrics on `0.0.0.0:port`
pub fn install_prometheus(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port, "Prometheus metrics endpoint initialized");
    Ok(())
}
