//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Failover - redundant dispatch over interchangeable endpoints
#[derive(Parser, Debug)]
#[command(
    name = "failover",
    author,
    version,
    about = "Redundant dispatch over interchangeable endpoints",
    long_about = "Queries a list of interchangeable endpoints one after another.\n\n\
                  Rotates to the next endpoint when one is slow to answer, sweeps the \n\
                  list again until a loop limit, and remembers which endpoint answered last."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FAILOVER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "FAILOVER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe the configured endpoints with TCP connects
    Probe(ProbeArgs),

    /// Validate configuration file
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `probe` command
#[derive(Parser, Debug, Clone)]
pub struct ProbeArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "failover.toml",
        env = "FAILOVER_CONFIG"
    )]
    pub config: PathBuf,

    /// Port for resources given without one
    #[arg(long, env = "FAILOVER_PORT")]
    pub port: Option<u16>,

    /// Timeout of a single TCP connect in milliseconds
    #[arg(long, default_value = "1000", env = "FAILOVER_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,

    /// Number of probes to run one after another
    #[arg(long, default_value = "1", env = "FAILOVER_PROBE_COUNT")]
    pub count: u32,

    /// Pause between probes in milliseconds
    #[arg(long, default_value = "0")]
    pub interval_ms: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FAILOVER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "failover.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "failover.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_args() {
        let cli = Cli::parse_from([
            "failover",
            "-v",
            "probe",
            "--config",
            "endpoints.toml",
            "--port",
            "53",
            "--count",
            "3",
        ]);

        assert_eq!(cli.verbose, 1);
        let Commands::Probe(args) = cli.command else {
            panic!("expected probe command");
        };
        assert_eq!(args.config, PathBuf::from("endpoints.toml"));
        assert_eq!(args.port, Some(53));
        assert_eq!(args.count, 3);
        assert_eq!(args.connect_timeout_ms, 1000);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["failover", "-q", "-v", "info"]);
        assert!(result.is_err());
    }
}
