//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{FailurePolicy, RedundancySettings};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    resources: Vec<ResourceInfo>,
    timing: TimingInfo,
    random: bool,
    data_after_timeout: bool,
    failure_policy: FailurePolicy,
}

#[derive(Serialize)]
struct ResourceInfo {
    index: usize,
    resource: String,
    start: bool,
}

#[derive(Serialize)]
struct TimingInfo {
    timeout_ms: u64,
    rotate_ms: u64,
    limit: u32,
    /// Worst case until a dispatch fails, `None` when unbounded
    #[serde(skip_serializing_if = "Option::is_none")]
    max_duration_ms: Option<u64>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let settings = super::load_settings(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&settings);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&settings);
    }

    Ok(())
}

/// Upper bound on how long a dispatch can run with fixed delays
///
/// Every loop rotates through all resources, then waits one loop delay;
/// the last loop's wait is the grace period before failing.
fn max_duration_ms(settings: &RedundancySettings) -> Option<u64> {
    if settings.limit == 0 {
        return None;
    }
    let rotations = settings.resources.len().saturating_sub(1) as u64;
    let per_loop = rotations * settings.rotate_ms + settings.timeout_ms;
    Some(per_loop * u64::from(settings.limit))
}

fn build_config_info(settings: &RedundancySettings) -> ConfigInfo {
    let resources = settings
        .resources
        .iter()
        .enumerate()
        .map(|(index, resource)| ResourceInfo {
            index,
            resource: resource.clone(),
            start: index == settings.index,
        })
        .collect();

    ConfigInfo {
        resources,
        timing: TimingInfo {
            timeout_ms: settings.timeout_ms,
            rotate_ms: settings.rotate_ms,
            limit: settings.limit,
            max_duration_ms: max_duration_ms(settings),
        },
        random: settings.random,
        data_after_timeout: settings.data_after_timeout,
        failure_policy: settings.failure_policy,
    }
}

fn print_config_info(settings: &RedundancySettings) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Failover Configuration                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🔁 Resources ({})", settings.resources.len());
    for (i, resource) in settings.resources.iter().enumerate() {
        let is_last = i == settings.resources.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let marker = if i == settings.index && !settings.random {
            "  ← start"
        } else {
            ""
        };
        println!("   {} #{} {}{}", prefix, i, resource, marker);
    }

    println!("\n⏱  Timing");
    println!("   ├─ Rotation delay: {} ms", settings.rotate_ms);
    println!("   ├─ Loop delay: {} ms", settings.timeout_ms);
    match max_duration_ms(settings) {
        Some(max) => {
            println!("   ├─ Loop limit: {}", settings.limit);
            println!("   └─ Longest dispatch: {} ms", max);
        }
        None => {
            println!("   └─ Loop limit: unbounded");
        }
    }

    println!("\n⚙️  Behaviour");
    println!(
        "   ├─ Start: {}",
        if settings.random { "random" } else { "last successful" }
    );
    println!("   ├─ Late data: {}", if settings.data_after_timeout { "accepted" } else { "dropped" });
    println!("   └─ Attempt failure: {:?}", settings.failure_policy);

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_duration() {
        let mut settings =
            RedundancySettings::new(vec!["a:1".into(), "b:1".into(), "c:1".into()]);
        settings.rotate_ms = 100;
        settings.timeout_ms = 500;
        settings.limit = 2;
        assert_eq!(max_duration_ms(&settings), Some(1400));

        settings.limit = 0;
        assert_eq!(max_duration_ms(&settings), None);
    }

    #[test]
    fn test_build_config_info_marks_start() {
        let mut settings = RedundancySettings::new(vec!["a:1".into(), "b:1".into()]);
        settings.index = 1;

        let info = build_config_info(&settings);
        assert!(!info.resources[0].start);
        assert!(info.resources[1].start);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["timing"]["limit"], 2);
        assert_eq!(json["failure_policy"], "fail_over");
    }
}
