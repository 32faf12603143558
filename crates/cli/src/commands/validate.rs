//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::RedundancySettings;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    resource_count: usize,
    index: usize,
    timeout_ms: u64,
    rotate_ms: u64,
    limit: u32,
    failure_policy: contracts::FailurePolicy,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match super::load_settings(&args.config) {
        Ok(settings) => {
            let warnings = collect_warnings(&settings);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    resource_count: settings.resources.len(),
                    index: settings.index,
                    timeout_ms: settings.timeout_ms,
                    rotate_ms: settings.rotate_ms,
                    limit: settings.limit,
                    failure_policy: settings.failure_policy,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(settings: &RedundancySettings) -> Vec<String> {
    let mut warnings = Vec::new();

    if settings.rotate_ms == 0 && settings.resources.len() > 1 {
        warnings.push("rotate_ms = 0 - only the start resource is ever queried".to_string());
    }

    if settings.timeout_ms == 0 {
        warnings.push("timeout_ms = 0 - dispatches stop after the first loop".to_string());
    } else if settings.limit == 0 {
        warnings.push("limit = 0 - dispatches retry until completed or cancelled".to_string());
    }

    if settings.random && settings.index != 0 {
        warnings.push("index is ignored when random = true".to_string());
    }

    if settings.resources.len() == 1 && settings.rotate_ms != 0 {
        warnings.push("single resource - rotate_ms is never used".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Resources: {}", summary.resource_count);
            println!("  Start index: {}", summary.index);
            println!("  Loop delay: {} ms", summary.timeout_ms);
            println!("  Rotation delay: {} ms", summary.rotate_ms);
            println!("  Loop limit: {}", summary.limit);
            println!("  Failure policy: {:?}", summary.failure_policy);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
