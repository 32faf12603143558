//! Settings validation
//!
//! Rules:
//! - at least one resource (schema)
//! - delays at most one hour (schema)
//! - no blank resource
//! - no duplicate resource
//! - start index within the resource list

use std::collections::HashSet;

use ::validator::Validate;
use contracts::{ContractError, RedundancySettings};

/// Validate settings
///
/// Returns the first error found, or Ok(()).
pub fn validate(settings: &RedundancySettings) -> Result<(), ContractError> {
    settings.validate()?;
    validate_resources(settings)?;
    validate_index(settings)?;
    Ok(())
}

fn validate_resources(settings: &RedundancySettings) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, resource) in settings.resources.iter().enumerate() {
        if resource.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("resources[{idx}]"),
                "resource cannot be blank",
            ));
        }
        if !seen.insert(resource.as_str()) {
            return Err(ContractError::config_validation(
                format!("resources[{idx}]"),
                format!("duplicate resource '{resource}'"),
            ));
        }
    }
    Ok(())
}

fn validate_index(settings: &RedundancySettings) -> Result<(), ContractError> {
    let len = settings.resources.len();
    if settings.index >= len {
        return Err(ContractError::config_validation(
            "index",
            format!("index {} out of range for {} resource(s)", settings.index, len),
        ));
    }
    Ok(())
}
