//! Command implementations.

mod info;
mod probe;
mod validate;

pub use info::run_info;
pub use probe::run_probe;
pub use validate::run_validate;

use std::path::Path;

use contracts::RedundancySettings;

use crate::error::{CliError, Result};

/// Load and validate the settings file
fn load_settings(path: &Path) -> Result<RedundancySettings> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    Ok(config_loader::ConfigLoader::load_from_path(path)?)
}
