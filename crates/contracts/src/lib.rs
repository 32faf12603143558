//! # Contracts
//!
//! Shared data model for redundant dispatch. All other crates depend on this one,
//! reverse dependencies are prohibited.
//!
//! ## Time Model
//! - All delays are [`std::time::Duration`]; a zero duration is the "stop" marker
//! - Start times are [`tokio::time::Instant`] so paused-clock tests see virtual time

mod config;
mod error;
mod settings;
mod status;
mod timing;

pub use config::*;
pub use error::*;
pub use settings::{RedundancySettings, MAX_DELAY_MS};
pub use status::*;
pub use timing::*;
