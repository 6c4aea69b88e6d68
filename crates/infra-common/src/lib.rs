//! # Infra-Common
//!
//! Shared infrastructure for the ClaimGate crates. At the moment this is the
//! logging bootstrap used by every binary in the workspace.

pub mod errors;
pub mod logging;

pub use errors::{Error, Result};
pub use logging::{LoggingConfig, log_welcome, parse_log_level, setup_logging};
