//! Error types for infrastructure components

mod types;

pub use types::{Error, Result};
