//! # cvmatch common library
//!
//! Shared code for the cvmatch workspace:
//! - Error and result types
//! - Configuration model, file loading and environment overrides
//! - Retry policy with exponential backoff
//! - Time helpers

pub mod config;
pub mod error;
pub mod retry;
pub mod time;

pub use error::{Error, Result};
pub use retry::RetryPolicy;
