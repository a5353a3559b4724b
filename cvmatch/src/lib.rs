//! cvmatch library
//!
//! Resolves comic archive filenames (CBZ/CBR) to ComicVine catalog issues:
//! parse the filename into a [`models::Candidate`], gather catalog issues,
//! pick at most one, and persist the outcome. Exposed as a library so the
//! pipeline can be driven from integration tests.

pub mod app;
pub mod db;
pub mod error;
pub mod input;
pub mod models;
pub mod output;
pub mod parser;
pub mod prompts;
pub mod selector;
pub mod services;
pub mod workflow;

pub use crate::error::{CompletionError, ItemError, MatchError, ParseError, PersistError, SearchError, Stage};
pub use crate::workflow::BatchCoordinator;

/// Version string with build identification, e.g. `0.1.0 (a1b2c3d4 release, built 2026-01-01T00:00:00Z)`
pub const BUILD_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CVMATCH_GIT_HASH"),
    " ",
    env!("CVMATCH_BUILD_PROFILE"),
    ", built ",
    env!("CVMATCH_BUILD_TIMESTAMP"),
    ")"
);
