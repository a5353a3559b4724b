//! Data models for the resolution pipeline

pub mod candidate;
pub mod catalog;
pub mod result;

pub use candidate::{normalize_issue_number, Candidate, Confidence};
pub use catalog::{CandidateIssue, CatalogVolume, ImageRef, PublisherRef, VolumeRef};
pub use result::{
    BatchProgress, ItemState, MatchConfidence, MatchResult, ParsedItem, ProcessingResult,
};
