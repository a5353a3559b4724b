//! External service clients and their shared plumbing

pub mod catalog_client;
pub mod completion_client;
pub mod json_extract;
pub mod request_gate;
pub mod search_cache;

pub use catalog_client::{CatalogClient, IssueSearch};
pub use completion_client::{Completion, CompletionClient};
pub use json_extract::extract_json;
pub use request_gate::RequestGate;
pub use search_cache::{IssueSearchCache, SearchKey, VolumeCache};
