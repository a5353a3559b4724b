//! Catalog (ComicVine) client
//!
//! `search_issues(title, issue)` gathers candidate issues for a parsed
//! filename:
//!
//! 1. Issue-search cache (TTL) lookup; a fresh hit makes no network call
//! 2. Volume search, keeping the top N volumes
//! 3. Issues of each volume, filtered by normalized issue number. A failing
//!    volume is logged and skipped; results are de-duplicated by issue id
//! 4. Nothing found: direct issue search with `"<title> <issue>"`
//! 5. Issues without a publisher are enriched from the volume detail cache
//!
//! The call errors only when some request failed *and* no strategy produced
//! an issue. Every request waits on the shared [`RequestGate`] and runs under
//! the [`RetryPolicy`].

use super::request_gate::RequestGate;
use super::search_cache::{IssueSearchCache, SearchKey, VolumeCache};
use crate::error::SearchError;
use crate::models::{normalize_issue_number, CandidateIssue, CatalogVolume};
use cvmatch_common::config::AppConfig;
use cvmatch_common::RetryPolicy;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resource-type prefix for volume detail paths (`/volume/4050-<id>/`)
pub const VOLUME_RESOURCE_PREFIX: &str = "4050-";

const ISSUE_FIELDS: &str = "id,name,issue_number,cover_date,store_date,site_detail_url,volume,image";
const VOLUME_FIELDS: &str = "id,name,start_year,publisher,site_detail_url";
const SEARCH_LIMIT: u32 = 10;
const ISSUE_LIMIT: u32 = 100;

/// Candidate-gathering capability used by the batch coordinator
#[async_trait::async_trait]
pub trait IssueSearch: Send + Sync {
    async fn search_issues(
        &self,
        title: &str,
        issue_number: &str,
    ) -> Result<Vec<CandidateIssue>, SearchError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status_code: i64,
    #[serde(default)]
    error: String,
    #[serde(default)]
    results: serde_json::Value,
}

pub struct CatalogClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    gate: Arc<RequestGate>,
    retry: RetryPolicy,
    issue_cache: IssueSearchCache,
    volume_cache: VolumeCache,
    max_volumes: usize,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, SearchError> {
        let http_client = Client::builder()
            .user_agent(concat!("cvmatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            gate: RequestGate::shared(Duration::from_secs(1)),
            retry: RetryPolicy::default(),
            issue_cache: IssueSearchCache::new(Duration::from_secs(24 * 60 * 60)),
            volume_cache: VolumeCache::new(),
            max_volumes: 5,
        })
    }

    /// Build from resolved configuration
    pub fn from_config(config: &AppConfig) -> cvmatch_common::Result<Self> {
        let api_key = config.comicvine_api_key.clone().ok_or_else(|| {
            cvmatch_common::Error::Config("catalog API key not configured".to_string())
        })?;

        let client = Self::new(&config.comicvine_base_url, api_key)
            .map_err(|e| cvmatch_common::Error::Internal(format!("HTTP client: {}", e)))?
            .with_gate(RequestGate::shared(config.catalog_min_interval()))
            .with_retry(config.retry_policy())
            .with_cache_ttl(config.issue_cache_ttl())
            .with_max_volumes(config.max_volumes_to_check);
        Ok(client)
    }

    /// Share one gate between several clients of the same service
    pub fn with_gate(mut self, gate: Arc<RequestGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.issue_cache = IssueSearchCache::new(ttl);
        self
    }

    pub fn with_max_volumes(mut self, max_volumes: usize) -> Self {
        self.max_volumes = max_volumes.max(1);
        self
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }

    /// GET `{base}/{path}` and return the envelope's `results`
    async fn get_results(
        &self,
        operation: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, SearchError> {
        self.retry
            .run(operation, SearchError::is_retryable, || self.get_once(path, params))
            .await
    }

    async fn get_once(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, SearchError> {
        self.gate.wait().await;

        let url = format!("{}/{}", self.base_url, path);
        // api_key is appended separately so it never reaches the logs
        debug!(url = %url, params = ?params, "Querying catalog API");

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("format", "json")])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        if envelope.status_code != 1 {
            return Err(SearchError::Api {
                code: envelope.status_code,
                message: envelope.error,
            });
        }

        Ok(envelope.results)
    }

    /// Volume search ordered by catalog relevance
    pub async fn search_volumes(&self, title: &str) -> Result<Vec<CatalogVolume>, SearchError> {
        let results = self
            .get_results(
                "catalog volume search",
                "search/",
                &[
                    ("resources", "volume".to_string()),
                    ("query", title.to_string()),
                    ("limit", SEARCH_LIMIT.to_string()),
                    ("field_list", VOLUME_FIELDS.to_string()),
                ],
            )
            .await?;

        let volumes: Vec<CatalogVolume> = as_array(results)
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<CatalogVolume>(value) {
                Ok(volume) => Some(volume),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable volume record");
                    None
                }
            })
            .collect();

        for volume in &volumes {
            self.volume_cache.insert(volume.clone()).await;
        }

        debug!(title, count = volumes.len(), "Volume search complete");
        Ok(volumes)
    }

    /// Issues of one volume, optionally restricted to one issue number
    pub async fn issues_for_volume(
        &self,
        volume: &CatalogVolume,
        issue_number: Option<&str>,
    ) -> Result<Vec<CandidateIssue>, SearchError> {
        let filter = match issue_number {
            Some(issue) => format!("volume:{},issue_number:{}", volume.id, issue),
            None => format!("volume:{}", volume.id),
        };

        let results = self
            .get_results(
                "catalog volume issues",
                "issues/",
                &[
                    ("filter", filter),
                    ("limit", ISSUE_LIMIT.to_string()),
                    ("field_list", ISSUE_FIELDS.to_string()),
                ],
            )
            .await?;

        let mut issues = decode_issues(results)?;
        for issue in &mut issues {
            let site_url = issue.volume.site_detail_url.take();
            issue.volume = volume.to_ref();
            if issue.volume.site_detail_url.is_none() {
                issue.volume.site_detail_url = site_url;
            }
        }
        Ok(issues)
    }

    /// Direct issue search, used when the volume strategy yields nothing
    pub async fn search_issues_direct(
        &self,
        title: &str,
        issue_number: Option<&str>,
    ) -> Result<Vec<CandidateIssue>, SearchError> {
        let query = match issue_number {
            Some(issue) => format!("{} {}", title, issue),
            None => title.to_string(),
        };

        let results = self
            .get_results(
                "catalog issue search",
                "search/",
                &[
                    ("resources", "issue".to_string()),
                    ("query", query),
                    ("limit", SEARCH_LIMIT.to_string()),
                    ("field_list", ISSUE_FIELDS.to_string()),
                ],
            )
            .await?;

        decode_issues(results)
    }

    /// Volume details, served from the volume cache when possible
    pub async fn get_volume(&self, volume_id: u64) -> Result<CatalogVolume, SearchError> {
        if let Some(volume) = self.volume_cache.get(volume_id).await {
            return Ok(volume);
        }

        let results = self
            .get_results(
                "catalog volume detail",
                &format!("volume/{}{}/", VOLUME_RESOURCE_PREFIX, volume_id),
                &[("field_list", VOLUME_FIELDS.to_string())],
            )
            .await?;

        let volume: CatalogVolume =
            serde_json::from_value(results).map_err(|e| SearchError::Decode(e.to_string()))?;
        self.volume_cache.insert(volume.clone()).await;
        Ok(volume)
    }

    async fn enrich_publishers(&self, issues: &mut [CandidateIssue]) {
        for issue in issues.iter_mut() {
            if issue.publisher_name().is_some() || issue.volume.id == 0 {
                continue;
            }
            match self.get_volume(issue.volume.id).await {
                Ok(volume) => {
                    if volume.publisher.is_some() {
                        issue.volume.publisher = volume.publisher;
                    }
                    if issue.volume.name.is_empty() {
                        issue.volume.name = volume.name;
                    }
                }
                Err(e) => {
                    debug!(volume_id = issue.volume.id, error = %e, "Publisher enrichment failed, continuing");
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl IssueSearch for CatalogClient {
    async fn search_issues(
        &self,
        title: &str,
        issue_number: &str,
    ) -> Result<Vec<CandidateIssue>, SearchError> {
        let key = SearchKey::new(title, issue_number);
        if let Some(cached) = self.issue_cache.get(&key).await {
            debug!(title, issue_number, count = cached.len(), "Issue search cache hit");
            return Ok(cached);
        }

        let normalized_issue = if issue_number.trim().is_empty() {
            None
        } else {
            Some(normalize_issue_number(issue_number))
        };

        let mut failures: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut issues = Vec::new();

        match self.search_volumes(title).await {
            Ok(volumes) => {
                for volume in volumes.iter().take(self.max_volumes) {
                    match self.issues_for_volume(volume, normalized_issue.as_deref()).await {
                        Ok(found) => {
                            issues.extend(found.into_iter().filter(|i| seen.insert(i.id)));
                        }
                        Err(e) => {
                            warn!(volume_id = volume.id, volume = %volume.name, error = %e, "Volume issue lookup failed, skipping volume");
                            failures.push(format!("volume {}: {}", volume.id, e));
                        }
                    }
                }
            }
            Err(e) => {
                warn!(title, error = %e, "Volume search failed, trying direct issue search");
                failures.push(format!("volume search: {}", e));
            }
        }

        if issues.is_empty() {
            debug!(title, issue_number, "No issues via volumes, falling back to direct search");
            match self.search_issues_direct(title, normalized_issue.as_deref()).await {
                Ok(found) => issues.extend(found.into_iter().filter(|i| seen.insert(i.id))),
                Err(e) => {
                    warn!(title, error = %e, "Direct issue search failed");
                    failures.push(format!("direct search: {}", e));
                }
            }
        }

        if issues.is_empty() && !failures.is_empty() {
            return Err(SearchError::Exhausted(failures.join("; ")));
        }

        self.enrich_publishers(&mut issues).await;

        info!(title, issue_number, count = issues.len(), "Catalog search complete");
        self.issue_cache.insert(key, issues.clone()).await;
        Ok(issues)
    }
}

fn as_array(results: serde_json::Value) -> Vec<serde_json::Value> {
    match results {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn decode_issues(results: serde_json::Value) -> Result<Vec<CandidateIssue>, SearchError> {
    as_array(results)
        .into_iter()
        .map(|value| CandidateIssue::from_payload(value).map_err(|e| SearchError::Decode(e.to_string())))
        .collect()
}
