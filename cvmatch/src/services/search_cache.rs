//! In-memory caches for the catalog client
//!
//! - [`IssueSearchCache`]: search results keyed by normalized
//!   `(series, issue)`, TTL-bounded. Expired entries read as absent and are
//!   dropped on access; there is no background eviction and no size bound.
//! - [`VolumeCache`]: volume details keyed by id, never expire.
//!
//! Neither cache survives a process restart.

use crate::models::{normalize_issue_number, CandidateIssue, CatalogVolume};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Normalized search key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKey {
    series: String,
    issue: String,
}

impl SearchKey {
    pub fn new(series: &str, issue_number: &str) -> Self {
        let series = series
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let issue = if issue_number.trim().is_empty() {
            String::new()
        } else {
            normalize_issue_number(issue_number)
        };
        Self { series, issue }
    }
}

struct CacheEntry {
    issues: Vec<CandidateIssue>,
    stored_at: Instant,
}

pub struct IssueSearchCache {
    entries: Mutex<HashMap<SearchKey, CacheEntry>>,
    ttl: Duration,
}

impl IssueSearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &SearchKey) -> Option<Vec<CandidateIssue>> {
        self.get_at(key, Instant::now()).await
    }

    /// Lookup as of `now`; an entry older than the TTL is removed and reported absent
    pub async fn get_at(&self, key: &SearchKey, now: Instant) -> Option<Vec<CandidateIssue>> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            None => return None,
            Some(entry) => now.saturating_duration_since(entry.stored_at) >= self.ttl,
        };

        if expired {
            entries.remove(key);
            tracing::debug!(?key, "Issue search cache entry expired");
            return None;
        }
        entries.get(key).map(|entry| entry.issues.clone())
    }

    pub async fn insert(&self, key: SearchKey, issues: Vec<CandidateIssue>) {
        self.insert_at(key, issues, Instant::now()).await;
    }

    pub async fn insert_at(&self, key: SearchKey, issues: Vec<CandidateIssue>, now: Instant) {
        self.entries.lock().await.insert(
            key,
            CacheEntry {
                issues,
                stored_at: now,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Default)]
pub struct VolumeCache {
    volumes: RwLock<HashMap<u64, CatalogVolume>>,
}

impl VolumeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: u64) -> Option<CatalogVolume> {
        self.volumes.read().await.get(&id).cloned()
    }

    pub async fn insert(&self, volume: CatalogVolume) {
        self.volumes.write().await.insert(volume.id, volume);
    }

    pub async fn len(&self) -> usize {
        self.volumes.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(id: u64) -> CandidateIssue {
        CandidateIssue::from_payload(json!({"id": id, "issue_number": "1", "volume": {"id": 1, "name": "X"}}))
            .unwrap()
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(SearchKey::new("  Absolute   Superman ", "003"), SearchKey::new("absolute superman", "#3"));
        assert_ne!(SearchKey::new("Batman", "1"), SearchKey::new("Batman", "2"));
        assert_ne!(SearchKey::new("Batman", ""), SearchKey::new("Batman", "0"));
    }

    #[tokio::test]
    async fn test_fresh_entry_is_returned() {
        let cache = IssueSearchCache::new(Duration::from_secs(60));
        let key = SearchKey::new("Batman", "1");
        let t0 = Instant::now();

        cache.insert_at(key.clone(), vec![issue(1), issue(2)], t0).await;

        let hit = cache.get_at(&key, t0 + Duration::from_secs(59)).await.unwrap();
        assert_eq!(hit.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent_and_dropped() {
        let cache = IssueSearchCache::new(Duration::from_secs(60));
        let key = SearchKey::new("Batman", "1");
        let t0 = Instant::now();

        cache.insert_at(key.clone(), vec![issue(1)], t0).await;

        assert!(cache.get_at(&key, t0 + Duration::from_secs(60)).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_reinsert_after_expiry_refreshes() {
        let cache = IssueSearchCache::new(Duration::from_secs(10));
        let key = SearchKey::new("Saga", "54");
        let t0 = Instant::now();

        cache.insert_at(key.clone(), vec![issue(1)], t0).await;
        assert!(cache.get_at(&key, t0 + Duration::from_secs(11)).await.is_none());

        let t1 = t0 + Duration::from_secs(11);
        cache.insert_at(key.clone(), vec![issue(9)], t1).await;
        let hit = cache.get_at(&key, t1 + Duration::from_secs(5)).await.unwrap();
        assert_eq!(hit[0].id, 9);
    }

    #[tokio::test]
    async fn test_volume_cache_round_trip() {
        let cache = VolumeCache::new();
        assert!(cache.get(7).await.is_none());

        cache
            .insert(CatalogVolume {
                id: 7,
                name: "Batman".into(),
                start_year: Some("2016".into()),
                publisher: None,
                site_detail_url: None,
            })
            .await;

        assert_eq!(cache.get(7).await.unwrap().name, "Batman");
        assert_eq!(cache.len().await, 1);
    }
}
