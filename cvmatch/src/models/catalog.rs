//! Catalog records as returned by the metadata service
//!
//! Only the fields the pipeline reads are typed. The full issue payload is
//! kept as opaque JSON in [`CandidateIssue::raw`] for pass-through and audit.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherRef {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Volume (series run) as embedded in an issue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRef {
    #[serde(default)]
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_detail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<PublisherRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub small_url: Option<String>,
    #[serde(default)]
    pub medium_url: Option<String>,
    #[serde(default)]
    pub super_url: Option<String>,
    #[serde(default)]
    pub original_url: Option<String>,
}

/// One catalog search result for a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateIssue {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub issue_number: String,
    #[serde(default)]
    pub volume: VolumeRef,
    #[serde(default)]
    pub cover_date: Option<String>,
    #[serde(default)]
    pub store_date: Option<String>,
    #[serde(default)]
    pub site_detail_url: Option<String>,
    #[serde(default)]
    pub image: Option<ImageRef>,
    /// Untyped original payload
    #[serde(default, skip_deserializing)]
    pub raw: serde_json::Value,
}

impl CandidateIssue {
    /// Decode one issue from a catalog payload, keeping the payload as `raw`
    pub fn from_payload(payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut issue: CandidateIssue = serde_json::from_value(payload.clone())?;
        issue.raw = payload;
        Ok(issue)
    }

    pub fn publisher_name(&self) -> Option<&str> {
        self.volume
            .publisher
            .as_ref()
            .map(|p| p.name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// Year from `cover_date` (`YYYY-MM-DD`), falling back to `store_date`
    pub fn cover_year(&self) -> Option<&str> {
        self.cover_date
            .as_deref()
            .or(self.store_date.as_deref())
            .and_then(|d| d.get(..4))
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
    }

    /// One-line human description: `Batman #1 (2016-08-01) - DC Comics`
    pub fn display_line(&self) -> String {
        let mut line = format!("{} #{}", self.volume.name, self.issue_number);
        if !self.name.is_empty() {
            line.push_str(&format!(" \"{}\"", self.name));
        }
        if let Some(date) = self.cover_date.as_deref().filter(|d| !d.is_empty()) {
            line.push_str(&format!(" ({})", date));
        }
        if let Some(publisher) = self.publisher_name() {
            line.push_str(&format!(" - {}", publisher));
        }
        line
    }
}

/// Volume record from a volume search or volume detail lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogVolume {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_year")]
    pub start_year: Option<String>,
    #[serde(default)]
    pub publisher: Option<PublisherRef>,
    #[serde(default)]
    pub site_detail_url: Option<String>,
}

impl CatalogVolume {
    pub fn to_ref(&self) -> VolumeRef {
        VolumeRef {
            id: self.id,
            name: self.name.clone(),
            site_detail_url: self.site_detail_url.clone(),
            publisher: self.publisher.clone(),
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// start_year arrives as a string, a number, or null
fn lenient_year<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
