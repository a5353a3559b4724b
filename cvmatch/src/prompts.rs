//! Prompt templates for the completion service
//!
//! Both templates demand a bare JSON object; answers are still passed through
//! [`crate::services::json_extract::extract_json`] because models do not
//! always comply.

use crate::models::{Candidate, CandidateIssue};
use serde::{Deserialize, Serialize};

/// Filename extraction prompt; answer decodes into [`RemoteCandidate`]
pub fn filename_parse_prompt(filename: &str) -> String {
    format!(
        r##"Extract structured fields from a comic book archive filename (CBZ/CBR).

Typical shapes:
- "Absolute Superman 003 (2025) (Digital) (Pyrate-DCP).cbz"
- "DC Comics - Batman (2016) #001.cbr"
- "X-Men v2 #45 (1995).cbz"
- "Watchmen 01 (of 12) (1986).cbz"
- "Action_Comics_1000_(2018).cbr"

Conventions:
- the issue number may follow "#" or "No." or stand alone, and may be zero-padded
- volume markers look like v2, Vol. 2 or Volume 2
- a four-digit year in parentheses is the publication year
- trailing parenthesized groups are usually release or scan tags
- underscores and hyphens may stand in for spaces

Filename:
{filename}

Reply with only this JSON object, no markdown:
{{
  "title": "series title with separators cleaned up",
  "issue_number": "issue number as written, e.g. 1, 045 or 12.1",
  "year": "publication year or empty string",
  "publisher": "publisher if identifiable or empty string",
  "volume_number": "volume number or empty string",
  "confidence": "high, medium or low",
  "notes": "anything ambiguous about this filename"
}}"##
    )
}

/// Shape expected back from [`filename_parse_prompt`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteCandidate {
    #[serde(deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(deserialize_with = "lenient_string")]
    pub issue_number: String,
    #[serde(deserialize_with = "lenient_string")]
    pub year: String,
    #[serde(deserialize_with = "lenient_string")]
    pub publisher: String,
    #[serde(deserialize_with = "lenient_string")]
    pub volume_number: String,
    #[serde(deserialize_with = "lenient_string")]
    pub confidence: String,
    #[serde(deserialize_with = "lenient_string")]
    pub notes: String,
}

// Models sometimes answer `"year": 2016` or `"publisher": null`
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

#[derive(Debug, Serialize)]
struct ResultSummary<'a> {
    index: usize,
    id: u64,
    volume_name: &'a str,
    issue_number: &'a str,
    cover_date: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    publisher: Option<&'a str>,
    url: &'a str,
}

/// Disambiguation prompt; answer decodes into [`MatchResponse`]
pub fn result_match_prompt(candidate: &Candidate, issues: &[CandidateIssue]) -> String {
    let summaries: Vec<ResultSummary<'_>> = issues
        .iter()
        .enumerate()
        .map(|(index, issue)| ResultSummary {
            index,
            id: issue.id,
            volume_name: &issue.volume.name,
            issue_number: &issue.issue_number,
            cover_date: issue.cover_date.as_deref().unwrap_or(""),
            publisher: issue.publisher_name(),
            url: issue.site_detail_url.as_deref().unwrap_or(""),
        })
        .collect();
    let results = serde_json::to_string_pretty(&summaries).unwrap_or_else(|_| "[]".to_string());

    let opt = |v: &Option<String>| v.clone().unwrap_or_default();

    format!(
        r#"Pick the catalog entry that best matches a comic file.

Filename: {filename}

Parsed from the filename:
- Series: {series}
- Issue: {issue}
- Year: {year}
- Publisher: {publisher}
- Volume: {volume}
- Notes: {notes}

Catalog results:
{results}

Rules:
- the volume name must match the series, allowing for a leading "The" and punctuation differences
- issue numbers must agree once zero padding is ignored (001 = 01 = 1)
- when a year is known, prefer a cover date within two years of it
- when several volumes share a name, prefer the one whose dates fit the year
- answer -1 when nothing fits

Reply with only this JSON object, no markdown:
{{
  "selected_index": <index of the best result, or -1>,
  "match_confidence": "high, medium, low or none",
  "reasoning": "one or two sentences"
}}"#,
        filename = candidate.original_filename,
        series = candidate.series,
        issue = candidate.issue_number,
        year = opt(&candidate.year),
        publisher = opt(&candidate.publisher),
        volume = opt(&candidate.volume_number),
        notes = opt(&candidate.notes),
        results = results,
    )
}

/// Shape expected back from [`result_match_prompt`]
#[derive(Debug, Clone, Deserialize)]
pub struct MatchResponse {
    pub selected_index: i64,
    #[serde(default)]
    pub match_confidence: String,
    #[serde(default)]
    pub reasoning: String,
}
