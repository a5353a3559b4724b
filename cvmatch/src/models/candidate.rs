//! Structured interpretation of a filename, produced before any catalog lookup

use serde::{Deserialize, Serialize};

/// Parser confidence in a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Lenient parse used for remote answers; anything unrecognized is `Low`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filename after structured extraction
///
/// `issue_number` keeps the filename's spelling (e.g. `"003"`); compare with
/// [`Candidate::normalized_issue`]. No stage after the parser mutates a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub original_filename: String,
    pub series: String,
    pub issue_number: String,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub volume_number: Option<String>,
    pub confidence: Confidence,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Candidate {
    pub fn new(original_filename: impl Into<String>, series: impl Into<String>, issue_number: impl Into<String>) -> Self {
        Self {
            original_filename: original_filename.into(),
            series: series.into(),
            issue_number: issue_number.into(),
            year: None,
            publisher: None,
            volume_number: None,
            confidence: Confidence::Low,
            notes: None,
        }
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = non_empty(year.into());
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = non_empty(publisher.into());
        self
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volume_number = non_empty(volume.into());
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = non_empty(notes.into());
        self
    }

    pub fn normalized_issue(&self) -> String {
        normalize_issue_number(&self.issue_number)
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Canonical issue number for comparison and catalog filters.
///
/// Strips whitespace, a leading `#`, and leading zeros. Never returns an
/// empty string: all-zero input yields `"0"`, and a bare fraction such as
/// `"00.5"` keeps one zero (`"0.5"`).
pub fn normalize_issue_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_hash = trimmed.strip_prefix('#').unwrap_or(trimmed).trim_start();
    let stripped = without_hash.trim_start_matches('0');

    if stripped.is_empty() {
        "0".to_string()
    } else if stripped.starts_with('.') {
        format!("0{}", stripped)
    } else {
        stripped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_leading_zeros() {
        assert_eq!(normalize_issue_number("001"), "1");
        assert_eq!(normalize_issue_number("010"), "10");
        assert_eq!(normalize_issue_number("1000"), "1000");
    }

    #[test]
    fn test_normalize_never_empty() {
        assert_eq!(normalize_issue_number("0"), "0");
        assert_eq!(normalize_issue_number("000"), "0");
        assert_eq!(normalize_issue_number(""), "0");
        assert_eq!(normalize_issue_number("#"), "0");
    }

    #[test]
    fn test_normalize_hash_and_whitespace() {
        assert_eq!(normalize_issue_number("#007"), "7");
        assert_eq!(normalize_issue_number("  #12 "), "12");
        assert_eq!(normalize_issue_number("# 05"), "5");
    }

    #[test]
    fn test_normalize_fractional_and_suffixed() {
        assert_eq!(normalize_issue_number("00.5"), "0.5");
        assert_eq!(normalize_issue_number("012AU"), "12AU");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["001", "#007", "0", "12", "00.5"] {
            let once = normalize_issue_number(raw);
            assert_eq!(normalize_issue_number(&once), once);
        }
    }

    #[test]
    fn test_confidence_from_label() {
        assert_eq!(Confidence::from_label("High"), Confidence::High);
        assert_eq!(Confidence::from_label(" medium "), Confidence::Medium);
        assert_eq!(Confidence::from_label("certain"), Confidence::Low);
        assert!(Confidence::High > Confidence::Medium);
    }

    #[test]
    fn test_builder_drops_blank_fields() {
        let candidate = Candidate::new("x.cbz", "X", "1")
            .with_year("")
            .with_publisher("  Image ")
            .with_confidence(Confidence::Medium);

        assert_eq!(candidate.year, None);
        assert_eq!(candidate.publisher.as_deref(), Some("Image"));
        assert_eq!(candidate.confidence, Confidence::Medium);
    }
}
