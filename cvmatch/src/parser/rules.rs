//! Shape-rule filename parser
//!
//! Rules are tried in a fixed order and the first structural match wins.
//! There is no scoring: ordering encodes preference. A filename no rule
//! recognizes still yields a candidate (whole name as series, issue "1",
//! low confidence).
//!
//! **Cleaning:**
//! 1. Drop any directory prefix
//! 2. Strip a trailing extension (`.` + 1-5 ASCII alphanumerics)
//! 3. Underscores become spaces, whitespace runs collapse
//!
//! Trailing parenthesized tags such as `(Digital) (Pyrate-DCP)` are kept in
//! `notes`. A series ending in `Vol. N` loses that suffix and records the
//! volume number.

use super::FilenameParser;
use crate::error::ParseError;
use crate::models::{Candidate, Confidence};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Trailing parenthesized groups
const TAGS: &str = r"(?P<tags>(?:\s+\([^)]*\))*)";

static EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[A-Za-z0-9]{1,5}$").expect("static regex"));

static VOLUME_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<series>.*?)\s+vol\.?\s*(?P<vol>\d+)$").expect("static regex")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// One filename shape
struct ShapeRule {
    name: &'static str,
    pattern: Regex,
    confidence: Confidence,
    /// Captured issue number is also the volume number (`Series v2 (2019)`)
    issue_is_volume: bool,
}

impl ShapeRule {
    fn new(name: &'static str, pattern: &str, confidence: Confidence) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("static regex"),
            confidence,
            issue_is_volume: false,
        }
    }

    fn volume_marker(mut self) -> Self {
        self.issue_is_volume = true;
        self
    }

    fn build(&self, filename: &str, caps: &Captures<'_>) -> Candidate {
        let group = |name: &str| caps.name(name).map(|m| m.as_str().trim()).unwrap_or("");

        let issue = match group("issue") {
            "" => "1",
            issue => issue,
        };

        let mut candidate = Candidate::new(filename, group("series"), issue)
            .with_year(group("year"))
            .with_publisher(group("publisher"))
            .with_confidence(self.confidence);

        if self.issue_is_volume {
            candidate = candidate.with_volume(issue);
        }

        let notes: Vec<&str> = [group("subtitle"), group("tags"), group("rest")]
            .into_iter()
            .filter(|n| !n.is_empty())
            .collect();
        if !notes.is_empty() {
            candidate = candidate.with_notes(notes.join("; "));
        }

        strip_volume_suffix(candidate)
    }
}

static RULES: Lazy<Vec<ShapeRule>> = Lazy::new(|| {
    use Confidence::*;
    vec![
        // DC Comics - Batman (2016) #001
        ShapeRule::new(
            "publisher_prefixed",
            &format!(
                r"^(?P<publisher>.+?)\s+-\s+(?P<series>.+?)\s+\((?P<year>\d{{4}})\)\s+#(?P<issue>\d+(?:\.\d+)?){}$",
                TAGS
            ),
            High,
        ),
        // Batman (2016) #001
        ShapeRule::new(
            "series_year_issue",
            &format!(
                r"^(?P<series>.+?)\s+\((?P<year>\d{{4}})\)\s+#(?P<issue>\d+(?:\.\d+)?){}$",
                TAGS
            ),
            High,
        ),
        // Batman - One Bad Day 001 (2022) (Digital)
        ShapeRule::new(
            "dashed_title",
            &format!(
                r"^(?P<series>.+?)\s+-\s+(?P<subtitle>.+?)\s+(?P<issue>\d{{3}})\s+\((?P<year>\d{{4}})\){}$",
                TAGS
            ),
            Medium,
        ),
        // Absolute Superman 003 (2025) (Digital) (Pyrate-DCP)
        ShapeRule::new(
            "numbered_with_year",
            &format!(
                r"^(?P<series>.+?)\s+(?P<issue>\d{{3}})\s+\((?P<year>\d{{4}})\){}$",
                TAGS
            ),
            High,
        ),
        // Saga v02 - Book Two (2013)
        ShapeRule::new(
            "volume_marker",
            &format!(
                r"^(?P<series>.+?)\s+v(?P<issue>\d+)(?:\s+-\s+(?P<subtitle>.+?))?\s+\((?P<year>\d{{4}})\){}$",
                TAGS
            ),
            Medium,
        )
        .volume_marker(),
        // Watchmen 01 (of 12) (1986)
        ShapeRule::new(
            "limited_with_year",
            &format!(
                r"^(?P<series>.+?)\s+(?P<issue>\d+)\s+\(of\s+\d+\)\s+\((?P<year>\d{{4}})\){}$",
                TAGS
            ),
            High,
        ),
        // Watchmen 01 (of 12)
        ShapeRule::new(
            "limited",
            &format!(r"^(?P<series>.+?)\s+(?P<issue>\d+)\s+\(of\s+\d+\){}$", TAGS),
            Medium,
        ),
        // 2023-04 - Heavy Metal (Digital)
        ShapeRule::new(
            "year_month",
            &format!(
                r"^(?P<year>\d{{4}})-(?P<issue>\d{{2}})\s+-\s+(?P<series>.+?){}$",
                TAGS
            ),
            Medium,
        ),
        // 1985 (2008)
        ShapeRule::new(
            "year_as_title",
            &format!(r"^(?P<series>\d{{4}})\s+\((?P<year>\d{{4}})\){}$", TAGS),
            Low,
        ),
        // Hellboy 012 extra words
        ShapeRule::new(
            "bare_number",
            r"^(?P<series>.+?)\s+(?P<issue>\d{3})(?:\s+(?P<rest>.*))?$",
            Medium,
        ),
        // Maus (1991) (Pantheon)
        ShapeRule::new(
            "series_year",
            &format!(r"^(?P<series>.+?)\s+\((?P<year>\d{{4}})\){}$", TAGS),
            Low,
        ),
    ]
});

fn strip_volume_suffix(mut candidate: Candidate) -> Candidate {
    if let Some(caps) = VOLUME_SUFFIX.captures(&candidate.series) {
        let series = caps["series"].trim().to_string();
        if !series.is_empty() {
            if candidate.volume_number.is_none() {
                candidate.volume_number = Some(caps["vol"].to_string());
            }
            candidate.series = series;
        }
    }
    candidate
}

/// Drop a trailing extension, unless it reads as the fraction of an issue number (`#001.5`)
fn strip_extension(base: &str) -> &str {
    let Some(ext) = EXTENSION.find(base) else {
        return base;
    };
    let digits_before = base[..ext.start()].ends_with(|c: char| c.is_ascii_digit());
    let numeric_suffix = ext.as_str()[1..].bytes().all(|b| b.is_ascii_digit());
    if digits_before && numeric_suffix {
        base
    } else {
        &base[..ext.start()]
    }
}

/// Basename without extension, underscores, or repeated whitespace
pub fn clean_basename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    let spaced = strip_extension(base).replace('_', " ");
    WHITESPACE.replace_all(spaced.trim(), " ").into_owned()
}

/// `.cbz` / `.cbr`, case-insensitive
pub fn is_comic_file(filename: &str) -> bool {
    let lower = filename.trim().to_ascii_lowercase();
    lower.ends_with(".cbz") || lower.ends_with(".cbr")
}

/// Heuristic parser; no I/O
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleParser;

impl RuleParser {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous entry point
    pub fn parse_filename(&self, filename: &str) -> Result<Candidate, ParseError> {
        let cleaned = clean_basename(filename);
        if cleaned.is_empty() {
            return Err(ParseError::EmptyFilename);
        }

        for rule in RULES.iter() {
            if let Some(caps) = rule.pattern.captures(&cleaned) {
                let candidate = rule.build(filename, &caps);
                if candidate.series.is_empty() {
                    continue;
                }
                tracing::debug!(
                    filename,
                    rule = rule.name,
                    series = %candidate.series,
                    issue = %candidate.issue_number,
                    confidence = %candidate.confidence,
                    "Filename matched shape rule"
                );
                return Ok(candidate);
            }
        }

        tracing::debug!(filename, "No shape rule matched, using whole name as series");
        Ok(strip_volume_suffix(
            Candidate::new(filename, cleaned, "1").with_confidence(Confidence::Low),
        ))
    }
}

#[async_trait::async_trait]
impl FilenameParser for RuleParser {
    fn name(&self) -> &str {
        "rules"
    }

    async fn parse(&self, filename: &str) -> Result<Candidate, ParseError> {
        self.parse_filename(filename)
    }
}
