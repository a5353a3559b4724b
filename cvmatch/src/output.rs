//! Streaming JSON / CSV writers for results and query output
//!
//! JSON output is one array, written incrementally so a long batch can be
//! piped. CSV output flattens each row; fields are quoted per RFC 4180 when
//! they contain a separator, quote or line break.

use crate::db::StoredRecord;
use crate::models::{ParsedItem, ProcessingResult};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

/// Row shape for CSV output
pub trait CsvRow {
    fn header() -> &'static [&'static str];
    fn fields(&self) -> Vec<String>;
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

impl CsvRow for StoredRecord {
    fn header() -> &'static [&'static str] {
        &[
            "filename",
            "success",
            "series",
            "issue_number",
            "year",
            "publisher",
            "catalog_id",
            "catalog_url",
            "confidence",
            "matched_by",
            "reasoning",
            "failed_stage",
            "error",
            "processed_at",
            "duration_ms",
        ]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.filename.clone(),
            self.success.to_string(),
            opt(&self.series),
            opt(&self.issue_number),
            opt(&self.year),
            opt(&self.publisher),
            self.catalog_id.map(|id| id.to_string()).unwrap_or_default(),
            opt(&self.catalog_url),
            opt(&self.confidence),
            opt(&self.matched_by),
            opt(&self.reasoning),
            opt(&self.failed_stage),
            opt(&self.error),
            self.processed_at.to_rfc3339(),
            self.duration_ms.to_string(),
        ]
    }
}

impl CsvRow for ProcessingResult {
    fn header() -> &'static [&'static str] {
        StoredRecord::header()
    }

    fn fields(&self) -> Vec<String> {
        StoredRecord::from_result(self).fields()
    }
}

impl CsvRow for ParsedItem {
    fn header() -> &'static [&'static str] {
        &[
            "filename",
            "parser",
            "series",
            "issue_number",
            "year",
            "publisher",
            "volume_number",
            "confidence",
            "notes",
            "error",
        ]
    }

    fn fields(&self) -> Vec<String> {
        let c = self.candidate.as_ref();
        vec![
            self.filename.clone(),
            self.parser.clone(),
            c.map(|c| c.series.clone()).unwrap_or_default(),
            c.map(|c| c.issue_number.clone()).unwrap_or_default(),
            c.and_then(|c| c.year.clone()).unwrap_or_default(),
            c.and_then(|c| c.publisher.clone()).unwrap_or_default(),
            c.and_then(|c| c.volume_number.clone()).unwrap_or_default(),
            c.map(|c| c.confidence.to_string()).unwrap_or_default(),
            c.and_then(|c| c.notes.clone()).unwrap_or_default(),
            opt(&self.error),
        ]
    }
}

/// Quote a CSV field when needed
pub fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub struct ResultWriter<W: Write> {
    format: OutputFormat,
    out: W,
    rows: usize,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(format: OutputFormat, out: W) -> Self {
        Self {
            format,
            out,
            rows: 0,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn write<T: Serialize + CsvRow>(&mut self, row: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => {
                self.out.write_all(if self.rows == 0 { b"[\n" } else { b",\n" })?;
                serde_json::to_writer_pretty(&mut self.out, row)?;
            }
            OutputFormat::Csv => {
                if self.rows == 0 {
                    writeln!(self.out, "{}", T::header().join(","))?;
                }
                let line: Vec<String> = row.fields().iter().map(|f| escape_csv(f)).collect();
                writeln!(self.out, "{}", line.join(","))?;
            }
        }
        self.rows += 1;
        Ok(())
    }

    /// Close the JSON array (an empty batch still yields `[]`) and flush
    pub fn finish(mut self) -> io::Result<W> {
        if self.format == OutputFormat::Json {
            if self.rows == 0 {
                self.out.write_all(b"[]\n")?;
            } else {
                self.out.write_all(b"\n]\n")?;
            }
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ItemError, ParseError};
    use crate::models::{Candidate, MatchResult};

    fn results() -> Vec<ProcessingResult> {
        let candidate = Candidate::new("Saga, Vol 1.cbz", "Saga", "1").with_notes("says \"hi\"");
        vec![
            ProcessingResult::succeeded(
                "Saga, Vol 1.cbz",
                MatchResult::none(&candidate, "no candidates returned"),
                3,
            ),
            ProcessingResult::failed("", &ItemError::from(ParseError::EmptyFilename), 0),
        ]
    }

    #[test]
    fn test_json_output_is_one_array() {
        let mut writer = ResultWriter::new(OutputFormat::Json, Vec::new());
        for r in results() {
            writer.write(&r).unwrap();
        }
        let out = writer.finish().unwrap();

        let parsed: Vec<ProcessingResult> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].failed_stage, Some(crate::error::Stage::Parse));
    }

    #[test]
    fn test_empty_json_output() {
        let out = ResultWriter::new(OutputFormat::Json, Vec::new()).finish().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[]\n");
    }

    #[test]
    fn test_csv_header_once_and_quoting() {
        let mut writer = ResultWriter::new(OutputFormat::Csv, Vec::new());
        for r in results() {
            writer.write(&r).unwrap();
        }
        assert_eq!(writer.rows(), 2);
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("filename,success,series"));
        assert!(lines[1].starts_with("\"Saga, Vol 1.cbz\",true,Saga,1,"));
        assert!(lines[2].contains(",parse,"));
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"x\""), "\"say \"\"x\"\"\"");
    }
}
