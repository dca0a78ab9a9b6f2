//! Record ingestion.
//!
//! Turns raw input bytes into [`Record`]s. The pipeline itself never
//! looks inside a file; it hands each input buffer to this module and
//! gets back one result per record, so a structurally bad line can be
//! skipped and counted without aborting the run.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// One corpus record: a free-text field plus the category labels it
/// carries. A record may carry several labels, or none.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Input encodings understood by the ingestion layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum, serde::Serialize, Deserialize)]
pub enum RecordFormat {
    /// `title,genres` lines with `|`-separated genres (MovieLens layout).
    Csv,
    /// One JSON object per line: `{"text": ..., "categories": [...]}`.
    Jsonl,
}

/// Parses one input buffer into records, one result per record.
pub fn parse_records(format: RecordFormat, raw: &str) -> Vec<Result<Record>> {
    match format {
        RecordFormat::Csv => parse_csv(raw),
        RecordFormat::Jsonl => parse_jsonl(raw),
    }
}

fn parse_jsonl(raw: &str) -> Vec<Result<Record>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid record", n + 1))
        })
        .collect()
}

fn parse_csv(raw: &str) -> Vec<Result<Record>> {
    let mut records = Vec::new();
    for (n, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (n == 0 && is_header(line)) {
            continue;
        }
        records.push(parse_csv_line(line).with_context(|| format!("line {}: invalid record", n + 1)));
    }
    records
}

fn is_header(line: &str) -> bool {
    let fields = split_csv_line(line);
    fields.len() >= 2
        && fields[0].trim().eq_ignore_ascii_case("title")
        && fields[1].trim().eq_ignore_ascii_case("genres")
}

fn parse_csv_line(line: &str) -> Result<Record> {
    let fields = split_csv_line(line);
    if fields.len() < 2 {
        bail!("expected `title,genres` fields, got {} field(s)", fields.len());
    }
    let text = fields[0].trim().to_owned();
    let categories = fields[1]
        .split('|')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_owned)
        .collect();
    Ok(Record { text, categories })
}

// Commas inside a quoted title must not split the field.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        if !in_quotes && c == ',' {
            fields.push(std::mem::take(&mut current));
        } else if c == '"' {
            in_quotes = !in_quotes;
        } else {
            current.push(c);
        }
    }
    fields.push(current);

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_line_with_quoted_comma() {
        let records = parse_records(RecordFormat::Csv, "\"Crouching Tiger, Hidden Dragon\",Action|Drama");
        assert_eq!(records.len(), 1);
        let record = records[0].as_ref().unwrap();
        assert_eq!(record.text, "Crouching Tiger, Hidden Dragon");
        assert_eq!(record.categories, vec!["Action", "Drama"]);
    }

    #[test]
    fn csv_header_is_skipped() {
        let records = parse_records(RecordFormat::Csv, "title,genres\nDark Water,Drama");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().text, "Dark Water");
    }

    #[test]
    fn csv_line_without_genre_field_is_malformed() {
        let records = parse_records(RecordFormat::Csv, "just a title and nothing else");
        assert_eq!(records.len(), 1);
        assert!(records[0].is_err());
    }

    #[test]
    fn csv_empty_genre_list_is_a_record_without_labels() {
        let records = parse_records(RecordFormat::Csv, "Dark Water,");
        assert!(records[0].as_ref().unwrap().categories.is_empty());
    }

    #[test]
    fn jsonl_roundtrip_and_defaults() {
        let raw = "{\"text\": \"dark water\", \"categories\": [\"Drama\"]}\n{}\nnot json";
        let records = parse_records(RecordFormat::Jsonl, raw);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].as_ref().unwrap().categories, vec!["Drama"]);
        // A record missing both fields parses to an empty record, which
        // later contributes zero pairs.
        assert!(records[1].as_ref().unwrap().text.is_empty());
        assert!(records[2].is_err());
    }

    #[test]
    fn blank_lines_are_not_records() {
        assert!(parse_records(RecordFormat::Csv, "\n\n").is_empty());
        assert!(parse_records(RecordFormat::Jsonl, "\n  \n").is_empty());
    }
}
