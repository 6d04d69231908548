//! Decoders for `hg` template output.
//!
//! Each function takes the complete standard output of one command, as
//! produced by the templates in [`crate::hg`]:
//!
//! ```text
//! heads:   73591
//! range:   4:1aaa5
//!          5:784bd
//! detail:  1273258009.0 -7200
//!          Joe Test <joetest@example.org>
//!          file1:file2:
//!          Comment for rev 5
//! ```

use chrono::{DateTime, Utc};
use hgpoller_exec::platform::{LINE_SEP, PATH_SEP};
use hgpoller_models::CommitRecord;

use crate::error::ParseFailure;

/// Number of fields in the detail template.
const DETAIL_FIELDS: usize = 4;

/// Decoded detail of one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionDetail {
    /// Commit time, when requested.
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw author line.
    pub author: String,
    /// Changed files.
    pub files: Vec<String>,
    /// Stripped commit message.
    pub description: String,
}

impl RevisionDetail {
    /// Turns the detail into a commit record for `revision`.
    pub fn into_commit(self, revision: impl Into<String>, ordinal: Option<u64>) -> CommitRecord {
        CommitRecord {
            revision: revision.into(),
            ordinal,
            author: self.author,
            description: self.description,
            files: self.files,
            timestamp: self.timestamp,
        }
    }
}

/// Parses a heads listing into revision ids, in listing order.
///
/// Duplicates are kept; callers collapse them when counting heads. Only the
/// final line terminator is tolerated, any other empty line is malformed.
pub fn parse_heads(text: &str) -> Result<Vec<String>, ParseFailure> {
    if text.trim().is_empty() {
        return Err(ParseFailure::NoHeads);
    }

    split_lines(text)
        .map(str::trim)
        .enumerate()
        .map(|(index, head)| {
            if head.is_empty() {
                Err(ParseFailure::BlankHead { line: index + 1 })
            } else {
                Ok(head.to_string())
            }
        })
        .collect()
}

/// Parses `ordinal:revision` lines, in listing order.
pub fn parse_range(text: &str) -> Result<Vec<(u64, String)>, ParseFailure> {
    let mut entries = Vec::new();
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let malformed = || ParseFailure::MalformedRange {
            line: line.to_string(),
        };
        let (ordinal, revision) = line.split_once(':').ok_or_else(malformed)?;
        let ordinal = ordinal.trim().parse::<u64>().map_err(|_| malformed())?;
        let revision = revision.trim();
        if revision.is_empty() {
            return Err(malformed());
        }
        entries.push((ordinal, revision.to_string()));
    }
    Ok(entries)
}

/// Parses the detail of one revision.
///
/// The date is only interpreted when `use_timestamps` is set; otherwise the
/// detail carries no timestamp.
pub fn parse_detail(text: &str, use_timestamps: bool) -> Result<RevisionDetail, ParseFailure> {
    let fields: Vec<&str> = text.splitn(DETAIL_FIELDS, LINE_SEP).collect();
    if fields.len() != DETAIL_FIELDS {
        return Err(ParseFailure::FieldCount {
            expected: DETAIL_FIELDS,
            found: fields.len(),
        });
    }

    let timestamp = if use_timestamps {
        Some(parse_hgdate(fields[0])?)
    } else {
        None
    };

    Ok(RevisionDetail {
        timestamp,
        author: fields[1].trim().to_string(),
        files: parse_files(fields[2]),
        description: fields[3].trim().to_string(),
    })
}

/// Parses `"<seconds> <offset>"` into an absolute time.
///
/// Seconds are already relative to the UTC epoch; the offset only describes
/// the committer's local zone.
fn parse_hgdate(value: &str) -> Result<DateTime<Utc>, ParseFailure> {
    let bad = || ParseFailure::BadDate {
        value: value.trim().to_string(),
    };

    let seconds: f64 = value
        .split_whitespace()
        .next()
        .ok_or_else(bad)?
        .parse()
        .map_err(|_| bad())?;
    if !seconds.is_finite() {
        return Err(bad());
    }

    let whole = seconds.floor();
    let mut secs = whole as i64;
    let mut nanos = ((seconds - whole) * 1e9).round() as u32;
    if nanos >= 1_000_000_000 {
        secs += 1;
        nanos = 0;
    }
    DateTime::from_timestamp(secs, nanos).ok_or_else(bad)
}

/// Splits the files line.
///
/// The template ends every name with the path separator. Output without any
/// separator comes from the plain `{files}` keyword, which separates names
/// with spaces.
fn parse_files(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Vec::new();
    }
    if line.contains(PATH_SEP) {
        let mut files: Vec<String> = line.split(PATH_SEP).map(String::from).collect();
        if files.last().is_some_and(|last| last.is_empty()) {
            files.pop();
        }
        files
    } else {
        line.split_whitespace().map(String::from).collect()
    }
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.strip_suffix(LINE_SEP).unwrap_or(text).split(LINE_SEP)
}
