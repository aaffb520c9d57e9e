//! Interchange formats for the stage.
//!
//! Both decoders apply the URL allow-list per record: a bad record is dropped
//! and counted, never fatal. A payload that is not a list at all is
//! `MalformedInput`; a list where nothing survives is `NoValidRecords`.

pub mod json;
pub mod netscape;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::bookmark::BookmarkRecord;
use crate::dedupe::dedupe;
use crate::error::{Result, StageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Array of `{title, url, addedAt}` objects.
    Json,
    /// Netscape bookmark file.
    Html,
}

impl Format {
    /// Pick a format from a file name: `.json`, `.html` or `.htm`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "json" => Some(Format::Json),
            "html" | "htm" => Some(Format::Html),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Html => "html",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "html" | "htm" | "netscape" => Ok(Format::Html),
            other => Err(format!("unsupported format: {} (use json or html)", other)),
        }
    }
}

/// Why a single candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotAnObject,
    MissingTitle,
    MissingUrl,
    UnsafeUrl,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    /// Valid, de-duplicated records in input order.
    pub records: Vec<BookmarkRecord>,
    /// Candidates rejected by validation.
    pub skipped: usize,
    /// Valid candidates collapsed because their URL repeated.
    pub duplicates: usize,
}

pub fn decode(payload: &str, format: Format) -> Result<DecodeOutcome> {
    match format {
        Format::Json => json::decode(payload),
        Format::Html => netscape::decode(payload),
    }
}

pub fn encode(records: &[BookmarkRecord], format: Format) -> Result<String> {
    match format {
        Format::Json => json::encode(records),
        Format::Html => Ok(netscape::encode(records)),
    }
}

/// Shared tail of both decoders: drop rejects, require survivors, dedupe.
fn finish(candidates: Vec<std::result::Result<BookmarkRecord, RejectReason>>) -> Result<DecodeOutcome> {
    let mut skipped = 0;
    let mut valid = Vec::with_capacity(candidates.len());

    for (index, candidate) in candidates.into_iter().enumerate() {
        match candidate {
            Ok(record) => valid.push(record),
            Err(reason) => {
                debug!("Skipping record #{}: {:?}", index, reason);
                skipped += 1;
            }
        }
    }

    if valid.is_empty() {
        return Err(StageError::NoValidRecords { skipped });
    }

    let before = valid.len();
    let records = dedupe(valid);
    Ok(DecodeOutcome {
        duplicates: before - records.len(),
        records,
        skipped,
    })
}
