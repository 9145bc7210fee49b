//! Parses the delimited commit-log format produced by the version-control
//! adapter's `log` operation (spec.md §6, "Commit log format").
//!
//! Records are separated by `_-_- magic boundary -_-_`; within a record the
//! fields are, in order, separated by newlines: full hash, space-joined
//! parent hashes, `"Name <email>"`, RFC-1123 date, and a body containing the
//! description followed by `_-_- file boundary -_-_` and then
//! newline-separated file paths. Only the first parent is retained (spec.md
//! §9, Open Questions: this silently flattens octopus merges and is
//! preserved as-is).
use crate::error::{Result, WatcherError};
use crate::types::CommitHash;
use std::str::FromStr;

pub const RECORD_BOUNDARY: &str = "_-_- magic boundary -_-_";
pub const FILE_BOUNDARY: &str = "_-_- file boundary -_-_";

/// A single parsed record from `log`, prior to being linked into a
/// commit-graph store (it carries no `branch` or `children`, which are
/// assigned by the caller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub hash: CommitHash,
    pub parent_hash: Option<CommitHash>,
    pub author_line: String,
    pub date_rfc: String,
    pub desc: String,
    pub files: String,
}

/// Parses the full output of one `log` invocation into records, in the
/// order the adapter produced them (topological, newest first per the VCA
/// contract).
pub fn parse_log(output: &str) -> Result<Vec<LogRecord>> {
    output
        .split(RECORD_BOUNDARY)
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> Result<LogRecord> {
    // The 0x1B control byte must be neutralized before anything downstream
    // treats this as plain text (spec.md §4.1).
    let record = record.replace('\x1B', "?");

    let mut lines = record.splitn(4, '\n');
    let hash_str = lines
        .next()
        .ok_or_else(|| WatcherError::MalformedLogRecord("missing hash line".into()))?;
    let parents_str = lines
        .next()
        .ok_or_else(|| WatcherError::MalformedLogRecord("missing parents line".into()))?;
    let author_line = lines
        .next()
        .ok_or_else(|| WatcherError::MalformedLogRecord("missing author line".into()))?
        .to_string();
    let rest = lines
        .next()
        .ok_or_else(|| WatcherError::MalformedLogRecord("missing date/body".into()))?;

    let (date_rfc, body) = rest
        .split_once('\n')
        .ok_or_else(|| WatcherError::MalformedLogRecord("missing body after date".into()))?;

    let hash = CommitHash::from_str(hash_str.trim())
        .map_err(|_| WatcherError::MalformedLogRecord(format!("bad hash {hash_str:?}")))?;

    // Only the first parent is retained; merges are flattened (see module docs).
    let parent_hash = parents_str
        .split_whitespace()
        .next()
        .map(CommitHash::from_str)
        .transpose()
        .map_err(|_| WatcherError::MalformedLogRecord(format!("bad parent in {parents_str:?}")))?;

    let (desc, files) = match body.split_once(FILE_BOUNDARY) {
        Some((desc, files)) => (desc.trim_end_matches('\n'), files.trim_matches('\n')),
        None => (body.trim_end_matches('\n'), ""),
    };

    Ok(LogRecord {
        hash,
        parent_hash,
        author_line,
        date_rfc: date_rfc.trim().to_string(),
        desc: desc.to_string(),
        files: files.lines().collect::<Vec<_>>().join(" "),
    })
}
