//! Defines the unified error type used across the watcher engine.
use thiserror::Error;

/// A specialized `Result` type for watcher operations.
pub type Result<A> = std::result::Result<A, WatcherError>;

/// Represents errors that can occur anywhere in the watcher engine: the
/// version-control adapter, the commit-graph store, the dashboard client,
/// or the repository watcher loop itself.
#[derive(Debug, Error)]
pub enum WatcherError {
    /// The 'git' executable was not found in the system's PATH.
    #[error("'git' command not found. Please ensure Git is installed and that its executable is included in your system's PATH environment variable.")]
    GitNotFound,

    /// Failed to spawn or wait on the `git` subprocess for a reason other
    /// than "not found".
    #[error("unable to execute git process: {0}")]
    Execution(std::io::Error),

    /// The output (stdout or stderr) from the 'git' process was not valid UTF-8.
    #[error("unable to decode output from git executable")]
    Undecodable,

    /// The 'git' command executed but reported an error. Contains the
    /// captured stdout and stderr, per the "HTTP/subprocess boundary error"
    /// design note (full output must survive for diagnostics).
    #[error("git failed with the following stdout: {stdout} stderr: {stderr}")]
    GitCommandFailed { stdout: String, stderr: String },

    /// A `fetch` or `push` exhausted its retry budget.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<WatcherError>,
    },

    /// A commit-log record from `git log` could not be parsed into a
    /// well-formed record (wrong field count, missing boundary marker, ...).
    #[error("malformed commit-log record: {0}")]
    MalformedLogRecord(String),

    /// `update` was asked to link a commit whose parent hash is non-empty
    /// but whose parent is not yet present in the commit-graph store
    /// (invariant C2).
    #[error("commit {child} references missing parent {parent}")]
    MissingParent { child: String, parent: String },

    /// `Posting` needed the repository's initial commit (empty `parentHash`)
    /// to synthesize a virtual predecessor for master, but none exists.
    #[error("repository has no initial commit to anchor master's last-seen pointer")]
    NoInitialCommit,

    /// `mergeBase` returned a hash that is not present in the commit-graph
    /// store, so it cannot be used as a branch's `lastSeen` pointer.
    #[error("merge-base commit {0} is not present in the commit graph")]
    MergeBaseNotFound(String),

    /// A commit's `dateRFC` field could not be parsed into an absolute
    /// timestamp when posting to the dashboard.
    #[error("unable to parse commit date {0:?}")]
    UnparseableDate(String),

    /// The dashboard (or upstream metadata service) returned a non-2xx
    /// status, or a 2xx with an unexpected body shape.
    #[error("http request to {url} failed: {status} {body}")]
    HttpBoundary {
        url: String,
        status: u16,
        body: String,
    },

    /// Transport-level failure talking to the dashboard or upstream server.
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The sentinel the dashboard returns when a package already has a
    /// first commit recorded; the caller must stop the current branch's
    /// traversal silently rather than treat this as fatal (error kind 2).
    #[error("this package already has a first commit; aborting")]
    AlreadyHasFirstCommit,

    /// A configuration value failed validation at startup (error kind 4).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A repository name, branch name, or URL failed format validation.
    #[error("invalid {kind}: {value:?}")]
    InvalidFormat { kind: &'static str, value: String },

    /// Generic I/O failure (reading the key file, creating the cache
    /// directory, ...).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatcherError {
    /// True for the dashboard's "already has a first commit" sentinel,
    /// which callers in the `Posting` phase must swallow rather than
    /// propagate.
    pub fn is_already_has_first_commit(&self) -> bool {
        matches!(self, WatcherError::AlreadyHasFirstCommit)
    }
}
