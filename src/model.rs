//! The data model shared by the commit-graph store, the dashboard client,
//! and the repository watcher: `Commit`, `Branch`, and the per-repository
//! status ring entry (spec.md §3).
use crate::types::{BranchName, CommitHash};

/// A single commit as reconstructed from the version-control adapter's log
/// output.
///
/// Unlike a typical owner/back-reference graph node, `parent` is stored as a
/// hash rather than an owning pointer: the parent is already present
/// elsewhere in the same commit-graph store's arena (spec.md §9, "Cyclic
/// owner/back-reference graph"). `children` is populated by the store as a
/// pure relation, never an ownership claim.
#[derive(Debug, Clone)]
pub struct Commit {
    /// 40-character lowercase hex identity.
    pub hash: CommitHash,
    /// Free-form "Name <email>".
    pub author_line: String,
    /// RFC-1123-style date string, retained verbatim for forwarding.
    pub date_rfc: String,
    /// Plain text; first line is the short description.
    pub desc: String,
    /// Hash of the first parent, or `None` for the initial commit.
    pub parent_hash: Option<CommitHash>,
    /// The branch on which this commit was first recorded by this watcher
    /// (invariant C4).
    pub branch: BranchName,
    /// Single space-separated list of paths touched; may be empty (merges).
    pub files: String,
    /// Back-references to child commits, in discovery order (a relation,
    /// not ownership; resolved against the owning store's arena).
    pub children: Vec<CommitHash>,
}

impl Commit {
    /// The first line of `desc`.
    pub fn short_desc(&self) -> &str {
        self.desc.lines().next().unwrap_or("")
    }

    /// The individual space-separated file paths touched by this commit.
    pub fn files_touched(&self) -> impl Iterator<Item = &str> {
        self.files.split(' ').filter(|s| !s.is_empty())
    }
}

/// A branch as tracked by a single repository watcher.
#[derive(Debug, Clone)]
pub struct Branch {
    pub name: BranchName,
    /// Current tip commit hash for this branch.
    pub head: CommitHash,
    /// The newest ancestor of `head` known to have already been accepted by
    /// the dashboard, or `None` if nothing on this branch has been posted
    /// yet.
    pub last_seen: Option<CommitHash>,
}

impl Branch {
    pub fn new(name: BranchName, head: CommitHash) -> Self {
        Branch {
            name,
            head,
            last_seen: None,
        }
    }

    /// Whether this branch still has commits to post: its head differs
    /// from its last-seen pointer.
    pub fn has_unposted_commits(&self) -> bool {
        self.last_seen.as_ref() != Some(&self.head)
    }
}
