//! The in-memory commit-graph store (CGS): a DAG of commits keyed by hash,
//! plus binary search for the newest ancestor the dashboard has already
//! accepted (spec.md §4.2).
use crate::commitlog::LogRecord;
use crate::error::{Result, WatcherError};
use crate::model::Commit;
use crate::types::{BranchName, CommitHash};
use std::collections::HashMap;

/// Single-writer-per-repository arena of commits, keyed by hash. Parent
/// links are stored as hashes (already present in the arena); children are
/// a relation resolved by hash, never an ownership claim (spec.md §9).
#[derive(Debug, Default)]
pub struct CommitGraphStore {
    commits: HashMap<CommitHash, Commit>,
}

impl CommitGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &CommitHash) -> Option<&Commit> {
        self.commits.get(hash)
    }

    pub fn contains(&self, hash: &CommitHash) -> bool {
        self.commits.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// The repository's initial commit: the one with no parent. Linear scan
    /// is fine here — it only runs once per repository, the first time
    /// master's `lastSeen` needs a virtual predecessor.
    pub fn initial_commit(&self) -> Option<&Commit> {
        self.commits.values().find(|c| c.parent_hash.is_none())
    }

    /// Links `new_commits` (topological order, newest first, as produced by
    /// the VCA's `log`) into the store under `branch`.
    ///
    /// - If a commit's hash is already present and `branch != "master"`, it
    ///   is dropped (invariant C4).
    /// - If already present and `branch == "master"`, its `branch` field is
    ///   overwritten to `"master"`.
    /// - Otherwise it is inserted and linked to its parent (invariants
    ///   C2/C3); a missing parent is a data-shape invariant violation.
    pub fn update(&mut self, branch: &BranchName, new_commits: Vec<LogRecord>) -> Result<()> {
        // `new_commits` arrives newest-first; link oldest-first so a
        // commit's parent is always already in the arena once we reach it.
        for record in new_commits.into_iter().rev() {
            if let Some(existing) = self.commits.get_mut(&record.hash) {
                if branch.is_master() {
                    existing.branch = branch.clone();
                }
                continue;
            }

            if let Some(parent_hash) = &record.parent_hash {
                if !self.commits.contains_key(parent_hash) {
                    return Err(WatcherError::MissingParent {
                        child: record.hash.to_string(),
                        parent: parent_hash.to_string(),
                    });
                }
            }

            let commit = Commit {
                hash: record.hash.clone(),
                author_line: record.author_line,
                date_rfc: record.date_rfc,
                desc: record.desc,
                parent_hash: record.parent_hash.clone(),
                branch: branch.clone(),
                files: record.files,
                children: Vec::new(),
            };
            self.commits.insert(record.hash.clone(), commit);

            if let Some(parent_hash) = &record.parent_hash {
                let parent = self
                    .commits
                    .get_mut(parent_hash)
                    .expect("just verified parent is present");
                // C3: parent.children contains the new commit exactly once.
                if !parent.children.contains(&record.hash) {
                    parent.children.push(record.hash.clone());
                }
            }
        }
        Ok(())
    }

    /// Walks from `head_hash` via `parent_hash` pointers into an ordered
    /// sequence (newest to oldest). Separated from `last_seen` so the
    /// caller can run the dashboard's `seen` check asynchronously against
    /// this plain, already-materialized sequence instead of threading an
    /// async predicate through the store.
    pub fn ancestor_chain(&self, head_hash: &CommitHash) -> Result<Vec<CommitHash>> {
        let mut chain = Vec::new();
        let mut cursor = Some(head_hash.clone());
        while let Some(hash) = cursor {
            let commit = self
                .commits
                .get(&hash)
                .ok_or_else(|| WatcherError::MissingParent {
                    child: "lastSeen walk".into(),
                    parent: hash.to_string(),
                })?;
            cursor = commit.parent_hash.clone();
            chain.push(hash);
        }
        Ok(chain)
    }

    /// Binary searches `head_hash`'s ancestor chain (newest to oldest) for
    /// the newest one `dash_seen` reports as already accepted.
    ///
    /// Assumes "the dashboard has seen this commit" is monotone along
    /// ancestry (spec.md §9): if the dashboard ever un-sees an older commit
    /// while still reporting a newer one as seen, this search is wrong by
    /// construction. That assumption is not validated here, per spec.md.
    pub fn last_seen<F>(&self, head_hash: &CommitHash, mut dash_seen: F) -> Result<Option<CommitHash>>
    where
        F: FnMut(&CommitHash) -> Result<bool>,
    {
        let chain = self.ancestor_chain(head_hash)?;
        // `chain` is newest-first; dash_seen is assumed monotone so the
        // first unseen prefix is contiguous from the front.
        let mut lo = 0usize;
        let mut hi = chain.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if dash_seen(&chain[mid])? {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(chain.get(lo).cloned())
    }

    /// Depth-first traversal from `from`, emitting every descendant whose
    /// `branch == branch`. Visits direct children matching the branch in
    /// order, then recurses on *every* child regardless of branch — this
    /// preserves post-order exploration of the whole DAG while only
    /// emitting branch-resident commits to `visit` (spec.md §4.2).
    pub fn descendants_on_branch<V>(
        &self,
        from: &CommitHash,
        branch: &BranchName,
        visit: &mut V,
    ) where
        V: FnMut(&Commit),
    {
        let Some(node) = self.commits.get(from) else {
            return;
        };
        for child_hash in &node.children {
            if let Some(child) = self.commits.get(child_hash) {
                if &child.branch == branch {
                    visit(child);
                }
            }
        }
        for child_hash in &node.children {
            self.descendants_on_branch(child_hash, branch, visit);
        }
    }

    /// Like `descendants_on_branch`, but collects hashes rather than
    /// borrowing `Commit`s through a callback — lets the caller `.await` an
    /// async action (e.g. posting to the dashboard) between visits without
    /// holding a borrow of the store across the suspension point.
    pub fn descendant_hashes_on_branch(&self, from: &CommitHash, branch: &BranchName) -> Vec<CommitHash> {
        let mut out = Vec::new();
        self.descendants_on_branch(from, branch, &mut |c| out.push(c.hash.clone()));
        out
    }
}
