//! The repository watcher (RW): one instance per repository, owning a VCA,
//! a CGS, and a status ring, driving the fetch → push → post loop gated by
//! a tickler channel and a safety timer (spec.md §4.3).
use crate::dashboard::DashboardClient;
use crate::error::{Result, WatcherError};
use crate::graph::CommitGraphStore;
use crate::model::Branch;
use crate::refs::{list_branches, sort_pending_refs};
use crate::retry::with_linear_backoff;
use crate::status_ring::StatusRing;
use crate::types::{BranchName, CommitHash, RepoName};
use crate::vca::{RefUpdate, Vca};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// 5-minute safety-net timer: whichever of the tickler receiver or this
/// timer fires first drives a loop iteration (spec.md §4.6).
const SAFETY_TIMER: Duration = Duration::from_secs(5 * 60);
const PUSH_RETRY_ATTEMPTS: u32 = 3;
const PUSH_BATCH_SIZE: usize = 200;

/// Everything an RW needs at construction: which repository it owns, how to
/// reach it, and which publishing pipelines are enabled.
pub struct RepositoryWatcher {
    pub name: RepoName,
    pub vca: Vca,
    pub dbc: Arc<dyn DashboardClient>,
    pub dash_enabled: bool,
    pub mirror_enabled: bool,
    pub package_path: String,
    pub path_filters: Vec<String>,
    pub explicit_branches: Option<Vec<String>>,
    pub status: Arc<StatusRing>,
    pub tickler: mpsc::Receiver<()>,
}

impl RepositoryWatcher {
    /// Runs the state machine forever, or until a fatal error terminates
    /// this RW's task (propagated to the Supervisor).
    pub async fn run(mut self) -> Result<()> {
        let mut graph = CommitGraphStore::new();
        let mut branches: HashMap<BranchName, Branch> = HashMap::new();

        loop {
            self.status.push("idle");
            let mut safety_timer = tokio::time::interval(SAFETY_TIMER);
            safety_timer.tick().await; // first tick fires immediately; consume it

            tokio::select! {
                _ = self.tickler.recv() => {}
                _ = safety_timer.tick() => {}
            }

            self.status.push("fetching");
            self.vca.fetch().await?;

            if self.mirror_enabled {
                self.status.push("pushing");
                self.run_pushing().await?;
            }

            if self.dash_enabled {
                self.status.push("posting");
                self.run_posting(&mut graph, &mut branches).await?;
            }
        }
    }

    /// The `Posting` algorithm (spec.md §4.3).
    async fn run_posting(
        &self,
        graph: &mut CommitGraphStore,
        branches: &mut HashMap<BranchName, Branch>,
    ) -> Result<()> {
        let remote_heads = self.vca.list_remote_refs("origin").await?;
        let watch_list = list_branches(&remote_heads, self.explicit_branches.as_deref());

        for branch_name in &watch_list {
            let is_new = !branches.contains_key(branch_name);
            let range = match branches.get(branch_name) {
                Some(existing) => format!("{}..heads/{}", existing.head, branch_name.as_str()),
                None => format!("heads/{}", branch_name.as_str()),
            };

            let path_filters = if self.package_path.is_empty() {
                self.path_filters.clone()
            } else {
                Vec::new()
            };
            let new_commits = self.vca.log(&range, &path_filters).await?;
            graph.update(branch_name, new_commits)?;

            let head_ref = format!("refs/heads/{}", branch_name.as_str());
            let Some(head_hash_str) = remote_heads.get(&head_ref) else {
                continue;
            };
            let head = CommitHash::from_str(head_hash_str)
                .map_err(|_| WatcherError::MalformedLogRecord(format!("bad remote head hash {head_hash_str:?}")))?;

            {
                let branch_state = branches
                    .entry(branch_name.clone())
                    .or_insert_with(|| Branch::new(branch_name.clone(), head.clone()));
                branch_state.head = head.clone();
            }

            if is_new {
                let chain = graph.ancestor_chain(&head)?;
                let mut lo = 0usize;
                let mut hi = chain.len();
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    if self.dbc.seen(&chain[mid], &self.package_path).await? {
                        hi = mid;
                    } else {
                        lo = mid + 1;
                    }
                }
                branches.get_mut(branch_name).expect("inserted above").last_seen = chain.get(lo).cloned();
            }
        }

        for branch_name in &watch_list {
            let Some(branch_state) = branches.get_mut(branch_name) else {
                continue;
            };
            if !branch_state.has_unposted_commits() {
                continue;
            }

            // `virtual_predecessor` marks the master-only case where
            // `lastSeen` has no real commit behind it: spec.md §4.3 step 2
            // synthesizes a predecessor whose sole child is the repository's
            // initial commit, so the initial commit itself is emitted by the
            // traversal below rather than treated as already posted.
            let (last_seen, virtual_predecessor) = match &branch_state.last_seen {
                Some(hash) => (hash.clone(), false),
                None if branch_name.is_master() => {
                    let initial = graph.initial_commit().ok_or(WatcherError::NoInitialCommit)?;
                    (initial.hash.clone(), true)
                }
                None => {
                    let merge_base_str = self
                        .vca
                        .merge_base(&format!("heads/{}", branch_name.as_str()), "heads/master")
                        .await?;
                    let merge_base = CommitHash::from_str(&merge_base_str)
                        .map_err(|_| WatcherError::MergeBaseNotFound(merge_base_str.clone()))?;
                    if !graph.contains(&merge_base) {
                        return Err(WatcherError::MergeBaseNotFound(merge_base_str));
                    }
                    (merge_base, false)
                }
            };

            let mut descendant_hashes = graph.descendant_hashes_on_branch(&last_seen, branch_name);
            if virtual_predecessor {
                descendant_hashes.insert(0, last_seen.clone());
            }
            let mut abort = false;
            for hash in &descendant_hashes {
                let commit = graph.get(hash).expect("descendant hash is present in its own store");
                match self.dbc.post(commit, &self.package_path).await {
                    Ok(()) => {}
                    Err(e) if e.is_already_has_first_commit() => {
                        abort = true;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }

            // lastSeen only advances on full completion of the traversal
            // (spec.md §8 scenario 6); a sentinel abort leaves it untouched
            // so the next iteration retries the same descendants.
            if !abort {
                branch_state.last_seen = Some(branch_state.head.clone());
            }
        }

        Ok(())
    }

    /// The `Pushing` algorithm (spec.md §4.3), retried as a whole up to 3
    /// times on failure.
    async fn run_pushing(&self) -> Result<()> {
        with_linear_backoff("push", PUSH_RETRY_ATTEMPTS, || async {
            let local_refs = self.vca.list_local_refs().await?;
            let remote_refs = self.vca.list_remote_refs("dest").await?;

            let mut pending: Vec<String> = local_refs
                .iter()
                .filter(|(name, hash)| remote_refs.get(*name) != Some(*hash))
                .map(|(name, _)| name.clone())
                .collect();
            pending = sort_pending_refs(std::mem::take(&mut pending));

            for batch in pending.chunks(PUSH_BATCH_SIZE) {
                let updates: Vec<RefUpdate> = batch
                    .iter()
                    .filter_map(|name| {
                        local_refs.get(name).map(|hash| RefUpdate {
                            ref_name: name.clone(),
                            hash: hash.clone(),
                        })
                    })
                    .collect();
                if !updates.is_empty() {
                    self.vca.push("dest", &updates).await?;
                }
            }
            Ok(())
        })
        .await
    }
}
