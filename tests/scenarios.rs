//! End-to-end scenarios from spec.md §8, exercised over an in-memory
//! commit-graph store and dashboard client — no real `git` subprocess,
//! since these scenarios are about CGS/DBC semantics, not the version
//! control adapter.
use async_trait::async_trait;
use revwatch::commitlog::LogRecord;
use revwatch::dashboard::DashboardClient;
use revwatch::error::{Result, WatcherError};
use revwatch::graph::CommitGraphStore;
use revwatch::model::Commit;
use revwatch::types::{BranchName, CommitHash};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Mutex;

fn hash(label: &str) -> CommitHash {
    CommitHash::from_str(&format!("{:0<40}", label)).unwrap()
}

fn master() -> BranchName {
    BranchName::from_str("master").unwrap()
}

fn record(label: &str, parent: Option<&str>) -> LogRecord {
    LogRecord {
        hash: hash(label),
        parent_hash: parent.map(hash),
        author_line: "Jane Doe <jane@example.com>".into(),
        date_rfc: "Mon, 02 Jan 2006 15:04:05 -0700".into(),
        desc: format!("commit {label}"),
        files: String::new(),
    }
}

/// A dashboard double that tracks which hashes it has "seen" and records
/// posts in call order, for asserting exact posting sequences.
#[derive(Default)]
struct RecordingDashboard {
    already_seen: HashSet<CommitHash>,
    posts: Mutex<Vec<CommitHash>>,
}

#[async_trait]
impl DashboardClient for RecordingDashboard {
    async fn seen(&self, hash: &CommitHash, _package_path: &str) -> Result<bool> {
        Ok(self.already_seen.contains(hash))
    }

    async fn post(&self, commit: &Commit, _package_path: &str) -> Result<()> {
        self.posts.lock().unwrap().push(commit.hash.clone());
        Ok(())
    }

    async fn subrepo_paths(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Runs the `Posting` algorithm's core loop (spec.md §4.3) directly against
/// a CGS and DBC, for a single already-known branch whose `lastSeen` is
/// already established — the part of the algorithm under test here.
///
/// `virtual_predecessor` mirrors spec.md §4.3 step 2's master-only case: when
/// `lastSeen` is unset, a virtual predecessor whose sole child is the
/// repository's initial commit stands in for it, so the initial commit
/// itself (here, `last_seen`) is emitted by the traversal rather than
/// treated as already posted.
///
/// Returns the new `lastSeen` only on full completion of the traversal;
/// `None` means either nothing was posted or a sentinel abort occurred
/// (lastSeen advances only on full completion, spec.md §8 scenario 6).
async fn post_descendants(
    graph: &CommitGraphStore,
    dbc: &dyn DashboardClient,
    last_seen: &CommitHash,
    branch: &BranchName,
    virtual_predecessor: bool,
) -> Result<Option<CommitHash>> {
    let mut descendants = graph.descendant_hashes_on_branch(last_seen, branch);
    if virtual_predecessor {
        descendants.insert(0, last_seen.clone());
    }
    for hash in &descendants {
        let commit = graph.get(hash).unwrap();
        match dbc.post(commit, "").await {
            Ok(()) => {}
            Err(e) if e.is_already_has_first_commit() => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(descendants.last().cloned())
}

#[tokio::test]
async fn scenario_1_initial_sync_of_empty_dashboard() {
    let mut graph = CommitGraphStore::new();
    graph
        .update(
            &master(),
            vec![record("c", Some("b")), record("b", Some("a")), record("a", None)],
        )
        .unwrap();

    let dbc = RecordingDashboard::default(); // dashboard has seen nothing
    let initial = graph.initial_commit().unwrap().hash.clone();
    assert_eq!(initial, hash("a"));

    let last_seen = initial; // virtual predecessor's sole child: the initial commit itself
    let posted_up_to = post_descendants(&graph, &dbc, &last_seen, &master(), true)
        .await
        .unwrap();

    assert_eq!(
        *dbc.posts.lock().unwrap(),
        vec![hash("a"), hash("b"), hash("c")],
        "the virtual predecessor's traversal emits the initial commit itself, then b, then c"
    );
    assert_eq!(posted_up_to, Some(hash("c")));
}

#[tokio::test]
async fn scenario_2_known_history_one_new_commit() {
    let mut graph = CommitGraphStore::new();
    graph
        .update(&master(), vec![record("b", Some("a")), record("a", None)])
        .unwrap();
    // master: head=C, lastSeen=C already established from a prior iteration.
    graph.update(&master(), vec![record("c", Some("b"))]).unwrap();

    let dbc = RecordingDashboard::default();
    let posted_up_to = post_descendants(&graph, &dbc, &hash("b"), &master(), false).await.unwrap();

    assert_eq!(*dbc.posts.lock().unwrap(), vec![hash("c")]);
    assert_eq!(posted_up_to, Some(hash("c")));
}

#[tokio::test]
async fn scenario_3_new_non_master_branch_forked_at_b() {
    let mut graph = CommitGraphStore::new();
    graph
        .update(
            &master(),
            vec![record("d", Some("b")), record("b", Some("a")), record("a", None)],
        )
        .unwrap();
    let release = BranchName::from_str("release-branch.go1.42").unwrap();
    graph.update(&release, vec![record("e", Some("b"))]).unwrap();

    // merge_base(heads/release, master) = b, already posted previously.
    let dbc = RecordingDashboard::default();
    let posted_up_to = post_descendants(&graph, &dbc, &hash("b"), &release, false).await.unwrap();

    assert_eq!(*dbc.posts.lock().unwrap(), vec![hash("e")]);
    assert_eq!(posted_up_to, Some(hash("e")));
    assert_eq!(graph.get(&hash("e")).unwrap().branch, release);
}

#[tokio::test]
async fn scenario_6_sentinel_abort_stops_traversal_without_advancing_last_seen() {
    struct AbortsOnSecondPost {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl DashboardClient for AbortsOnSecondPost {
        async fn seen(&self, _hash: &CommitHash, _package_path: &str) -> Result<bool> {
            Ok(false)
        }
        async fn post(&self, _commit: &Commit, _package_path: &str) -> Result<()> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 2 {
                Err(WatcherError::AlreadyHasFirstCommit)
            } else {
                Ok(())
            }
        }
        async fn subrepo_paths(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    let mut graph = CommitGraphStore::new();
    graph
        .update(
            &master(),
            vec![record("c", Some("b")), record("b", Some("a")), record("a", None)],
        )
        .unwrap();

    let dbc = AbortsOnSecondPost { calls: Mutex::new(0) };
    let posted_up_to = post_descendants(&graph, &dbc, &hash("a"), &master(), false).await.unwrap();

    // b posted (call 1), c aborts (call 2): lastSeen is not advanced at all
    // this iteration (it only advances on full completion), and the
    // sentinel must not surface as a fatal error.
    assert_eq!(posted_up_to, None);
    assert_eq!(*dbc.calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn re_running_posting_with_no_new_commits_produces_no_further_posts() {
    let mut graph = CommitGraphStore::new();
    graph
        .update(&master(), vec![record("b", Some("a")), record("a", None)])
        .unwrap();

    let dbc = RecordingDashboard::default();
    post_descendants(&graph, &dbc, &hash("a"), &master(), false).await.unwrap();
    assert_eq!(dbc.posts.lock().unwrap().len(), 1);

    // Second pass starts from the new lastSeen (b); no descendants remain.
    let posted_up_to = post_descendants(&graph, &dbc, &hash("b"), &master(), false).await.unwrap();
    assert_eq!(posted_up_to, None);
    assert_eq!(dbc.posts.lock().unwrap().len(), 1, "no further posts issued");
}
