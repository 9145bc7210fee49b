//! The dashboard client (DBC): queries whether the dashboard has already
//! seen a commit, and posts new commits to it (spec.md §4.4).
use crate::error::{Result, WatcherError};
use crate::model::Commit;
use crate::types::CommitHash;
use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;

const DASHBOARD_PROTOCOL_VERSION: u32 = 3;

/// `true` iff `commit.branch == "master"` and at least one touched file
/// starts with "include" or "src", doesn't end with "_test.go", and
/// doesn't contain "testdata" (spec.md §4.4).
pub fn needs_benchmarking(commit: &Commit) -> bool {
    commit.branch.is_master()
        && commit.files_touched().any(|f| {
            (f.starts_with("include") || f.starts_with("src"))
                && !f.ends_with("_test.go")
                && !f.contains("testdata")
        })
}

#[derive(Debug, Serialize)]
struct PostBody<'a> {
    #[serde(rename = "PackagePath")]
    package_path: &'a str,
    #[serde(rename = "Hash")]
    hash: &'a str,
    #[serde(rename = "ParentHash")]
    parent_hash: &'a str,
    #[serde(rename = "User")]
    user: &'a str,
    #[serde(rename = "Desc")]
    desc: &'a str,
    #[serde(rename = "Time")]
    time: i64,
    #[serde(rename = "Branch")]
    branch: &'a str,
    #[serde(rename = "NeedsBenchmarking")]
    needs_benchmarking: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "Error", default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct PackagesEnvelope {
    #[serde(rename = "Response", default)]
    response: Vec<PackageEntry>,
    #[serde(rename = "Error", default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    #[serde(rename = "Path")]
    pub path: String,
}

/// Queries and posts commits to an external build-coordination service.
/// Implemented by an HTTP-backed client and, for dry-run/test use, an
/// in-memory stand-in (spec.md §4.4, "dry-run mode").
#[async_trait]
pub trait DashboardClient: Send + Sync {
    async fn seen(&self, hash: &CommitHash, package_path: &str) -> Result<bool>;
    async fn post(&self, commit: &Commit, package_path: &str) -> Result<()>;
    async fn subrepo_paths(&self) -> Result<Vec<String>>;
}

/// Talks to the real dashboard over HTTPS.
pub struct HttpDashboardClient {
    client: reqwest::Client,
    base_url: String,
    key: String,
}

impl HttpDashboardClient {
    /// `base_url` must end in `/` (validated by `Config`, not here — this
    /// constructor trusts its caller).
    pub fn new(client: reqwest::Client, base_url: String, key: String) -> Self {
        HttpDashboardClient {
            client,
            base_url,
            key,
        }
    }
}

#[async_trait]
impl DashboardClient for HttpDashboardClient {
    async fn seen(&self, hash: &CommitHash, package_path: &str) -> Result<bool> {
        let url = format!("{}commit", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("hash", hash.as_str()), ("packagePath", package_path)])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(WatcherError::HttpBoundary {
                url,
                status: status.as_u16(),
                body,
            });
        }
        let envelope: ErrorEnvelope = serde_json::from_str(&body).map_err(|_| WatcherError::HttpBoundary {
            url: url.clone(),
            status: status.as_u16(),
            body: body.clone(),
        })?;
        match envelope.error.as_str() {
            "" => Ok(true),
            "Commit not found" => Ok(false),
            other => Err(WatcherError::HttpBoundary {
                url,
                status: status.as_u16(),
                body: other.to_string(),
            }),
        }
    }

    async fn post(&self, commit: &Commit, package_path: &str) -> Result<()> {
        let time = parse_rfc_date(&commit.date_rfc)?;
        let url = format!("{}commit", self.base_url);
        let body = PostBody {
            package_path,
            hash: commit.hash.as_str(),
            parent_hash: commit.parent_hash.as_ref().map(CommitHash::as_str).unwrap_or(""),
            user: &commit.author_line,
            desc: &commit.desc,
            time,
            branch: commit.branch.as_str(),
            needs_benchmarking: needs_benchmarking(commit),
        };
        let resp = self
            .client
            .post(&url)
            .query(&[
                ("version", DASHBOARD_PROTOCOL_VERSION.to_string()),
                ("key", self.key.clone()),
            ])
            .header("Content-Type", "text/json")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let response_body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(WatcherError::HttpBoundary {
                url,
                status: status.as_u16(),
                body: response_body,
            });
        }
        let envelope: ErrorEnvelope =
            serde_json::from_str(&response_body).map_err(|_| WatcherError::HttpBoundary {
                url: url.clone(),
                status: status.as_u16(),
                body: response_body.clone(),
            })?;
        if envelope.error.contains("this package already has a first commit; aborting") {
            return Err(WatcherError::AlreadyHasFirstCommit);
        }
        if !envelope.error.is_empty() {
            return Err(WatcherError::HttpBoundary {
                url,
                status: status.as_u16(),
                body: envelope.error,
            });
        }
        Ok(())
    }

    async fn subrepo_paths(&self) -> Result<Vec<String>> {
        let url = format!("{}packages", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("kind", "subrepo")])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(WatcherError::HttpBoundary {
                url,
                status: status.as_u16(),
                body,
            });
        }
        let envelope: PackagesEnvelope =
            serde_json::from_str(&body).map_err(|_| WatcherError::HttpBoundary {
                url: url.clone(),
                status: status.as_u16(),
                body: body.clone(),
            })?;
        if !envelope.error.is_empty() {
            return Err(WatcherError::HttpBoundary {
                url,
                status: status.as_u16(),
                body: envelope.error,
            });
        }
        Ok(envelope.response.into_iter().map(|p| p.path).collect())
    }
}

/// Parses `spec.md`'s RFC-1123-style `dateRFC` into a Unix timestamp.
fn parse_rfc_date(date_rfc: &str) -> Result<i64> {
    DateTime::parse_from_rfc2822(date_rfc)
        .map(|dt| dt.timestamp())
        .map_err(|_| WatcherError::UnparseableDate(date_rfc.to_string()))
}

/// An in-memory stand-in for the dashboard, used when `network=false` or
/// `report=false`. Records posted hashes and refuses to post a commit whose
/// parent has not previously been posted (spec.md §4.4).
#[derive(Default)]
pub struct DryRunDashboardClient {
    posted: Mutex<HashSet<CommitHash>>,
}

impl DryRunDashboardClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_posted(&self, hash: &CommitHash) -> bool {
        self.posted.lock().expect("dry-run lock poisoned").contains(hash)
    }
}

#[async_trait]
impl DashboardClient for DryRunDashboardClient {
    async fn seen(&self, hash: &CommitHash, _package_path: &str) -> Result<bool> {
        Ok(self.has_posted(hash))
    }

    async fn post(&self, commit: &Commit, _package_path: &str) -> Result<()> {
        if let Some(parent) = &commit.parent_hash {
            if !self.has_posted(parent) {
                return Err(WatcherError::MissingParent {
                    child: commit.hash.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        tracing::info!(hash = %commit.hash, branch = %commit.branch, "dry-run");
        self.posted
            .lock()
            .expect("dry-run lock poisoned")
            .insert(commit.hash.clone());
        Ok(())
    }

    async fn subrepo_paths(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Wraps another `DashboardClient` so `post` is a no-op when `report=false`
/// (spec.md §6, "report"): `seen` and `subrepo_paths` still reach the inner
/// client, only the posting side-effect is suppressed.
pub struct ReportGatedDashboardClient {
    inner: std::sync::Arc<dyn DashboardClient>,
    report: bool,
}

impl ReportGatedDashboardClient {
    pub fn new(inner: std::sync::Arc<dyn DashboardClient>, report: bool) -> Self {
        ReportGatedDashboardClient { inner, report }
    }
}

#[async_trait]
impl DashboardClient for ReportGatedDashboardClient {
    async fn seen(&self, hash: &CommitHash, package_path: &str) -> Result<bool> {
        self.inner.seen(hash, package_path).await
    }

    async fn post(&self, commit: &Commit, package_path: &str) -> Result<()> {
        if !self.report {
            tracing::info!(hash = %commit.hash, branch = %commit.branch, "dry-run");
            return Ok(());
        }
        self.inner.post(commit, package_path).await
    }

    async fn subrepo_paths(&self) -> Result<Vec<String>> {
        self.inner.subrepo_paths().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BranchName;
    use std::str::FromStr;

    fn commit(branch: &str, files: &str) -> Commit {
        Commit {
            hash: CommitHash::from_str(&"a".repeat(40)).unwrap(),
            author_line: "Jane Doe <jane@example.com>".into(),
            date_rfc: "Mon, 02 Jan 2006 15:04:05 -0700".into(),
            desc: "change things".into(),
            parent_hash: None,
            branch: BranchName::from_str(branch).unwrap(),
            files: files.into(),
            children: Vec::new(),
        }
    }

    #[test]
    fn needs_benchmarking_true_for_master_src_change() {
        assert!(needs_benchmarking(&commit("master", "src/compile.go")));
    }

    #[test]
    fn needs_benchmarking_false_off_master() {
        assert!(!needs_benchmarking(&commit("dev.fuzz", "src/compile.go")));
    }

    #[test]
    fn needs_benchmarking_false_for_test_only_change() {
        assert!(!needs_benchmarking(&commit("master", "src/compile_test.go")));
    }

    #[test]
    fn needs_benchmarking_false_for_testdata() {
        assert!(!needs_benchmarking(&commit("master", "src/testdata/foo.go")));
    }

    #[test]
    fn needs_benchmarking_false_for_unrelated_path() {
        assert!(!needs_benchmarking(&commit("master", "doc/README.md")));
    }

    #[test]
    fn parses_rfc1123_date() {
        assert!(parse_rfc_date("Mon, 02 Jan 2006 15:04:05 -0700").is_ok());
        assert!(parse_rfc_date("not a date").is_err());
    }

    #[tokio::test]
    async fn dry_run_refuses_to_post_before_parent() {
        let dbc = DryRunDashboardClient::new();
        let mut c = commit("master", "src/a.go");
        c.parent_hash = Some(CommitHash::from_str(&"b".repeat(40)).unwrap());
        let err = dbc.post(&c, "").await.unwrap_err();
        assert!(matches!(err, WatcherError::MissingParent { .. }));
    }

    #[tokio::test]
    async fn dry_run_accepts_initial_commit_then_its_child() {
        let dbc = DryRunDashboardClient::new();
        let root = commit("master", "");
        dbc.post(&root, "").await.unwrap();

        let mut child = commit("master", "src/b.go");
        child.hash = CommitHash::from_str(&"c".repeat(40)).unwrap();
        child.parent_hash = Some(root.hash.clone());
        dbc.post(&child, "").await.unwrap();

        assert!(dbc.seen(&child.hash, "").await.unwrap());
    }

    #[tokio::test]
    async fn report_gated_client_skips_post_but_not_seen() {
        let inner = std::sync::Arc::new(DryRunDashboardClient::new());
        let gated = ReportGatedDashboardClient::new(inner.clone(), false);
        let root = commit("master", "src/a.go");
        gated.post(&root, "").await.unwrap();
        // The inner dry-run client never actually recorded the post.
        assert!(!inner.has_posted(&root.hash));
        assert!(!gated.seen(&root.hash, "").await.unwrap());
    }
}
