//! The upstream review server's metadata client, used by the cross-repo
//! tickler poller (spec.md §4.6, §6 "Upstream metadata"). Distinct from the
//! dashboard client (DBC): this talks to the review server, not the
//! build-coordination service.
use crate::error::{Result, WatcherError};
use crate::types::{CommitHash, RepoName};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
struct RepoBranches {
    #[serde(rename = "Branches", default)]
    branches: HashMap<String, String>,
}

/// Fetches the review server's per-repository branch-head document and the
/// per-repository mirror-eligibility liveness probe (spec.md §9, Open
/// Questions: the "liveness probe against a per-name web endpoint" half of
/// the mirror-eligibility dual mechanism).
pub struct ReviewServerClient {
    client: reqwest::Client,
    metadata_url: String,
}

impl ReviewServerClient {
    pub fn new(client: reqwest::Client, metadata_url: String) -> Self {
        ReviewServerClient {
            client,
            metadata_url,
        }
    }

    /// Fetches and decodes the metadata document into `repoName -> master
    /// hash`. The body is XSSI-prefixed with a single line ending in a
    /// newline that must be discarded before JSON decoding. A repository
    /// with no "master" entry, or whose hash fails to parse, is excluded
    /// from the result rather than failing the whole fetch.
    pub async fn fetch_master_heads(&self) -> Result<HashMap<RepoName, CommitHash>> {
        let resp = self.client.get(&self.metadata_url).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(WatcherError::HttpBoundary {
                url: self.metadata_url.clone(),
                status: status.as_u16(),
                body,
            });
        }
        let json = strip_xssi_prefix(&body);
        let decoded: HashMap<String, RepoBranches> =
            serde_json::from_str(json).map_err(|_| WatcherError::HttpBoundary {
                url: self.metadata_url.clone(),
                status: status.as_u16(),
                body: body.clone(),
            })?;

        let mut heads = HashMap::new();
        for (repo, branches) in decoded {
            let Some(master_hash) = branches.branches.get("master") else {
                continue;
            };
            let Ok(hash) = CommitHash::from_str(master_hash) else {
                continue;
            };
            let Ok(name) = RepoName::new(repo) else {
                continue;
            };
            heads.insert(name, hash);
        }
        Ok(heads)
    }

    /// Probes whether `name` is "live" on the review server — the liveness
    /// half of the mirror-eligibility dual mechanism (spec.md §9).
    pub async fn repo_is_live(&self, name: &RepoName) -> bool {
        let url = format!("{}/{}", self.metadata_url.trim_end_matches('/'), name.as_str());
        match self.client.head(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Strips the single leading XSSI-protection line (anything up to and
/// including the first newline).
fn strip_xssi_prefix(body: &str) -> &str {
    match body.split_once('\n') {
        Some((_prefix, rest)) => rest,
        None => body,
    }
}
