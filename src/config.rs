//! The binary's typed configuration surface (spec.md §6, "Configuration").
//! Flag *parsing* mechanics are out of scope; this module defines the
//! struct those flags populate and the validation spec.md's "Configuration
//! error" class (§7.4) requires.
use crate::error::{Result, WatcherError};
use crate::types::{GitUrl, RepoName};
use clap::Parser;
use std::path::PathBuf;

/// Recognized configuration options and their effects (spec.md §6).
#[derive(Debug, Clone, Parser)]
#[command(name = "revwatch", about = "Watches a family of repositories and reports new revisions to a build dashboard.")]
pub struct Config {
    /// Upstream URL of the main repository.
    #[arg(long = "repo-url")]
    pub repo_url: String,

    /// Dashboard base URL; must end in '/'.
    #[arg(long = "dash-url")]
    pub dash_url: String,

    /// Filesystem path to the dashboard key (first line of file).
    #[arg(long = "key-file")]
    pub key_file: PathBuf,

    /// Cross-repo tickler poll interval, in seconds.
    #[arg(long = "poll-interval", default_value_t = 10)]
    pub poll_interval_secs: u64,

    /// When false, suppress all outbound HTTP; the dashboard client becomes
    /// an in-memory dry-run set. Takes an explicit value (`--network
    /// false`/`--network=false`) since the default is `true`.
    #[arg(long = "network", action = clap::ArgAction::Set, default_value_t = true)]
    pub network: bool,

    /// When true, enable the mirror push pipeline.
    #[arg(long = "mirror", default_value_t = false)]
    pub mirror: bool,

    /// Comma-separated path prefixes restricting `log` on the main
    /// repository.
    #[arg(long = "filter")]
    pub filter: Option<String>,

    /// Comma-separated explicit branch list, overriding discovery.
    #[arg(long = "branches")]
    pub branches: Option<String>,

    /// TCP listen address for the operator HTTP server; empty disables it.
    #[arg(long = "http-addr")]
    pub http_addr: Option<String>,

    /// When false, posting is a no-op that logs "dry-run". Takes an
    /// explicit value (`--report false`/`--report=false`) since the default
    /// is `true`.
    #[arg(long = "report", action = clap::ArgAction::Set, default_value_t = true)]
    pub report: bool,

    /// Repositories allowed to be mirrored even when only discovered via
    /// the cross-repo tickler (spec.md §9, Open Questions: the hard-coded
    /// half of the mirror-eligibility dual mechanism).
    #[arg(long = "mirror-allow", value_delimiter = ',')]
    pub mirror_allow_list: Vec<String>,

    /// A pre-existing directory to reuse as the Supervisor's mirror-clone
    /// cache root; when absent (or not a directory), a fresh temporary one
    /// is created and torn down on exit (spec.md §4.5 step 3).
    #[arg(long = "cache-root")]
    pub cache_root: Option<PathBuf>,
}

impl Config {
    /// `repoURL` parsed and validated.
    pub fn repo_url(&self) -> Result<GitUrl> {
        self.repo_url
            .parse()
            .map_err(|_| WatcherError::Configuration(format!("invalid repo-url: {:?}", self.repo_url)))
    }

    /// Validates `dashURL` ends in '/', per spec.md §6 and §7.4.
    pub fn dash_url(&self) -> Result<&str> {
        if self.dash_url.ends_with('/') {
            Ok(&self.dash_url)
        } else {
            Err(WatcherError::Configuration(format!(
                "dash-url must end in '/': {:?}",
                self.dash_url
            )))
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    /// Comma-separated `filter` split into individual path prefixes.
    pub fn filter_paths(&self) -> Vec<String> {
        split_csv(self.filter.as_deref())
    }

    /// Comma-separated `branches` split into individual names.
    pub fn explicit_branches(&self) -> Option<Vec<String>> {
        self.branches.as_deref().map(|csv| split_csv(Some(csv)))
    }

    pub fn mirror_allow_list(&self) -> Result<Vec<RepoName>> {
        self.mirror_allow_list
            .iter()
            .map(|name| RepoName::new(name.clone()))
            .collect()
    }

    /// Reads the dashboard key's first line from `keyFile`. Configuration
    /// error (not I/O) if the file can't be read at all, per spec.md §7.4.
    pub async fn load_key(&self) -> Result<String> {
        let contents = tokio::fs::read_to_string(&self.key_file)
            .await
            .map_err(|e| WatcherError::Configuration(format!("unreadable key file {:?}: {e}", self.key_file)))?;
        contents
            .lines()
            .next()
            .map(str::to_string)
            .ok_or_else(|| WatcherError::Configuration(format!("empty key file {:?}", self.key_file)))
    }
}

fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|csv| {
            csv.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
