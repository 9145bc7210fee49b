//! The Supervisor (SV): discovers the set of repositories to watch, spawns
//! one Repository Watcher per repository, registers the operator HTTP
//! routes, starts the cross-repo tickler poller, and exits on the first
//! watcher failure (spec.md §4.5).
use crate::config::Config;
use crate::dashboard::{DashboardClient, DryRunDashboardClient, HttpDashboardClient, ReportGatedDashboardClient};
use crate::error::{Result, WatcherError};
use crate::http::{build_router, RepoHandle, RepoRegistry};
use crate::status_ring::StatusRing;
use crate::tickler::{run_poller, TicklerRegistry};
use crate::types::{GitUrl, RepoName};
use crate::upstream::ReviewServerClient;
use crate::vca::Vca;
use crate::watcher::RepositoryWatcher;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// One entry in the plan of repositories to watch, built during startup
/// before any `RepositoryWatcher` is constructed.
struct RepoPlan {
    name: RepoName,
    package_path: String,
    src_url: GitUrl,
    dash_enabled: bool,
    mirror_enabled: bool,
}

pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Supervisor { config }
    }

    /// Runs the Supervisor to completion: it only returns once every RW, the
    /// tickler poller, or the HTTP server has reported a fatal error (spec.md
    /// §4.5 step 7). There is no graceful shutdown path (spec.md §5).
    pub async fn run(self) -> Result<()> {
        let config = self.config;
        let repo_url = config.repo_url()?;
        let dash_url = config.dash_url()?.to_string();

        let http_client = reqwest::Client::new();

        let dbc: Arc<dyn DashboardClient> = if config.network {
            let key = config.load_key().await?;
            Arc::new(HttpDashboardClient::new(http_client.clone(), dash_url.clone(), key))
        } else {
            Arc::new(DryRunDashboardClient::new())
        };
        // spec.md §6, "report": false makes posting a no-op independently of
        // `network` — wrap unconditionally, the gate checks `report` itself.
        let dbc: Arc<dyn DashboardClient> = Arc::new(ReportGatedDashboardClient::new(dbc, config.report));

        let review_server = ReviewServerClient::new(http_client.clone(), dash_url.clone());

        tracing::info!(repo_url = %repo_url, dash_url = %dash_url, "supervisor starting");

        let cache_root = choose_cache_root(&config).await?;
        let cache_root_path = cache_root.path().to_path_buf();

        let mut plan = vec![RepoPlan {
            name: RepoName::main(),
            package_path: String::new(),
            src_url: repo_url.clone(),
            dash_enabled: true,
            mirror_enabled: config.mirror,
        }];

        // spec.md §4.5 step 2: discover subrepositories from the dashboard.
        for path in dbc.subrepo_paths().await? {
            let name = RepoName::new(path.clone())?;
            let src_url: GitUrl = format!("{}/{}", repo_url, path)
                .parse()
                .map_err(|_| WatcherError::InvalidFormat {
                    kind: "subrepository URL",
                    value: path.clone(),
                })?;
            plan.push(RepoPlan {
                name,
                package_path: path,
                src_url,
                dash_enabled: true,
                mirror_enabled: config.mirror,
            });
        }

        // spec.md §4.5 step 4: repositories named only by the cross-repo
        // tickler, not already covered above, are watched mirror-only
        // (`dash=false`) when mirroring is enabled. We resolve this set once
        // at startup from the upstream review server's metadata document,
        // gated by the dual allow-list/liveness mechanism (spec.md §9, Open
        // Questions; resolution recorded in DESIGN.md).
        if config.mirror {
            let covered: std::collections::HashSet<RepoName> = plan.iter().map(|p| p.name.clone()).collect();
            let allow_list: std::collections::HashSet<RepoName> = config.mirror_allow_list()?.into_iter().collect();
            match review_server.fetch_master_heads().await {
                Ok(heads) => {
                    for name in heads.into_iter().map(|(name, _)| name) {
                        if covered.contains(&name) {
                            continue;
                        }
                        let eligible = allow_list.contains(&name) || review_server.repo_is_live(&name).await;
                        if !eligible {
                            continue;
                        }
                        let src_url: GitUrl = format!("{}/{}", repo_url, name.as_str())
                            .parse()
                            .map_err(|_| WatcherError::InvalidFormat {
                                kind: "mirror-only repository URL",
                                value: name.as_str().to_string(),
                            })?;
                        plan.push(RepoPlan {
                            package_path: name.as_str().to_string(),
                            name,
                            src_url,
                            dash_enabled: false,
                            mirror_enabled: true,
                        });
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "could not discover mirror-only repositories at startup");
                }
            }
        }

        let tickler = Arc::new(TicklerRegistry::new());
        let (err_tx, mut err_rx) = mpsc::channel::<(RepoName, WatcherError)>(plan.len().max(1));

        let mut repo_handles: HashMap<RepoName, Arc<RepoHandle>> = HashMap::new();
        let mut join_handles = Vec::with_capacity(plan.len());

        for entry in plan {
            let dir = cache_root_path.join(sanitize_for_path(&entry.name));
            let vca = Vca::reuse_or_clone(dir, &entry.src_url, None).await?;
            let status = Arc::new(StatusRing::new());
            let tickler_rx = tickler.channel_for(&entry.name);

            repo_handles.insert(
                entry.name.clone(),
                Arc::new(RepoHandle {
                    vca: vca.clone(),
                    status: status.clone(),
                }),
            );

            let rw = RepositoryWatcher {
                name: entry.name.clone(),
                vca,
                dbc: dbc.clone(),
                dash_enabled: entry.dash_enabled,
                mirror_enabled: entry.mirror_enabled,
                package_path: entry.package_path,
                path_filters: if entry.name.is_main() { config.filter_paths() } else { Vec::new() },
                explicit_branches: config.explicit_branches(),
                status,
                tickler: tickler_rx,
            };

            let name_for_err = entry.name.clone();
            let err_tx = err_tx.clone();
            join_handles.push(tokio::spawn(async move {
                if let Err(err) = rw.run().await {
                    let _ = err_tx.send((name_for_err, err)).await;
                }
            }));
        }

        let poll_interval = config.poll_interval();
        let poller_tickler = tickler.clone();
        let poller_err_tx = err_tx.clone();
        join_handles.push(tokio::spawn(async move {
            run_poller(review_server, &poller_tickler, poll_interval).await;
            let _ = poller_err_tx
                .send((RepoName::main(), WatcherError::Configuration("tickler poller exited".into())))
                .await;
        }));

        if let Some(addr) = config.http_addr.clone().filter(|a| !a.is_empty()) {
            let registry: RepoRegistry = Arc::new(repo_handles);
            let router = build_router(registry);
            let http_err_tx = err_tx.clone();
            join_handles.push(tokio::spawn(async move {
                match tokio::net::TcpListener::bind(&addr).await {
                    Ok(listener) => {
                        tracing::info!(addr = %addr, "http server listening");
                        if let Err(err) = axum::serve(listener, router).await {
                            let _ = http_err_tx
                                .send((RepoName::main(), WatcherError::Configuration(format!("http server: {err}"))))
                                .await;
                        }
                    }
                    Err(err) => {
                        let _ = http_err_tx
                            .send((RepoName::main(), WatcherError::Io(err)))
                            .await;
                    }
                }
            }));
        }
        drop(err_tx);

        // spec.md §4.5 step 7: wait on a single error channel; the first
        // error terminates the process. There is no per-repository
        // quarantine (spec.md §7, Propagation policy).
        match err_rx.recv().await {
            Some((repo, err)) => {
                tracing::error!(repo = %repo, error = %err, "fatal watcher error, shutting down");
                for handle in &join_handles {
                    handle.abort();
                }
                Err(err)
            }
            None => Ok(()),
        }
    }
}

/// The Supervisor's chosen working directory: either a reused, operator-
/// supplied cache root, or a freshly created one that is removed when this
/// value drops (spec.md §4.5 step 3, "...cleaned up on exit").
enum CacheRoot {
    Reused(PathBuf),
    Fresh(TempDir),
}

impl CacheRoot {
    fn path(&self) -> &Path {
        match self {
            CacheRoot::Reused(p) => p,
            CacheRoot::Fresh(t) => t.path(),
        }
    }
}

/// Chooses the Supervisor's working directory: reuses a pre-existing cache
/// root if it is already a directory, else creates a fresh temporary one
/// (spec.md §4.5 step 3). The caller must keep the returned value alive for
/// the Supervisor's whole lifetime — dropping `CacheRoot::Fresh` deletes the
/// directory.
async fn choose_cache_root(config: &Config) -> Result<CacheRoot> {
    if let Some(root) = &config.cache_root {
        if tokio::fs::metadata(root).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Ok(CacheRoot::Reused(root.clone()));
        }
    }
    let dir = tempfile::Builder::new()
        .prefix("revwatch-")
        .tempdir()
        .map_err(WatcherError::Io)?;
    Ok(CacheRoot::Fresh(dir))
}

/// Repository names are validated free of `/` (see `RepoName`), but the main
/// repository's name is empty; give it a stable, non-empty directory name.
fn sanitize_for_path(name: &RepoName) -> &str {
    if name.is_main() {
        "__main__"
    } else {
        name.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_for_path_gives_main_repo_a_stable_name() {
        assert_eq!(sanitize_for_path(&RepoName::main()), "__main__");
        let sub = RepoName::new("crypto/bcrypt").unwrap_err();
        assert!(matches!(sub, WatcherError::InvalidFormat { .. }));
        let sub = RepoName::new("bcrypt").unwrap();
        assert_eq!(sanitize_for_path(&sub), "bcrypt");
    }

    #[tokio::test]
    async fn choose_cache_root_creates_a_fresh_directory_when_unconfigured() {
        let config = Config {
            repo_url: "https://example.com/repo.git".into(),
            dash_url: "https://dash.example.com/".into(),
            key_file: PathBuf::from("/tmp/does-not-matter"),
            poll_interval_secs: 10,
            network: false,
            mirror: false,
            filter: None,
            branches: None,
            http_addr: None,
            report: true,
            mirror_allow_list: Vec::new(),
            cache_root: None,
        };
        let root = choose_cache_root(&config).await.unwrap();
        let dir = root.path().to_path_buf();
        assert!(dir.is_dir());
        drop(root);
        assert!(!dir.is_dir(), "dropping a fresh CacheRoot should remove the directory");
    }

    #[tokio::test]
    async fn choose_cache_root_reuses_an_existing_directory() {
        let existing = tempfile::tempdir().unwrap();
        let config = Config {
            repo_url: "https://example.com/repo.git".into(),
            dash_url: "https://dash.example.com/".into(),
            key_file: PathBuf::from("/tmp/does-not-matter"),
            poll_interval_secs: 10,
            network: false,
            mirror: false,
            filter: None,
            branches: None,
            http_addr: None,
            report: true,
            mirror_allow_list: Vec::new(),
            cache_root: Some(existing.path().to_path_buf()),
        };
        let root = choose_cache_root(&config).await.unwrap();
        assert_eq!(root.path(), existing.path());
    }
}
