//! The version-control adapter (VCA): a thin, subprocess-backed abstraction
//! over one local mirror clone (spec.md §4.1).
//!
//! Every operation shells out to `git` via `tokio::process::Command`, in the
//! same style as the teacher crate's `async_git` module: spawn, `.output()`,
//! classify `ErrorKind::NotFound` as "git not installed", otherwise classify
//! on exit status and decode stdout/stderr as UTF-8.
use crate::commitlog::{self, LogRecord, FILE_BOUNDARY, RECORD_BOUNDARY};
use crate::error::{Result, WatcherError};
use crate::retry::with_linear_backoff;
use crate::types::GitUrl;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str;
use std::time::Duration;
use tokio::process::Command;

const LOG_FORMAT: &str = "%H%n%P%n%an <%ae>%n%cd";
const REMOTE_REF_TIMEOUT: Duration = Duration::from_secs(5);
const FETCH_RETRY_ATTEMPTS: u32 = 3;

/// A single ref update to push: `+<hash>:<ref>`.
#[derive(Debug, Clone)]
pub struct RefUpdate {
    pub ref_name: String,
    pub hash: String,
}

/// A thin wrapper over one local mirror clone directory. Operations on
/// distinct `Vca` instances are independent; operations on the same
/// instance are naturally serialized because its owning repository watcher
/// runs on a single task (spec.md §4.1, Concurrency).
#[derive(Debug, Clone)]
pub struct Vca {
    workdir: PathBuf,
}

impl Vca {
    /// Wraps an existing local clone directory without checking that it's
    /// actually a valid mirror; operations fail later if it isn't.
    pub fn at(workdir: impl Into<PathBuf>) -> Self {
        Vca {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Creates a bare mirror clone at `dir`. Fails fatally on error, per
    /// spec.md (no retry here: a first clone failure is not transient I/O
    /// in the same sense as a re-fetch of an existing clone).
    pub async fn clone(src_url: &GitUrl, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if let Some(parent) = dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        run_git_in(
            dir.parent().unwrap_or_else(|| Path::new(".")),
            ["clone", "--mirror", src_url.as_ref(), dir_str(&dir)?],
        )
        .await?;
        Ok(Vca { workdir: dir })
    }

    /// If `dir` contains a prior mirror (has a `FETCH_HEAD` marker) and,
    /// when `dst_url` is given, a `dest` remote whose URL matches, fetches
    /// in place; otherwise wipes `dir` and clones fresh. Any ambiguity
    /// (unreadable marker, probe failure) falls through to a clone.
    pub async fn reuse_or_clone(
        dir: impl Into<PathBuf>,
        src_url: &GitUrl,
        dst_url: Option<&GitUrl>,
    ) -> Result<Self> {
        let dir = dir.into();
        let looks_reusable = async {
            if !tokio::fs::try_exists(dir.join("FETCH_HEAD")).await.unwrap_or(false) {
                return false;
            }
            let Some(dst_url) = dst_url else {
                return true;
            };
            let vca = Vca::at(&dir);
            match vca.remote_url("dest").await {
                Ok(url) => url.as_ref() == dst_url.as_ref(),
                Err(_) => false,
            }
        }
        .await;

        if looks_reusable {
            let vca = Vca::at(&dir);
            if vca.fetch().await.is_ok() {
                return Ok(vca);
            }
        }

        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Vca::clone(src_url, dir).await
    }

    /// Appends a remote stanza to the clone's configuration.
    pub async fn add_remote(&self, name: &str, url: &GitUrl) -> Result<()> {
        self.run(["remote", "add", name, url.as_ref()]).await?;
        Ok(())
    }

    /// The configured URL for `remote`, via `git config --get`.
    async fn remote_url(&self, remote: &str) -> Result<String> {
        let out = self
            .run(["config", "--get", &format!("remote.{remote}.url")])
            .await?;
        Ok(out.trim().to_string())
    }

    /// Fetches from "origin"; retries up to 3 attempts with linear
    /// back-off (5s * attempt index).
    pub async fn fetch(&self) -> Result<()> {
        with_linear_backoff("fetch", FETCH_RETRY_ATTEMPTS, || async {
            self.run(["fetch", "origin"]).await.map(|_| ())
        })
        .await
    }

    /// Produces commits reachable under `range` (e.g. `heads/master` or
    /// `abc123..heads/master`) in topological order, optionally restricted
    /// to `path_filters` (only meaningful for the main repository).
    pub async fn log(&self, range: &str, path_filters: &[String]) -> Result<Vec<LogRecord>> {
        // The record boundary opens each record rather than closing it,
        // because `--name-only` appends its file list immediately after
        // the pretty-format text (and before the next commit's output),
        // so the file boundary must be the very last literal in the
        // format string for files to land between it and the next
        // record's boundary.
        let format_arg = format!("--pretty=format:{RECORD_BOUNDARY}%n{LOG_FORMAT}%n%B{FILE_BOUNDARY}");
        let mut args: Vec<&str> = vec![
            "log",
            "--topo-order",
            "--name-only",
            "--date=rfc2822",
            &format_arg,
            range,
        ];
        if !path_filters.is_empty() {
            args.push("--");
            args.extend(path_filters.iter().map(String::as_str));
        }
        let out = self.run(args).await?;
        commitlog::parse_log(&out)
    }

    /// The best common ancestor hash of two revisions.
    pub async fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        let out = self.run(["merge-base", a, b]).await?;
        Ok(out.trim().to_string())
    }

    /// All local refs, as `refName -> hash`.
    pub async fn list_local_refs(&self) -> Result<HashMap<String, String>> {
        let out = self.run(["show-ref"]).await.unwrap_or_default();
        Ok(parse_show_ref(&out))
    }

    /// Remote refs for `remote`, as `refName -> hash`. Carries a 5-second
    /// timeout.
    pub async fn list_remote_refs(&self, remote: &str) -> Result<HashMap<String, String>> {
        let out = tokio::time::timeout(REMOTE_REF_TIMEOUT, self.run(["ls-remote", remote]))
            .await
            .map_err(|_| WatcherError::GitCommandFailed {
                stdout: String::new(),
                stderr: format!("listing remote refs for {remote} timed out after 5s"),
            })??;
        Ok(parse_ls_remote(&out))
    }

    /// Forces-pushes the given `+hash:ref` updates to `remote`.
    pub async fn push(&self, remote: &str, updates: &[RefUpdate]) -> Result<()> {
        let mut args: Vec<String> = vec!["push".into(), "--force".into(), remote.into()];
        args.extend(
            updates
                .iter()
                .map(|u| format!("+{}:{}", u.hash, u.ref_name)),
        );
        self.run(args).await?;
        Ok(())
    }

    /// Produces a gzipped tar stream of the tree at `rev`.
    pub async fn archive(&self, rev: &str) -> Result<Vec<u8>> {
        let child = Command::new("git")
            .current_dir(&self.workdir)
            .args(["archive", "--format=tar.gz", rev])
            .output()
            .await
            .map_err(classify_spawn_error)?;
        if !child.status.success() {
            return Err(WatcherError::GitCommandFailed {
                stdout: String::new(),
                stderr: String::from_utf8_lossy(&child.stderr).into_owned(),
            });
        }
        Ok(child.stdout)
    }

    async fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run_git_in(&self.workdir, args).await
    }
}

async fn run_git_in<I, S>(dir: &Path, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .await
        .map_err(classify_spawn_error)?;

    if output.status.success() {
        str::from_utf8(&output.stdout)
            .map(str::to_owned)
            .map_err(|_| WatcherError::Undecodable)
    } else {
        let stdout = str::from_utf8(&output.stdout)
            .map(|s| s.trim_end().to_owned())
            .unwrap_or_else(|_| "[stdout: undecodable UTF-8]".to_string());
        let stderr = str::from_utf8(&output.stderr)
            .map(|s| s.trim_end().to_owned())
            .unwrap_or_else(|_| "[stderr: undecodable UTF-8]".to_string());
        Err(WatcherError::GitCommandFailed { stdout, stderr })
    }
}

fn classify_spawn_error(e: std::io::Error) -> WatcherError {
    if e.kind() == ErrorKind::NotFound {
        WatcherError::GitNotFound
    } else {
        WatcherError::Execution(e)
    }
}

fn dir_str(dir: &Path) -> Result<&str> {
    dir.to_str().ok_or_else(|| WatcherError::InvalidFormat {
        kind: "path",
        value: dir.to_string_lossy().into_owned(),
    })
}

fn parse_show_ref(out: &str) -> HashMap<String, String> {
    out.lines()
        .filter_map(|line| line.split_once(' '))
        .map(|(hash, name)| (name.trim().to_string(), hash.trim().to_string()))
        .collect()
}

fn parse_ls_remote(out: &str) -> HashMap<String, String> {
    out.lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(hash, name)| (name.trim().to_string(), hash.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_show_ref_output() {
        let out = "abc123 refs/heads/master\ndef456 refs/tags/v1\n";
        let refs = parse_show_ref(out);
        assert_eq!(refs.get("refs/heads/master").unwrap(), "abc123");
        assert_eq!(refs.get("refs/tags/v1").unwrap(), "def456");
    }

    #[test]
    fn parses_ls_remote_output() {
        let out = "abc123\trefs/heads/master\ndef456\trefs/tags/v1\n";
        let refs = parse_ls_remote(out);
        assert_eq!(refs.get("refs/heads/master").unwrap(), "abc123");
        assert_eq!(refs.get("refs/tags/v1").unwrap(), "def456");
    }
}
