//! Defines core validated newtypes shared across the watcher engine:
//! repository URLs, branch names, commit hashes, and repository names.
use crate::error::{Result, WatcherError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

// Use Lazy to initialize the Regex safely and only once.
static GIT_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    // Regex from https://github.com/jonschlinkert/is-git-url - compile time checked.
    Regex::new("(?:git|ssh|https?|git@[-\\w.]+):(//)?(.*?)(\\.git)(/?|\\#[-\\d\\w._]+?)$")
        .expect("invalid static git URL regex")
});

static COMMIT_HASH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[0-9a-f]{40}$").expect("invalid static commit hash regex"));

/// Represents a validated Git URL.
///
/// Can be created from a string using `FromStr`, which validates the format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUrl {
    pub(crate) value: String,
}

impl FromStr for GitUrl {
    type Err = WatcherError;

    /// Parses a string into a `GitUrl`, returning `Err(InvalidFormat)` if
    /// the string does not match the expected Git URL pattern.
    fn from_str(value: &str) -> Result<Self> {
        if GIT_URL_REGEX.is_match(value) {
            Ok(GitUrl {
                value: String::from(value),
            })
        } else {
            Err(WatcherError::InvalidFormat {
                kind: "git URL",
                value: value.to_string(),
            })
        }
    }
}

impl Display for GitUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl AsRef<str> for GitUrl {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl AsRef<OsStr> for GitUrl {
    fn as_ref(&self) -> &OsStr {
        self.value.as_ref()
    }
}

/// Represents a validated Git branch name (or, more generally, a reference
/// name under `refs/heads/`).
///
/// Spec.md's distinguished branch "master" is just the string `"master"`;
/// there is no separate type for it (invariant C4 checks the value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BranchName {
    pub(crate) value: String,
}

impl BranchName {
    pub const MASTER: &'static str = "master";

    pub fn is_master(&self) -> bool {
        self.value == Self::MASTER
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl FromStr for BranchName {
    type Err = WatcherError;

    /// Parses a string into a `BranchName`, returning `Err(InvalidFormat)`
    /// if the string does not conform to Git's reference naming rules.
    fn from_str(s: &str) -> Result<Self> {
        if is_valid_reference_name(s) {
            Ok(BranchName {
                value: String::from(s),
            })
        } else {
            Err(WatcherError::InvalidFormat {
                kind: "branch name",
                value: s.to_string(),
            })
        }
    }
}

impl Display for BranchName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl<'de> Deserialize<'de> for BranchName {
    /// Deserializes a string into a `BranchName`, validating the format.
    fn deserialize<D>(deserializer: D) -> std::result::Result<BranchName, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BranchName::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A validated 40-character lowercase-hex commit identity (spec.md §3,
/// `Commit.hash`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommitHash {
    pub(crate) value: String,
}

impl CommitHash {
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl FromStr for CommitHash {
    type Err = WatcherError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        if COMMIT_HASH_REGEX.is_match(&lower) {
            Ok(CommitHash { value: lower })
        } else {
            Err(WatcherError::InvalidFormat {
                kind: "commit hash",
                value: s.to_string(),
            })
        }
    }
}

impl Display for CommitHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl AsRef<str> for CommitHash {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl<'de> Deserialize<'de> for CommitHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<CommitHash, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CommitHash::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A repository's logical name: the main repository's import path is empty
/// (glossary, "Main repository"); subrepositories and mirror-only
/// repositories use their base import path. Validated to be safe as an HTTP
/// path segment (`/<name>.tar.gz`, `/debug/watcher/<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoName {
    value: String,
}

impl RepoName {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.contains('/') || value.contains("..") {
            return Err(WatcherError::InvalidFormat {
                kind: "repository name",
                value,
            });
        }
        Ok(RepoName { value })
    }

    /// The main repository, whose import path is empty.
    pub fn main() -> Self {
        RepoName {
            value: String::new(),
        }
    }

    pub fn is_main(&self) -> bool {
        self.value.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl Display for RepoName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "(main)")
        } else {
            write!(f, "{}", self.value)
        }
    }
}

// --- Internal validation logic ---

const INVALID_REFERENCE_CHARS: [char; 5] = [' ', '~', '^', ':', '\\'];
const INVALID_REFERENCE_START: &str = "-";
const INVALID_REFERENCE_END: &str = ".";

/// Checks if a string is a valid Git reference name based on common rules.
///
/// Rules approximated from `git check-ref-format`.
/// See: https://git-scm.com/docs/git-check-ref-format
fn is_valid_reference_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(INVALID_REFERENCE_START)
        && !name.ends_with(INVALID_REFERENCE_END)
        && name.chars().all(|c| {
            !c.is_ascii_control() && INVALID_REFERENCE_CHARS.iter().all(|invalid| c != *invalid)
        })
        && !name.contains("/.")
        && !name.contains("@{")
        && !name.contains("..")
        && name != "@"
        && !name.contains("//")
        && !name.contains("/*")
        && !name.contains('?')
        && !name.contains('[')
        && !name.contains(']')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_git_urls() {
        let valid_urls = vec![
            "git://github.com/ember-cli/ember-cli.git#ff786f9f",
            "git://host.xz/path/to/repo.git/",
            "git@github.com:user/project.git",
            "http://github.com/user/project.git",
            "https://github.com/user/project.git",
            "ssh://user@host.xz/path/to/repo.git/",
        ];

        for url in valid_urls.iter() {
            assert!(GitUrl::from_str(url).is_ok(), "expected valid: {url}");
        }
    }

    #[test]
    fn test_invalid_git_urls() {
        let invalid_urls = vec![
            "/path/to/repo.git/",
            "path/to/repo.git/",
            "~/path/to/repo.git",
        ];

        for url in invalid_urls.iter() {
            assert!(GitUrl::from_str(url).is_err(), "expected invalid: {url}");
        }
    }

    #[test]
    fn test_valid_reference_names() {
        for reference_name in ["master", "a/valid/ref", "v1.0.0", "release-branch.go1.42"] {
            assert!(BranchName::from_str(reference_name).is_ok());
        }
    }

    #[test]
    fn test_invalid_reference_names() {
        for reference_name in ["", "double..dot", "@", ".start", "end.", "with space"] {
            assert!(BranchName::from_str(reference_name).is_err());
        }
    }

    #[test]
    fn test_commit_hash_requires_forty_hex_chars() {
        assert!(CommitHash::from_str(&"a".repeat(40)).is_ok());
        assert!(CommitHash::from_str(&"A".repeat(40)).is_ok()); // normalized to lowercase
        assert!(CommitHash::from_str("deadbeef").is_err());
        assert!(CommitHash::from_str(&"g".repeat(40)).is_err());
    }

    #[test]
    fn test_repo_name_rejects_path_separators() {
        assert!(RepoName::new("crypto/bcrypt").is_err());
        assert!(RepoName::new("crypto").is_ok());
        assert!(RepoName::main().is_main());
    }
}
