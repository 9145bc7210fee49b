//! `revwatch`: the per-repository watcher engine at the heart of a
//! multi-repository commit-watching and publishing system (spec.md §1-2).
//!
//! A [`supervisor::Supervisor`] discovers the repositories to watch and
//! spawns one [`watcher::RepositoryWatcher`] per repository. Each watcher
//! owns a [`vca::Vca`] (a subprocess-backed mirror clone), a
//! [`graph::CommitGraphStore`], and a [`status_ring::StatusRing`], and
//! drives a fetch -> push -> post loop gated by the cross-repo
//! [`tickler::TicklerRegistry`] and a safety-net timer. New commits are
//! reported to the [`dashboard::DashboardClient`]; a secondary mirror
//! remote is updated via the same [`vca::Vca`].

pub mod commitlog;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod graph;
pub mod http;
pub mod model;
pub mod refs;
pub mod retry;
pub mod status_ring;
pub mod supervisor;
pub mod tickler;
pub mod types;
pub mod upstream;
pub mod vca;
pub mod watcher;

pub use crate::error::{Result, WatcherError};
pub use crate::supervisor::Supervisor;

/// Convenient import for the types most consumers of this crate need:
/// the configuration surface, the unified error type, and the validated
/// newtypes shared across every component.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Result, WatcherError};
    pub use crate::model::{Branch, Commit};
    pub use crate::types::{BranchName, CommitHash, GitUrl, RepoName};
}
