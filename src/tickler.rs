//! The cross-repo tickler (CRT): a process-wide registry mapping repository
//! name to a coalesced, capacity-1 signal channel, plus a background poller
//! that wakes repository watchers when the upstream review server reports a
//! new master head (spec.md §4.6).
use crate::types::{CommitHash, RepoName};
use crate::upstream::ReviewServerClient;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Process-wide mapping from repository name to a buffered signal channel
/// of capacity 1, created lazily on first request and never torn down
/// (spec.md §9, "Process-wide tickler registry"). Guarded by a mutex since
/// both RW construction and the poller read/write it concurrently.
#[derive(Default)]
pub struct TicklerRegistry {
    senders: Mutex<HashMap<RepoName, mpsc::Sender<()>>>,
}

impl TicklerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or finds) the channel for `repo` and returns its receiver.
    /// Must be called exactly once per repository name — typically at RW
    /// construction — since only one receiver can ever drain a channel.
    pub fn channel_for(&self, repo: &RepoName) -> mpsc::Receiver<()> {
        let mut senders = self.senders.lock().expect("tickler registry lock poisoned");
        let (tx, rx) = mpsc::channel(1);
        senders.insert(repo.clone(), tx);
        rx
    }

    /// Non-blocking send; if the channel is already full the signal is
    /// dropped (coalescing). A repository with no registered channel yet is
    /// silently ignored.
    fn tickle(&self, repo: &RepoName) {
        let tx = {
            let senders = self.senders.lock().expect("tickler registry lock poisoned");
            senders.get(repo).cloned()
        };
        if let Some(tx) = tx {
            let _ = tx.try_send(());
        }
    }
}

/// Periodically polls the upstream review server's metadata document and
/// tickles every repository whose master hash has changed since the last
/// tick (spec.md §4.6).
pub async fn run_poller(
    client: ReviewServerClient,
    registry: &TicklerRegistry,
    poll_interval: Duration,
) -> ! {
    let mut last_seen: HashMap<RepoName, CommitHash> = HashMap::new();
    let mut interval = tokio::time::interval(poll_interval);
    loop {
        interval.tick().await;
        match client.fetch_master_heads().await {
            Ok(heads) => {
                for (repo, hash) in &heads {
                    if last_seen.get(repo) != Some(hash) {
                        tracing::debug!(repo = %repo, hash = %hash, "upstream master moved");
                        registry.tickle(repo);
                    }
                }
                last_seen = heads;
            }
            Err(err) => {
                tracing::debug!(error = %err, "upstream metadata poll failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str) -> RepoName {
        RepoName::new(name).unwrap()
    }

    #[test]
    fn tickle_without_a_registered_receiver_is_a_no_op() {
        let registry = TicklerRegistry::new();
        registry.tickle(&repo("crypto"));
    }

    #[tokio::test]
    async fn coalesces_multiple_tickles_into_one_pending_signal() {
        let registry = TicklerRegistry::new();
        let mut rx = registry.channel_for(&repo("crypto"));

        registry.tickle(&repo("crypto"));
        registry.tickle(&repo("crypto"));
        registry.tickle(&repo("crypto"));

        rx.try_recv().expect("one signal pending");
        assert!(rx.try_recv().is_err(), "signal should have been coalesced");
    }

    #[test]
    fn channel_for_is_idempotent_in_identity_but_replaces_the_sender() {
        let registry = TicklerRegistry::new();
        let repo_name = repo("crypto");
        let mut rx1 = registry.channel_for(&repo_name);
        let _rx2 = registry.channel_for(&repo_name);

        // rx1's paired sender has been replaced; tickles now go to rx2 only.
        registry.tickle(&repo_name);
        assert!(rx1.try_recv().is_err());
    }
}
