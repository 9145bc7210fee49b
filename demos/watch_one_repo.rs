// demos/watch_one_repo.rs
//
// Watches a single repository against a dry-run dashboard: clones (or
// reuses) a local mirror, fetches once, walks its master branch into a
// commit-graph store, and prints which commits would be posted.

use revwatch::dashboard::{needs_benchmarking, DashboardClient, DryRunDashboardClient};
use revwatch::graph::CommitGraphStore;
use revwatch::refs::list_branches;
use revwatch::types::{BranchName, GitUrl};
use revwatch::vca::Vca;
use std::error::Error;
use std::str::FromStr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <repo_url> <mirror_dir>", args[0]);
        eprintln!(
            "Example: {} https://go.googlesource.com/crypto ./crypto-mirror",
            args[0]
        );
        return Ok(());
    }

    let src_url = GitUrl::from_str(&args[1])?;
    let mirror_dir = args[2].clone();

    println!("Reusing or cloning mirror of {src_url} at {mirror_dir}...");
    let vca = Vca::reuse_or_clone(mirror_dir, &src_url, None).await?;

    println!("Fetching...");
    vca.fetch().await?;

    let remote_heads = vca.list_remote_refs("origin").await?;
    let branches = list_branches(&remote_heads, None);
    println!("Discovered branches: {:?}", branches.iter().map(BranchName::as_str).collect::<Vec<_>>());

    let mut graph = CommitGraphStore::new();
    let dbc = DryRunDashboardClient::new();

    for branch in &branches {
        let range = format!("heads/{}", branch.as_str());
        let commits = vca.log(&range, &[]).await?;
        println!("{branch}: {} commits reachable", commits.len());
        graph.update(branch, commits)?;
    }

    if let Some(master) = branches.iter().find(|b| b.is_master()) {
        if let Some(initial) = graph.initial_commit() {
            let descendants = graph.descendant_hashes_on_branch(&initial.hash, master);
            println!(
                "\n{} commits on master from the initial commit onward would be posted:",
                descendants.len()
            );
            for hash in descendants.iter().take(10) {
                let commit = graph.get(hash).expect("descendant hash present in its own store");
                let bench = needs_benchmarking(commit);
                println!(
                    "  {} {} (needs_benchmarking={bench})",
                    &hash.as_str()[..12],
                    commit.short_desc()
                );
                dbc.post(commit, "").await?;
            }
            if descendants.len() > 10 {
                println!("  ... and {} more", descendants.len() - 10);
            }
        }
    }

    Ok(())
}
