//! `revwatch`: watches a family of repositories hosted on an upstream
//! review server and reports new revisions to a build-coordination
//! dashboard, optionally mirroring them to a secondary remote (spec.md §1).
use clap::Parser;
use revwatch::config::Config;
use revwatch::supervisor::Supervisor;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();

    match Supervisor::new(config).run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "revwatch exiting");
            std::process::ExitCode::FAILURE
        }
    }
}
