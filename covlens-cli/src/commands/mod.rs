pub mod analyze;
pub mod discover;
pub mod init;
pub mod summary;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a default `.covlens/config.toml` for a project
    Init(init::InitArgs),
    /// Analyze a project and write coverage reports
    Analyze(analyze::AnalyzeArgs),
    /// Print the one-line coverage summary and low-coverage units
    Summary(summary::SummaryArgs),
    /// Show the execution record and artifacts that would be analyzed
    Discover(discover::DiscoverArgs),
}

pub async fn run(cmd: Command, quiet: bool) -> anyhow::Result<()> {
    match cmd {
        Command::Init(args) => init::run(args).await,
        Command::Analyze(args) => analyze::run(args, quiet).await,
        Command::Summary(args) => summary::run(args).await,
        Command::Discover(args) => discover::run(args).await,
    }
}

/// Canonical project root for a command-line path.
fn resolve_project(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::canonicalize(path)
        .with_context(|| format!("Cannot resolve path: {}", path.display()))
}

/// Token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling analysis");
            child.cancel();
        }
    });
    token
}
