use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tokio_util::sync::CancellationToken;

use covlens_core::pipeline::CoveragePipeline;

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[allow(clippy::unused_async)]
pub async fn run(args: DiscoverArgs) -> anyhow::Result<()> {
    let project = super::resolve_project(&args.path)?;
    let pipeline = CoveragePipeline::new(&project).context("Cannot load config")?;
    let artifacts = pipeline
        .artifact_paths(&CancellationToken::new())
        .context("Artifact discovery failed")?;

    println!("covlens discovery for {}", project.display());
    println!();
    match pipeline.exec_path() {
        Some(exec) if exec.is_file() => println!("  Execution record: {}", exec.display()),
        Some(exec) => println!("  Execution record: {} (missing)", exec.display()),
        None => println!("  Execution record: (none)"),
    }
    println!("  Artifacts: {}", artifacts.len());
    for path in &artifacts {
        let shown = path.strip_prefix(&project).unwrap_or(path);
        println!("    {}", shown.display());
    }
    Ok(())
}
