use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use covlens_core::analyze::ImprovementPolicy;
use covlens_core::pipeline::CoveragePipeline;
use covlens_core::render::{format_percentage, summary_line};
use covlens_core::session::CoverageSession;

#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

pub async fn run(args: SummaryArgs) -> anyhow::Result<()> {
    let project = super::resolve_project(&args.path)?;
    let pipeline = CoveragePipeline::new(&project).context("Cannot load config")?;
    let policy = ImprovementPolicy::new(pipeline.config().report.needs_improvement_threshold);
    let session = CoverageSession::new(pipeline);

    let (snapshot, _) = session
        .run(super::cancel_on_ctrl_c())
        .await
        .context("Analysis failed")?;
    let result = &snapshot.result;

    println!("{}", summary_line(result));
    println!("Units: {}", result.len());

    let low: Vec<_> = result
        .records()
        .iter()
        .filter(|r| policy.needs_improvement(r))
        .collect();
    if !low.is_empty() {
        println!(
            "Below {} line coverage: {}",
            format_percentage(policy.threshold()),
            low.len()
        );
        for record in low {
            println!("  - {} {}", record.name, format_percentage(record.line_coverage));
        }
    }
    Ok(())
}
