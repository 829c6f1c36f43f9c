use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;

use covlens_core::error::{CovlensError, RenderError};
use covlens_core::pipeline::CoveragePipeline;
use covlens_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter};
use covlens_core::render::summary_line;
use covlens_core::session::CoverageSession;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Execution-record file (default: config, then discovery)
    #[arg(long)]
    pub exec: Option<PathBuf>,

    /// Class file or directory to analyze; repeatable (default: config, then discovery)
    #[arg(long = "artifact")]
    pub artifacts: Vec<PathBuf>,

    /// Comma-separated report formats (default: use config)
    #[arg(long)]
    pub format: Option<String>,

    /// Output directory (default: use config)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Print a single format to stdout instead of writing files
    #[arg(long, value_name = "FORMAT")]
    pub stdout: Option<String>,
}

pub async fn run(args: AnalyzeArgs, quiet: bool) -> anyhow::Result<()> {
    let project = super::resolve_project(&args.path)?;
    let progress: Arc<dyn ProgressReporter> = if quiet || args.stdout.is_some() {
        Arc::new(NoopReporter)
    } else {
        Arc::new(IndicatifReporter::stderr())
    };

    let mut pipeline = CoveragePipeline::new(&project)
        .context("Cannot load config")?
        .with_progress(progress);

    // Command-line paths are relative to the working directory.
    let cwd = std::env::current_dir().context("Cannot read current directory")?;
    if let Some(exec) = &args.exec {
        pipeline.config_mut().analysis.exec_file = Some(cwd.join(exec));
    }
    if !args.artifacts.is_empty() {
        pipeline.config_mut().analysis.artifacts =
            args.artifacts.iter().map(|p| cwd.join(p)).collect();
    }

    let formats: Vec<String> = match &args.format {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => pipeline.config().report.formats.clone(),
    };
    let output_dir = match &args.output_dir {
        Some(dir) => cwd.join(dir),
        None => pipeline.output_dir(),
    };

    let session = CoverageSession::new(pipeline);
    let (snapshot, stats) = session
        .run(super::cancel_on_ctrl_c())
        .await
        .context("Analysis failed")?;
    let pipeline = session.pipeline();
    let ctx = pipeline.report_context(snapshot.completed_at);

    if let Some(format) = &args.stdout {
        let renderer = CoveragePipeline::build_renderer(format)
            .ok_or_else(|| RenderError::UnknownFormat(format.clone()))
            .map_err(CovlensError::from)
            .context("Rendering failed")?;
        let content = renderer
            .render(&snapshot.result, &ctx)
            .context("Rendering failed")?;
        print!("{content}");
        return Ok(());
    }

    let names: Vec<&str> = formats.iter().map(String::as_str).collect();
    let rendered = pipeline
        .run_renderers(&snapshot.result, &ctx, &names, &output_dir)
        .context("Rendering failed")?;

    if snapshot.result.is_empty() {
        println!("{}", covlens_core::render::NO_DATA_MESSAGE);
    } else {
        println!(
            "Analyzed {} units from {} artifacts in {:.2?}",
            snapshot.result.len(),
            stats.artifacts_parsed,
            stats.duration
        );
        println!("  Coverage: {}", summary_line(&snapshot.result));
    }
    for path in &rendered.written {
        println!("  Wrote {}", path.display());
    }

    let warnings: Vec<String> = stats
        .errors
        .iter()
        .map(|(path, e)| format!("{path}: {e}"))
        .chain(rendered.errors.iter().cloned())
        .collect();
    if !warnings.is_empty() {
        println!();
        println!("  Warnings ({}):", warnings.len());
        for warning in &warnings {
            println!("    - {warning}");
        }
    }

    Ok(())
}
