// Pipeline orchestrator — Analyze → Aggregate → Render with batch error handling.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::analyze::{AnalyzeStats, Analyzer, CoverageAggregator};
use crate::config::CovlensConfig;
use crate::discover;
use crate::engine::BytecodeEngine;
use crate::error::RenderError;
use crate::progress::ProgressReporter;
use crate::render::html::HtmlRenderer;
use crate::render::json::JsonRenderer;
use crate::render::text::TextRenderer;
use crate::render::tree::TreeRenderer;
use crate::render::{ReportContext, ReportRenderer, ReportSettings};
use crate::types::AnalysisResult;

/// One completed Analyze → Aggregate pass.
#[derive(Debug)]
pub struct AnalysisRun {
    pub result: AnalysisResult,
    pub stats: AnalyzeStats,
    pub completed_at: DateTime<Utc>,
}

/// Outcome of a render batch.
#[derive(Debug, Default)]
pub struct RenderResult {
    pub artifacts_written: u64,
    pub written: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub duration: Duration,
}

/// Orchestrates one project's analysis and report rendering.
pub struct CoveragePipeline {
    project_root: PathBuf,
    config: CovlensConfig,
    analyzer: Analyzer,
}

impl std::fmt::Debug for CoveragePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoveragePipeline")
            .field("project_root", &self.project_root)
            .field("analyzer", &self.analyzer)
            .finish_non_exhaustive()
    }
}

impl CoveragePipeline {
    /// Every renderer name, in the order `--all` style callers run them.
    pub const ALL_RENDERER_NAMES: &[&str] = &["text", "tree", "html", "json"];

    /// Pipeline for `project_root`, configured from `.covlens/config.toml` when present.
    pub fn new(project_root: impl Into<PathBuf>) -> crate::error::Result<Self> {
        let project_root = project_root.into();
        let config = CovlensConfig::load_or_default(&project_root)?;
        Ok(Self::with_config(project_root, config))
    }

    pub fn with_config(project_root: impl Into<PathBuf>, config: CovlensConfig) -> Self {
        Self {
            project_root: project_root.into(),
            config,
            analyzer: Analyzer::new(Arc::new(BytecodeEngine)),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.analyzer = self.analyzer.with_progress(progress);
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config(&self) -> &CovlensConfig {
        &self.config
    }

    /// Mutable access for command-line overrides.
    pub fn config_mut(&mut self) -> &mut CovlensConfig {
        &mut self.config
    }

    /// Configured project name, else the project directory name.
    pub fn project_name(&self) -> String {
        if let Some(name) = &self.config.report.project_name {
            return name.clone();
        }
        self.project_root
            .file_name()
            .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Report output directory, resolved against the project root.
    pub fn output_dir(&self) -> PathBuf {
        self.project_root.join(&self.config.report.output_dir)
    }

    /// Configured execution-record file, else the first conventional one.
    pub fn exec_path(&self) -> Option<PathBuf> {
        match &self.config.analysis.exec_file {
            Some(path) => Some(self.project_root.join(path)),
            None => discover::find_exec_file(&self.project_root),
        }
    }

    /// Configured artifact paths, else discovered class files.
    pub fn artifact_paths(&self, token: &CancellationToken) -> crate::error::Result<Vec<PathBuf>> {
        let configured = &self.config.analysis.artifacts;
        if configured.is_empty() {
            discover::find_artifacts(
                &self.project_root,
                &self.config.analysis.exclude_patterns,
                token,
            )
        } else {
            Ok(configured
                .iter()
                .map(|p| self.project_root.join(p))
                .collect())
        }
    }

    pub fn settings(&self) -> ReportSettings {
        ReportSettings::from_config(&self.config.report)
    }

    /// Render context for a result completed at `generated_at`.
    pub fn report_context(&self, generated_at: DateTime<Utc>) -> ReportContext {
        ReportContext::new(self.project_name(), generated_at).with_settings(self.settings())
    }

    /// Run Analyze → Aggregate. Blocking; async callers go through
    /// [`CoverageSession`](crate::session::CoverageSession).
    #[instrument(skip_all, name = "pipeline", fields(root = %self.project_root.display()))]
    pub fn analyze(&self, token: &CancellationToken) -> crate::error::Result<AnalysisRun> {
        let artifacts = self.artifact_paths(token)?;
        let exec = self.exec_path();
        let output = self.analyzer.run(&artifacts, exec.as_deref(), token)?;
        let result = CoverageAggregator::from_config(&self.config.report).aggregate(&output.units);
        Ok(AnalysisRun {
            result,
            stats: output.stats,
            completed_at: Utc::now(),
        })
    }

    /// Construct a renderer by name.
    pub fn build_renderer(name: &str) -> Option<Box<dyn ReportRenderer>> {
        match name {
            "text" => Some(Box::new(TextRenderer)),
            "tree" => Some(Box::new(TreeRenderer)),
            "html" => Some(Box::new(HtmlRenderer)),
            "json" => Some(Box::new(JsonRenderer)),
            _ => None,
        }
    }

    /// Write each named report into `output_dir`.
    ///
    /// Unknown names fail before anything is written. A renderer that fails
    /// to write is recorded and the rest still run; the batch fails only when
    /// nothing could be written.
    #[instrument(skip_all, name = "render", fields(renderers = names.len()))]
    pub fn run_renderers(
        &self,
        result: &AnalysisResult,
        ctx: &ReportContext,
        names: &[&str],
        output_dir: &Path,
    ) -> crate::error::Result<RenderResult> {
        let start = Instant::now();
        let renderers = names
            .iter()
            .map(|name| {
                Self::build_renderer(name)
                    .ok_or_else(|| RenderError::UnknownFormat((*name).to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = RenderResult::default();
        let mut last_error = None;
        for renderer in &renderers {
            match renderer.write(result, ctx, output_dir) {
                Ok(path) => {
                    out.artifacts_written += 1;
                    out.written.push(path);
                }
                Err(e) => {
                    warn!(renderer = renderer.name(), error = %e, "Renderer failed");
                    out.errors.push(format!("{}: {e}", renderer.name()));
                    last_error = Some(e);
                }
            }
        }
        out.duration = start.elapsed();

        if out.artifacts_written == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        info!(
            written = out.artifacts_written,
            errors = out.errors.len(),
            duration = ?out.duration,
            "Render complete"
        );
        Ok(out)
    }
}
