use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use super::aggregate::normalize_unit_name;
use super::AnalyzeOutput;
use crate::engine::CoverageEngine;
use crate::error::{ArtifactParseError, CovlensError};
use crate::exec::ExecutionStore;
use crate::progress::{NoopReporter, ProgressReporter};

/// Runs a [`CoverageEngine`] over a set of artifact paths against one
/// execution record.
pub struct Analyzer {
    engine: Arc<dyn CoverageEngine>,
    progress: Arc<dyn ProgressReporter>,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("engine", &self.engine.name())
            .finish_non_exhaustive()
    }
}

impl Analyzer {
    pub fn new(engine: Arc<dyn CoverageEngine>) -> Self {
        Self {
            engine,
            progress: Arc::new(NoopReporter),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Load the execution record (if any) and analyse every artifact.
    ///
    /// Missing paths are skipped. A record file that exists but cannot be read
    /// fails the run; artifacts that fail to parse are recorded in the stats
    /// and skipped.
    #[instrument(skip_all, name = "analyze")]
    pub fn run(
        &self,
        artifact_paths: &[PathBuf],
        exec_path: Option<&Path>,
        token: &CancellationToken,
    ) -> crate::error::Result<AnalyzeOutput> {
        let start = Instant::now();
        let store = load_store(exec_path)?;
        let files = self.expand(artifact_paths, token)?;
        let mut output = AnalyzeOutput::default();
        let stats = &mut output.stats;
        stats.artifacts_seen = files.len() as u64;

        let mut seen_names: HashSet<String> = HashSet::new();
        self.progress
            .start("Analyzing artifacts", Some(stats.artifacts_seen));

        for path in &files {
            if token.is_cancelled() {
                self.progress.finish();
                return Err(CovlensError::Cancelled);
            }
            self.progress.advance(1);
            let path_str = path.display().to_string();

            let units = match self.analyze_file(path, &store) {
                Ok(units) => units,
                Err(e) => {
                    warn!(path = %path_str, error = %e, "Skipping artifact");
                    stats.artifacts_skipped += 1;
                    stats.errors.push((path_str, e));
                    continue;
                }
            };
            stats.artifacts_parsed += 1;

            for unit in units {
                let name = normalize_unit_name(&unit.name);
                if !seen_names.insert(name.clone()) {
                    warn!(path = %path_str, unit = %name, "Duplicate unit, keeping the first");
                    stats.units_skipped += 1;
                    stats.errors.push((
                        path_str.clone(),
                        ArtifactParseError::DuplicateUnit {
                            name,
                            path: path_str.clone(),
                        },
                    ));
                    continue;
                }
                debug!(unit = %unit.name, "Unit analysed");
                output.units.push(unit);
            }
        }
        self.progress.finish();

        let stats = &mut output.stats;
        stats.units = output.units.len() as u64;
        stats.duration = start.elapsed();
        if stats.artifacts_seen == 0 {
            info!("No artifacts found");
        } else if stats.all_failed() {
            warn!(
                artifacts = stats.artifacts_seen,
                "All artifacts failed to parse"
            );
        }
        info!(
            artifacts = stats.artifacts_seen,
            parsed = stats.artifacts_parsed,
            skipped = stats.artifacts_skipped,
            units = stats.units,
            units_skipped = stats.units_skipped,
            errors = stats.errors.len(),
            duration = ?stats.duration,
            "Analysis complete"
        );
        Ok(output)
    }

    fn analyze_file(
        &self,
        path: &Path,
        store: &ExecutionStore,
    ) -> Result<Vec<crate::types::UnitCounters>, ArtifactParseError> {
        if !self.engine.accepts(path) {
            return Err(ArtifactParseError::UnsupportedFormat(
                path.display().to_string(),
            ));
        }
        let bytes = std::fs::read(path).map_err(|source| ArtifactParseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.engine.analyze(&bytes, path, store)
    }

    /// Expand directories into the artifact files they contain, sorted by name.
    fn expand(
        &self,
        artifact_paths: &[PathBuf],
        token: &CancellationToken,
    ) -> crate::error::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in artifact_paths {
            if token.is_cancelled() {
                return Err(CovlensError::Cancelled);
            }
            if path.is_dir() {
                for entry in WalkDir::new(path).sort_by_file_name() {
                    if token.is_cancelled() {
                        return Err(CovlensError::Cancelled);
                    }
                    match entry {
                        Ok(entry) if entry.file_type().is_file() => {
                            if self.engine.accepts(entry.path()) {
                                files.push(entry.into_path());
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Cannot walk artifact directory entry"),
                    }
                }
            } else if path.is_file() {
                files.push(path.clone());
            } else {
                debug!(path = %path.display(), "Artifact path does not exist, skipping");
            }
        }
        Ok(files)
    }
}

fn load_store(exec_path: Option<&Path>) -> crate::error::Result<ExecutionStore> {
    match exec_path {
        Some(path) if path.is_file() => Ok(ExecutionStore::load(path)?),
        Some(path) => {
            info!(path = %path.display(), "Execution record not found, reporting nothing as executed");
            Ok(ExecutionStore::new())
        }
        None => {
            debug!("No execution record given, reporting nothing as executed");
            Ok(ExecutionStore::new())
        }
    }
}
