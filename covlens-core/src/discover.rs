//! Locating the execution-record file and compiled artifacts of a project
//! that follows common build-tool layouts.

use std::path::{Path, PathBuf};

use glob::Pattern;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{ConfigError, CovlensError};

/// Execution-record locations, probed in order.
pub const EXEC_FILE_CANDIDATES: &[&str] = &[
    "build/jacoco/test.exec",
    "build/jacoco.exec",
    "target/jacoco.exec",
    "jacoco.exec",
];

/// Conventional class output directories, probed in order.
pub const CLASS_DIR_CANDIDATES: &[&str] = &[
    "build/classes/java/main",
    "build/classes/kotlin/main",
    "target/classes",
    "out/production",
    "classes",
];

/// First existing execution-record file under `root`.
pub fn find_exec_file(root: &Path) -> Option<PathBuf> {
    EXEC_FILE_CANDIDATES
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.is_file())
}

/// Conventional class output directories that exist under `root`.
pub fn class_directories(root: &Path) -> Vec<PathBuf> {
    CLASS_DIR_CANDIDATES
        .iter()
        .map(|candidate| root.join(candidate))
        .filter(|path| path.is_dir())
        .collect()
}

/// Class files to analyse: those of the first conventional directory that has
/// any, otherwise every class file under `root`.
///
/// Hidden directories and paths matching an exclude glob (relative to `root`)
/// are skipped.
#[instrument(skip_all, name = "discover", fields(root = %root.display()))]
pub fn find_artifacts(
    root: &Path,
    exclude_patterns: &[String],
    token: &CancellationToken,
) -> crate::error::Result<Vec<PathBuf>> {
    let excludes = compile_patterns(exclude_patterns)?;

    for dir in class_directories(root) {
        let files = collect_class_files(root, &dir, &excludes, token)?;
        if !files.is_empty() {
            info!(dir = %dir.display(), files = files.len(), "Found class directory");
            return Ok(files);
        }
        debug!(dir = %dir.display(), "Class directory has no class files");
    }

    let files = collect_class_files(root, root, &excludes, token)?;
    info!(files = files.len(), "Walked project root for class files");
    Ok(files)
}

fn compile_patterns(patterns: &[String]) -> crate::error::Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| {
                CovlensError::Config(ConfigError::Invalid(format!(
                    "bad exclude pattern {p}: {e}"
                )))
            })
        })
        .collect()
}

fn collect_class_files(
    root: &Path,
    dir: &Path,
    excludes: &[Pattern],
    token: &CancellationToken,
) -> crate::error::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e) && !is_excluded(root, e.path(), excludes));

    for entry in walker {
        if token.is_cancelled() {
            return Err(CovlensError::Cancelled);
        }
        match entry {
            Ok(entry)
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|e| e == "class") =>
            {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Cannot read directory entry"),
        }
    }
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(|s| s.starts_with('.'))
}

fn is_excluded(root: &Path, path: &Path, excludes: &[Pattern]) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    excludes.iter().any(|p| p.matches_path(rel))
}
