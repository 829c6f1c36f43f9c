use std::path::Path;

use crate::error::ArtifactParseError;
use crate::exec::ExecutionStore;
use crate::types::UnitCounters;

/// Produces raw per-unit counters for one artifact.
///
/// The Analyzer only sees this interface, so any engine able to report five
/// `(covered, missed)` pairs per unit can be plugged in.
pub trait CoverageEngine: Send + Sync + std::fmt::Debug {
    /// Human-readable name for this engine.
    fn name(&self) -> &'static str;

    /// Whether this engine understands the artifact at `path` (by extension).
    fn accepts(&self, path: &Path) -> bool;

    /// Analyse one artifact. An artifact may define zero or more units.
    fn analyze(
        &self,
        bytes: &[u8],
        path: &Path,
        store: &ExecutionStore,
    ) -> Result<Vec<UnitCounters>, ArtifactParseError>;
}
