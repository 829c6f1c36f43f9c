pub mod aggregate;
pub mod analyzer;
pub mod band;

use std::time::Duration;

use crate::error::ArtifactParseError;
use crate::types::UnitCounters;

pub use aggregate::{CoverageAggregator, NAMESPACE_SEPARATOR, normalize_unit_name};
pub use analyzer::Analyzer;
pub use band::{CoverageBand, ImprovementPolicy, classify};

/// Statistics returned by the Analyzer after a run.
#[derive(Debug, Default)]
pub struct AnalyzeStats {
    /// Artifact files considered after directory expansion.
    pub artifacts_seen: u64,
    pub artifacts_parsed: u64,
    pub artifacts_skipped: u64,
    pub units: u64,
    /// Units dropped because an earlier artifact produced the same name.
    pub units_skipped: u64,
    pub duration: Duration,
    /// Recoverable failures, keyed by artifact path. One entry per skipped
    /// artifact or unit.
    pub errors: Vec<(String, ArtifactParseError)>,
}

impl AnalyzeStats {
    /// Artifacts were found, yet none could be parsed.
    pub fn all_failed(&self) -> bool {
        self.artifacts_seen > 0 && self.artifacts_parsed == 0
    }
}

/// Raw per-unit counters of one run, in artifact order.
#[derive(Debug, Default)]
pub struct AnalyzeOutput {
    pub units: Vec<UnitCounters>,
    pub stats: AnalyzeStats,
}
