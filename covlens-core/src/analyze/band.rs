//! Severity bands for coverage percentages, and the improvement cutoff.
//!
//! The two are deliberately independent: the band table is fixed, the
//! improvement threshold comes from configuration.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::CoverageRecord;

/// Named severity tier. Ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageBand {
    /// `[0, 25)`
    Critical,
    /// `[25, 50)`
    Poor,
    /// `[50, 75)`
    Fair,
    /// `[75, 100)`
    Good,
    /// exactly `100`
    Excellent,
}

impl CoverageBand {
    pub const ALL: [CoverageBand; 5] = [
        CoverageBand::Critical,
        CoverageBand::Poor,
        CoverageBand::Fair,
        CoverageBand::Good,
        CoverageBand::Excellent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }

    /// Inclusive lower bound of the band.
    pub fn lower_bound(&self) -> f64 {
        match self {
            Self::Critical => 0.0,
            Self::Poor => 25.0,
            Self::Fair => 50.0,
            Self::Good => 75.0,
            Self::Excellent => 100.0,
        }
    }
}

impl fmt::Display for CoverageBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bring a percentage into `[0, 100]`. `NaN` becomes `0`. Both cases are logged.
pub fn clamp_percentage(value: f64) -> f64 {
    if value.is_nan() {
        warn!("Coverage percentage is NaN, using 0");
        return 0.0;
    }
    if !(0.0..=100.0).contains(&value) {
        warn!(value, "Coverage percentage outside [0, 100], clamping");
        return value.clamp(0.0, 100.0);
    }
    value
}

/// Map one percentage to its band. Total over every `f64`.
pub fn classify(percentage: f64) -> CoverageBand {
    let p = clamp_percentage(percentage);
    if p >= 100.0 {
        CoverageBand::Excellent
    } else if p >= 75.0 {
        CoverageBand::Good
    } else if p >= 50.0 {
        CoverageBand::Fair
    } else if p >= 25.0 {
        CoverageBand::Poor
    } else {
        CoverageBand::Critical
    }
}

/// Decides which units are listed as needing improvement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImprovementPolicy {
    threshold: f64,
}

impl Default for ImprovementPolicy {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }
}

impl ImprovementPolicy {
    pub const DEFAULT_THRESHOLD: f64 = 70.0;

    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: clamp_percentage(threshold),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Line coverage strictly below the threshold.
    pub fn needs_improvement(&self, record: &CoverageRecord) -> bool {
        record.line_coverage < self.threshold
    }
}
