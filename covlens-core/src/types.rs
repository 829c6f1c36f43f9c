use std::fmt;

use serde::{Deserialize, Serialize};

// ── Raw counters ───────────────────────────────────────────────────

/// A `(covered, missed)` pair for one coverage dimension of one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counter {
    pub covered: u64,
    pub missed: u64,
}

impl Counter {
    pub const fn new(covered: u64, missed: u64) -> Self {
        Self { covered, missed }
    }

    pub const fn total(&self) -> u64 {
        self.covered + self.missed
    }

    /// Ratio as a percentage in `[0, 100]`; an empty counter yields `0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.covered as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Record one item as covered or missed.
    pub fn increment(&mut self, covered: bool) {
        if covered {
            self.covered += 1;
        } else {
            self.missed += 1;
        }
    }

    /// Add another counter to this one.
    pub fn add(&mut self, other: Counter) {
        self.covered += other.covered;
        self.missed += other.missed;
    }
}

/// The five independently measured coverage dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Instruction,
    Branch,
    Line,
    Method,
    Class,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Instruction,
        Dimension::Branch,
        Dimension::Line,
        Dimension::Method,
        Dimension::Class,
    ];

    /// Dimensions shown to users; instruction coverage is tracked but not displayed.
    pub const DISPLAYED: [Dimension; 4] = [
        Dimension::Line,
        Dimension::Branch,
        Dimension::Method,
        Dimension::Class,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instruction => "instruction",
            Self::Branch => "branch",
            Self::Line => "line",
            Self::Method => "method",
            Self::Class => "class",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Narrow view over one unit's raw counters, as produced by a coverage engine.
pub trait UnitCoverage {
    /// Unit name exactly as the engine reports it (any separator style).
    fn unit_name(&self) -> &str;

    /// Counter for one dimension.
    fn counter(&self, dimension: Dimension) -> Counter;
}

/// Raw per-unit counters, the engine's output contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCounters {
    pub name: String,
    pub instruction: Counter,
    pub branch: Counter,
    pub line: Counter,
    pub method: Counter,
    pub class: Counter,
}

impl UnitCounters {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl UnitCoverage for UnitCounters {
    fn unit_name(&self) -> &str {
        &self.name
    }

    fn counter(&self, dimension: Dimension) -> Counter {
        match dimension {
            Dimension::Instruction => self.instruction,
            Dimension::Branch => self.branch,
            Dimension::Line => self.line,
            Dimension::Method => self.method,
            Dimension::Class => self.class,
        }
    }
}

// ── Coverage records ───────────────────────────────────────────────

/// Immutable coverage snapshot of one analysed unit, percentages in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    /// Fully qualified, `.`-separated unit name; unique within one run.
    pub name: String,
    pub instruction_coverage: f64,
    pub branch_coverage: f64,
    pub line_coverage: f64,
    pub method_coverage: f64,
    pub class_coverage: f64,
}

impl CoverageRecord {
    pub fn coverage(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Instruction => self.instruction_coverage,
            Dimension::Branch => self.branch_coverage,
            Dimension::Line => self.line_coverage,
            Dimension::Method => self.method_coverage,
            Dimension::Class => self.class_coverage,
        }
    }
}

/// Arithmetic means of each dimension across all records of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunAverages {
    pub instruction: f64,
    pub branch: f64,
    pub line: f64,
    pub method: f64,
    pub class: f64,
}

impl RunAverages {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Instruction => self.instruction,
            Dimension::Branch => self.branch,
            Dimension::Line => self.line,
            Dimension::Method => self.method,
            Dimension::Class => self.class,
        }
    }
}

/// All records produced by one analysis run, in the order they were received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    records: Vec<CoverageRecord>,
}

impl AnalysisResult {
    pub(crate) fn from_records(records: Vec<CoverageRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[CoverageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Unweighted mean of each dimension; `None` when the run has no records.
    #[allow(clippy::cast_precision_loss)]
    pub fn averages(&self) -> Option<RunAverages> {
        if self.records.is_empty() {
            return None;
        }
        let n = self.records.len() as f64;
        let mean = |d: Dimension| self.records.iter().map(|r| r.coverage(d)).sum::<f64>() / n;
        Some(RunAverages {
            instruction: mean(Dimension::Instruction),
            branch: mean(Dimension::Branch),
            line: mean(Dimension::Line),
            method: mean(Dimension::Method),
            class: mean(Dimension::Class),
        })
    }
}

/// Records sharing one namespace prefix. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageGroup<'a> {
    /// Namespace prefix, or the configured default-group identifier.
    pub key: String,
    /// Whether `key` is the default group (records without a namespace).
    pub is_default: bool,
    pub records: Vec<&'a CoverageRecord>,
}

impl PackageGroup<'_> {
    /// Unit name without the group prefix.
    pub fn relative_name<'r>(&self, record: &'r CoverageRecord) -> &'r str {
        if self.is_default {
            return &record.name;
        }
        record
            .name
            .strip_prefix(self.key.as_str())
            .and_then(|rest| rest.strip_prefix(crate::analyze::aggregate::NAMESPACE_SEPARATOR))
            .unwrap_or(&record.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, line: f64) -> CoverageRecord {
        CoverageRecord {
            name: name.to_string(),
            instruction_coverage: line,
            branch_coverage: line / 2.0,
            line_coverage: line,
            method_coverage: 100.0,
            class_coverage: 100.0,
        }
    }

    #[test]
    fn empty_counter_is_zero_percent() {
        assert!(Counter::default().percentage().abs() < f64::EPSILON);
    }

    #[test]
    fn counter_percentage() {
        let c = Counter::new(3, 1);
        assert!((c.percentage() - 75.0).abs() < 1e-9);
        assert_eq!(c.total(), 4);
    }

    #[test]
    fn averages_are_unweighted_means() {
        let result = AnalysisResult::from_records(vec![record("a.A", 100.0), record("a.B", 50.0)]);
        let avg = result.averages().unwrap();
        assert!((avg.line - 75.0).abs() < 1e-9);
        assert!((avg.branch - 37.5).abs() < 1e-9);
        assert!((avg.method - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_result_has_no_averages() {
        assert!(AnalysisResult::default().averages().is_none());
    }

    #[test]
    fn relative_name_strips_group_prefix() {
        let r = record("com.example.Foo", 10.0);
        let group = PackageGroup {
            key: "com.example".to_string(),
            is_default: false,
            records: vec![&r],
        };
        assert_eq!(group.relative_name(&r), "Foo");
    }

    #[test]
    fn dimension_serde_roundtrip() {
        for d in Dimension::ALL {
            let json = serde_json::to_string(&d).unwrap();
            assert_eq!(json, format!("\"{}\"", d.as_str()));
            let back: Dimension = serde_json::from_str(&json).unwrap();
            assert_eq!(back, d);
        }
    }
}
