//! Raw counters → coverage records, run averages, and package groups.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::config::{GroupOrder, ReportSection};
use crate::types::{AnalysisResult, CoverageRecord, Dimension, PackageGroup, UnitCoverage};

/// Canonical namespace separator in unit names.
pub const NAMESPACE_SEPARATOR: char = '.';

/// Rewrite path-style (`/`, `\`) and module-style (`::`) separators to `.`,
/// collapsing runs and trimming separators at either end.
pub fn normalize_unit_name(raw: &str) -> String {
    let replaced = raw.replace("::", ".").replace(['/', '\\'], ".");
    replaced
        .split(NAMESPACE_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Namespace prefix of a normalized name, or `None` when it has no separator.
pub fn group_key(name: &str) -> Option<&str> {
    name.rfind(NAMESPACE_SEPARATOR).map(|i| &name[..i])
}

/// Converts engine output into an [`AnalysisResult`] and partitions it by namespace.
///
/// Never fails: empty input produces an empty result.
#[derive(Debug, Clone)]
pub struct CoverageAggregator {
    order: GroupOrder,
    default_group: String,
}

impl Default for CoverageAggregator {
    fn default() -> Self {
        Self::from_config(&ReportSection::default())
    }
}

impl CoverageAggregator {
    pub fn new(order: GroupOrder, default_group: impl Into<String>) -> Self {
        Self {
            order,
            default_group: default_group.into(),
        }
    }

    pub fn from_config(report: &ReportSection) -> Self {
        Self::new(report.group_order, report.default_group.clone())
    }

    pub fn default_group(&self) -> &str {
        &self.default_group
    }

    /// Build records in input order.
    #[instrument(skip_all, name = "aggregate")]
    pub fn aggregate<U: UnitCoverage>(&self, units: &[U]) -> AnalysisResult {
        let start = Instant::now();
        let records: Vec<CoverageRecord> = units.iter().map(Self::record_for).collect();
        for record in &records {
            debug!(
                unit = %record.name,
                line = record.line_coverage,
                branch = record.branch_coverage,
                "Unit aggregated"
            );
        }
        let result = AnalysisResult::from_records(records);
        info!(
            records = result.len(),
            duration = ?start.elapsed(),
            "Aggregation complete"
        );
        result
    }

    /// One record from one unit's counters.
    pub fn record_for<U: UnitCoverage>(unit: &U) -> CoverageRecord {
        let pct = |d: Dimension| unit.counter(d).percentage();
        CoverageRecord {
            name: normalize_unit_name(unit.unit_name()),
            instruction_coverage: pct(Dimension::Instruction),
            branch_coverage: pct(Dimension::Branch),
            line_coverage: pct(Dimension::Line),
            method_coverage: pct(Dimension::Method),
            class_coverage: pct(Dimension::Class),
        }
    }

    /// Partition records by namespace prefix. Record order inside a group is
    /// the result order; group order follows the configured [`GroupOrder`].
    pub fn group<'a>(&self, result: &'a AnalysisResult) -> Vec<PackageGroup<'a>> {
        let mut groups: Vec<PackageGroup<'a>> = Vec::new();
        let mut index: HashMap<(bool, &str), usize> = HashMap::new();

        for record in result.records() {
            let (is_default, key) = match group_key(&record.name) {
                Some(key) => (false, key),
                None => (true, self.default_group.as_str()),
            };
            let slot = *index.entry((is_default, key)).or_insert_with(|| {
                groups.push(PackageGroup {
                    key: key.to_string(),
                    is_default,
                    records: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].records.push(record);
        }

        if self.order == GroupOrder::Alphabetical {
            groups.sort_by(|a, b| a.key.cmp(&b.key));
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Counter, UnitCounters};

    fn unit(name: &str, line: (u64, u64)) -> UnitCounters {
        UnitCounters {
            name: name.to_string(),
            instruction: Counter::new(line.0, line.1),
            branch: Counter::default(),
            line: Counter::new(line.0, line.1),
            method: Counter::new(1, 0),
            class: Counter::new(1, 0),
        }
    }

    #[test]
    fn normalizes_all_separator_styles() {
        assert_eq!(normalize_unit_name("com/example/Foo"), "com.example.Foo");
        assert_eq!(normalize_unit_name("com\\example\\Foo"), "com.example.Foo");
        assert_eq!(normalize_unit_name("crate::module::Foo"), "crate.module.Foo");
        assert_eq!(normalize_unit_name("/a//b/"), "a.b");
        assert_eq!(normalize_unit_name("Outer$Inner"), "Outer$Inner");
    }

    #[test]
    fn zero_denominator_is_zero_percent() {
        let record = CoverageAggregator::record_for(&unit("a.B", (0, 0)));
        assert!(record.line_coverage.abs() < f64::EPSILON);
        assert!(record.branch_coverage.abs() < f64::EPSILON);
        assert!((record.method_coverage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn preserves_input_order() {
        let agg = CoverageAggregator::default();
        let result = agg.aggregate(&[unit("z.Z", (1, 0)), unit("a.A", (0, 1)), unit("m.M", (1, 1))]);
        let names: Vec<&str> = result.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["z.Z", "a.A", "m.M"]);
    }

    #[test]
    fn empty_input_is_empty_result() {
        let result = CoverageAggregator::default().aggregate::<UnitCounters>(&[]);
        assert!(result.is_empty());
        assert!(result.averages().is_none());
    }

    #[test]
    fn groups_in_first_seen_order() {
        let agg = CoverageAggregator::default();
        let result = agg.aggregate(&[
            unit("b.X", (1, 0)),
            unit("a.Y", (1, 0)),
            unit("b.Z", (1, 0)),
            unit("Top", (1, 0)),
        ]);
        let groups = agg.group(&result);
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "default"]);
        assert_eq!(groups[0].records.len(), 2);
        assert!(groups[2].is_default);
        assert_eq!(groups[2].relative_name(groups[2].records[0]), "Top");
    }

    #[test]
    fn alphabetical_order_is_opt_in() {
        let agg = CoverageAggregator::new(GroupOrder::Alphabetical, "(root)");
        let result = agg.aggregate(&[unit("b.X", (1, 0)), unit("a.Y", (1, 0)), unit("Top", (1, 0))]);
        let keys: Vec<String> = agg.group(&result).into_iter().map(|g| g.key).collect();
        assert_eq!(keys, vec!["(root)", "a", "b"]);
    }

    #[test]
    fn package_named_like_default_group_stays_separate() {
        let agg = CoverageAggregator::default();
        let result = agg.aggregate(&[unit("default.A", (1, 0)), unit("B", (1, 0))]);
        let groups = agg.group(&result);
        assert_eq!(groups.len(), 2);
        assert!(!groups[0].is_default);
        assert!(groups[1].is_default);
    }

    #[test]
    fn platform_separators_share_a_group() {
        let agg = CoverageAggregator::default();
        let result = agg.aggregate(&[unit("com/acme/Foo", (1, 0)), unit("com.acme.Bar", (1, 0))]);
        let groups = agg.group(&result);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "com.acme");
        let rel: Vec<&str> = groups[0].records.iter().map(|r| groups[0].relative_name(r)).collect();
        assert_eq!(rel, vec!["Foo", "Bar"]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_name() -> impl Strategy<Value = String> {
            prop::collection::vec("[a-c]{1,3}", 1..4).prop_flat_map(|segments| {
                prop_oneof![Just("/"), Just("."), Just("::"), Just("\\")]
                    .prop_map(move |sep| segments.join(sep))
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn empty_counters_never_produce_nan(covered in 0u64..5, missed in 0u64..5) {
                let record = CoverageAggregator::record_for(&unit("a.B", (covered, missed)));
                prop_assert!(!record.line_coverage.is_nan());
                prop_assert!((0.0..=100.0).contains(&record.line_coverage));
                if covered + missed == 0 {
                    prop_assert!(record.line_coverage.abs() < f64::EPSILON);
                }
            }

            #[test]
            fn normalization_is_idempotent(name in arb_name()) {
                let once = normalize_unit_name(&name);
                prop_assert_eq!(normalize_unit_name(&once), once.clone());
                prop_assert!(!once.contains('/') && !once.contains('\\') && !once.contains("::"));
            }

            #[test]
            fn grouping_is_a_total_partition(names in prop::collection::vec(arb_name(), 0..20)) {
                let agg = CoverageAggregator::default();
                let units: Vec<UnitCounters> = names.iter().map(|n| unit(n, (1, 1))).collect();
                let result = agg.aggregate(&units);
                let groups = agg.group(&result);
                let total: usize = groups.iter().map(|g| g.records.len()).sum();
                prop_assert_eq!(total, result.len());
                for record in result.records() {
                    let owners = groups
                        .iter()
                        .filter(|g| g.records.iter().any(|r| std::ptr::eq(*r, record)))
                        .count();
                    prop_assert_eq!(owners, 1);
                }
            }
        }
    }
}
