//! Presentation model shared by every renderer.
//!
//! Built once from an [`AnalysisResult`]; renderers only format it. Every
//! percentage carries its band so styling never recomputes thresholds.

use serde::Serialize;

use super::{ReportSettings, format_percentage};
use crate::analyze::band::{CoverageBand, classify};
use crate::types::{AnalysisResult, CoverageRecord, Dimension};

/// A formatted percentage with its severity band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedPercent {
    pub value: f64,
    /// Two decimals and a trailing `%`.
    pub text: String,
    pub band: CoverageBand,
}

impl TaggedPercent {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            text: format_percentage(value),
            band: classify(value),
        }
    }
}

/// One table row: a unit and its four displayed dimensions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitRow {
    /// Fully qualified in the flat table, group-relative in sections.
    pub name: String,
    pub line: TaggedPercent,
    pub branch: TaggedPercent,
    pub method: TaggedPercent,
    pub class: TaggedPercent,
}

impl UnitRow {
    fn new(name: impl Into<String>, record: &CoverageRecord) -> Self {
        Self {
            name: name.into(),
            line: TaggedPercent::new(record.line_coverage),
            branch: TaggedPercent::new(record.branch_coverage),
            method: TaggedPercent::new(record.method_coverage),
            class: TaggedPercent::new(record.class_coverage),
        }
    }

    /// Cells in display order.
    pub fn cells(&self) -> [(Dimension, &TaggedPercent); 4] {
        [
            (Dimension::Line, &self.line),
            (Dimension::Branch, &self.branch),
            (Dimension::Method, &self.method),
            (Dimension::Class, &self.class),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSection {
    pub key: String,
    pub is_default: bool,
    pub rows: Vec<UnitRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImprovementItem {
    pub name: String,
    pub line: TaggedPercent,
}

/// Run-level summary. Instruction coverage is not shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub line: TaggedPercent,
    pub branch: TaggedPercent,
    pub method: TaggedPercent,
    pub class: TaggedPercent,
    pub total_units: usize,
    pub threshold: f64,
    /// Units with line coverage below `threshold`, in result order.
    pub needs_improvement: Vec<ImprovementItem>,
}

impl Summary {
    pub fn averages(&self) -> [(Dimension, &TaggedPercent); 4] {
        [
            (Dimension::Line, &self.line),
            (Dimension::Branch, &self.branch),
            (Dimension::Method, &self.method),
            (Dimension::Class, &self.class),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulatedView {
    pub rows: Vec<UnitRow>,
    pub groups: Vec<GroupSection>,
    pub summary: Summary,
}

/// What a report shows: either nothing was found, or a full breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReportView {
    Empty,
    Populated(PopulatedView),
}

impl ReportView {
    pub fn build(result: &AnalysisResult, settings: &ReportSettings) -> Self {
        let Some(averages) = result.averages() else {
            return Self::Empty;
        };

        let rows = result
            .records()
            .iter()
            .map(|r| UnitRow::new(r.name.clone(), r))
            .collect();

        let groups = settings
            .aggregator
            .group(result)
            .into_iter()
            .map(|group| GroupSection {
                rows: group
                    .records
                    .iter()
                    .map(|r| UnitRow::new(group.relative_name(r), r))
                    .collect(),
                key: group.key,
                is_default: group.is_default,
            })
            .collect();

        let needs_improvement = result
            .records()
            .iter()
            .filter(|r| settings.policy.needs_improvement(r))
            .map(|r| ImprovementItem {
                name: r.name.clone(),
                line: TaggedPercent::new(r.line_coverage),
            })
            .collect();

        Self::Populated(PopulatedView {
            rows,
            groups,
            summary: Summary {
                line: TaggedPercent::new(averages.line),
                branch: TaggedPercent::new(averages.branch),
                method: TaggedPercent::new(averages.method),
                class: TaggedPercent::new(averages.class),
                total_units: result.len(),
                threshold: settings.policy.threshold(),
                needs_improvement,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::scenario_c;

    #[test]
    fn empty_result_is_empty_view() {
        let view = ReportView::build(&AnalysisResult::default(), &ReportSettings::default());
        assert_eq!(view, ReportView::Empty);
    }

    #[test]
    fn populated_view_has_rows_groups_and_summary() {
        let ReportView::Populated(view) = ReportView::build(&scenario_c(), &ReportSettings::default())
        else {
            panic!("expected populated view");
        };
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.rows[0].name, "a.Foo");
        assert_eq!(view.rows[0].line.text, "95.00%");
        assert_eq!(view.rows[0].line.band, CoverageBand::Good);

        assert_eq!(view.groups.len(), 1);
        assert_eq!(view.groups[0].key, "a");
        let rel: Vec<&str> = view.groups[0].rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(rel, vec!["Foo", "Bar"]);

        assert_eq!(view.summary.total_units, 2);
        assert_eq!(view.summary.needs_improvement.len(), 1);
        assert_eq!(view.summary.needs_improvement[0].name, "a.Bar");
        assert_eq!(view.summary.needs_improvement[0].line.text, "40.00%");
        assert_eq!(view.summary.line.text, "67.50%");
    }
}
