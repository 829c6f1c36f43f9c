pub mod html;
pub mod json;
pub mod text;
pub mod traits;
pub mod tree;
pub mod view;

use chrono::{DateTime, Utc};

use crate::analyze::aggregate::CoverageAggregator;
use crate::analyze::band::ImprovementPolicy;
use crate::config::ReportSection;
use crate::types::AnalysisResult;

pub use traits::ReportRenderer;
pub use view::{ReportView, TaggedPercent};

/// Shown instead of any table when a run produced no records.
pub const NO_DATA_MESSAGE: &str = "No coverage data: no artifacts found";

/// Grouping and threshold settings a report is rendered with.
#[derive(Debug, Clone, Default)]
pub struct ReportSettings {
    pub aggregator: CoverageAggregator,
    pub policy: ImprovementPolicy,
}

impl ReportSettings {
    pub fn from_config(report: &ReportSection) -> Self {
        Self {
            aggregator: CoverageAggregator::from_config(report),
            policy: ImprovementPolicy::new(report.needs_improvement_threshold),
        }
    }
}

/// Everything a renderer needs besides the result itself.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub project_name: String,
    /// When the rendered result was produced, not when rendering happens.
    pub generated_at: DateTime<Utc>,
    pub settings: ReportSettings,
}

impl ReportContext {
    pub fn new(project_name: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            project_name: project_name.into(),
            generated_at,
            settings: ReportSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ReportSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn timestamp(&self) -> String {
        self.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

/// Two decimals and a trailing `%`.
pub fn format_percentage(value: f64) -> String {
    format!("{value:.2}%")
}

/// Inverse of [`format_percentage`]; the `%` is optional.
pub fn parse_percentage(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed);
    number.trim().parse().ok()
}

/// `"<line>% | <branch>% | <method>% | <class>%"`, or `"no data"` for an empty run.
pub fn summary_line(result: &AnalysisResult) -> String {
    match result.averages() {
        Some(avg) => format!(
            "{} | {} | {} | {}",
            format_percentage(avg.line),
            format_percentage(avg.branch),
            format_percentage(avg.method),
            format_percentage(avg.class)
        ),
        None => "no data".to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_two_decimals() {
        assert_eq!(format_percentage(40.0), "40.00%");
        assert_eq!(format_percentage(66.666_666), "66.67%");
        assert_eq!(format_percentage(100.0), "100.00%");
    }

    #[test]
    fn parses_with_or_without_suffix() {
        assert_eq!(parse_percentage("40.00%"), Some(40.0));
        assert_eq!(parse_percentage(" 12.5 "), Some(12.5));
        assert_eq!(parse_percentage("n/a"), None);
    }

    #[test]
    fn summary_line_for_empty_and_populated() {
        assert_eq!(summary_line(&AnalysisResult::default()), "no data");
        assert_eq!(
            summary_line(&test_support::scenario_c()),
            "67.50% | 50.00% | 100.00% | 100.00%"
        );
    }

    #[test]
    fn settings_follow_config() {
        let report = ReportSection {
            needs_improvement_threshold: 85.0,
            ..ReportSection::default()
        };
        let settings = ReportSettings::from_config(&report);
        assert!((settings.policy.threshold() - 85.0).abs() < f64::EPSILON);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn format_parse_roundtrip(p in 0.0f64..=100.0) {
                let back = parse_percentage(&format_percentage(p)).unwrap();
                prop_assert!((back - p).abs() <= 0.01);
            }
        }
    }
}
