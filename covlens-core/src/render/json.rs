// JSON renderer — the machine-usable aggregate.

use serde::Serialize;
use tracing::{info, instrument};

use super::traits::ReportRenderer;
use super::view::{GroupSection, ReportView, Summary, TaggedPercent};
use super::ReportContext;
use crate::error::RenderError;
use crate::types::{AnalysisResult, CoverageRecord};

#[derive(Debug)]
pub struct JsonRenderer;

/// One record with all five dimensions, instruction included.
#[derive(Debug, Serialize)]
struct RecordEntry<'a> {
    name: &'a str,
    instruction: TaggedPercent,
    branch: TaggedPercent,
    line: TaggedPercent,
    method: TaggedPercent,
    class: TaggedPercent,
}

impl<'a> From<&'a CoverageRecord> for RecordEntry<'a> {
    fn from(r: &'a CoverageRecord) -> Self {
        Self {
            name: &r.name,
            instruction: TaggedPercent::new(r.instruction_coverage),
            branch: TaggedPercent::new(r.branch_coverage),
            line: TaggedPercent::new(r.line_coverage),
            method: TaggedPercent::new(r.method_coverage),
            class: TaggedPercent::new(r.class_coverage),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    project: &'a str,
    generated_at: String,
    status: &'static str,
    records: Vec<RecordEntry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<Vec<GroupSection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Summary>,
}

impl ReportRenderer for JsonRenderer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn output_path(&self) -> &'static str {
        "coverage.json"
    }

    #[instrument(skip_all, name = "json_render")]
    fn render(
        &self,
        result: &AnalysisResult,
        ctx: &ReportContext,
    ) -> crate::error::Result<String> {
        let (status, groups, summary) = match ReportView::build(result, &ctx.settings) {
            ReportView::Empty => ("empty", None, None),
            ReportView::Populated(view) => ("populated", Some(view.groups), Some(view.summary)),
        };
        let report = JsonReport {
            project: &ctx.project_name,
            generated_at: ctx.generated_at.to_rfc3339(),
            status,
            records: result.records().iter().map(RecordEntry::from).collect(),
            groups,
            summary,
        };
        let mut out = serde_json::to_string_pretty(&report).map_err(RenderError::from)?;
        out.push('\n');
        info!(bytes = out.len(), "JSON report rendered");
        Ok(out)
    }
}
