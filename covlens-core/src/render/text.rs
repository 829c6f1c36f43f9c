// Plain-text renderer — flat unit table, per-package tables, and summary.

use std::fmt::Write as _;

use tracing::{info, instrument};

use super::traits::ReportRenderer;
use super::view::{PopulatedView, ReportView, Summary, UnitRow};
use super::{NO_DATA_MESSAGE, ReportContext, format_percentage};
use crate::types::AnalysisResult;

const HEADERS: [&str; 4] = ["LINE", "BRANCH", "METHOD", "CLASS"];
const CELL_WIDTH: usize = 9;

#[derive(Debug)]
pub struct TextRenderer;

impl ReportRenderer for TextRenderer {
    fn name(&self) -> &'static str {
        "text"
    }

    fn output_path(&self) -> &'static str {
        "coverage.txt"
    }

    #[instrument(skip_all, name = "text_render")]
    fn render(
        &self,
        result: &AnalysisResult,
        ctx: &ReportContext,
    ) -> crate::error::Result<String> {
        let view = ReportView::build(result, &ctx.settings);
        let out = render_text(&view, ctx);
        info!(bytes = out.len(), "Text report rendered");
        Ok(out)
    }
}

fn render_text(view: &ReportView, ctx: &ReportContext) -> String {
    let mut t = String::with_capacity(4096);
    let _ = writeln!(t, "Coverage report: {}", ctx.project_name);
    let _ = writeln!(t, "Generated: {}", ctx.timestamp());
    let _ = writeln!(t);

    match view {
        ReportView::Empty => {
            let _ = writeln!(t, "{NO_DATA_MESSAGE}");
        }
        ReportView::Populated(view) => render_populated(&mut t, view),
    }
    t
}

fn render_populated(t: &mut String, view: &PopulatedView) {
    let _ = writeln!(t, "Units");
    render_table(t, &view.rows, "");

    let _ = writeln!(t);
    let _ = writeln!(t, "Packages");
    for group in &view.groups {
        let _ = writeln!(t, "{} ({} units)", group.key, group.rows.len());
        render_table(t, &group.rows, "  ");
    }

    let _ = writeln!(t);
    render_summary(t, &view.summary);
}

fn render_table(t: &mut String, rows: &[UnitRow], indent: &str) {
    let name_width = rows
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let _ = write!(t, "{indent}{:<name_width$}", "NAME");
    for header in HEADERS {
        let _ = write!(t, " {header:>CELL_WIDTH$}");
    }
    let _ = writeln!(t, "  BAND");

    for row in rows {
        let _ = write!(t, "{indent}{:<name_width$}", row.name);
        for (_, cell) in row.cells() {
            let _ = write!(t, " {:>CELL_WIDTH$}", cell.text);
        }
        let _ = writeln!(t, "  {}", row.line.band);
    }
}

fn render_summary(t: &mut String, summary: &Summary) {
    let _ = writeln!(t, "Summary");
    for (dimension, avg) in summary.averages() {
        let label = format!("{dimension} coverage:");
        let _ = writeln!(t, "  {label:<18} {:>8}  ({})", avg.text, avg.band);
    }
    let _ = writeln!(t, "  {:<18} {:>8}", "Units:", summary.total_units);
    let _ = writeln!(
        t,
        "  Below {} line coverage: {}",
        format_percentage(summary.threshold),
        summary.needs_improvement.len()
    );
    for item in &summary.needs_improvement {
        let _ = writeln!(t, "    - {} {} ({})", item.name, item.line.text, item.line.band);
    }
}
