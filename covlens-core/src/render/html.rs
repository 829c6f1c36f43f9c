// HTML renderer — self-contained `coverage.html` with band-coloured cells.
//
// Sections: Summary, Needs Improvement, Packages, All Units.

use std::fmt::Write as _;

use tracing::{info, instrument};

use super::traits::ReportRenderer;
use super::view::{PopulatedView, ReportView, TaggedPercent, UnitRow};
use super::{NO_DATA_MESSAGE, ReportContext, format_percentage};
use crate::types::AnalysisResult;

#[derive(Debug)]
pub struct HtmlRenderer;

impl ReportRenderer for HtmlRenderer {
    fn name(&self) -> &'static str {
        "html"
    }

    fn output_path(&self) -> &'static str {
        "coverage.html"
    }

    #[instrument(skip_all, name = "html_render")]
    fn render(
        &self,
        result: &AnalysisResult,
        ctx: &ReportContext,
    ) -> crate::error::Result<String> {
        let view = ReportView::build(result, &ctx.settings);
        let out = render_html(&view, ctx);
        info!(bytes = out.len(), "HTML report rendered");
        Ok(out)
    }
}

// ── HTML rendering ───────────────────────────────────────────────────

fn render_html(view: &ReportView, ctx: &ReportContext) -> String {
    let mut h = String::with_capacity(8192);
    let title = format!("Coverage Report: {}", escape(&ctx.project_name));

    let _ = writeln!(h, "<!DOCTYPE html>");
    let _ = writeln!(h, "<html lang=\"en\">");
    let _ = writeln!(h, "<head>");
    let _ = writeln!(h, "<meta charset=\"utf-8\">");
    let _ = writeln!(
        h,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">"
    );
    let _ = writeln!(h, "<title>{title}</title>");
    let _ = writeln!(h, "<style>{REPORT_CSS}</style>");
    let _ = writeln!(h, "</head>");
    let _ = writeln!(h, "<body>");
    let _ = writeln!(h, "<h1>{title}</h1>");
    let _ = writeln!(h, "<p class=\"generated\">Generated {}</p>", ctx.timestamp());

    match view {
        ReportView::Empty => {
            let _ = writeln!(h, "<section class=\"empty\">");
            let _ = writeln!(h, "<p>{NO_DATA_MESSAGE}</p>");
            let _ = writeln!(h, "</section>");
        }
        ReportView::Populated(view) => {
            render_summary(&mut h, view);
            render_improvements(&mut h, view);
            render_packages(&mut h, view);
            render_units(&mut h, view);
        }
    }

    let _ = writeln!(h, "<footer><p>Generated by covlens</p></footer>");
    let _ = writeln!(h, "</body>");
    let _ = writeln!(h, "</html>");
    h
}

fn render_summary(h: &mut String, view: &PopulatedView) {
    let _ = writeln!(h, "<section class=\"summary\">");
    let _ = writeln!(h, "<h2>Summary</h2>");
    let _ = writeln!(h, "<div class=\"metrics\">");
    for (dimension, avg) in view.summary.averages() {
        let _ = writeln!(
            h,
            "<div class=\"metric band-{}\"><span class=\"value\">{}</span>\
             <span class=\"label\">{dimension}</span></div>",
            avg.band, avg.text
        );
    }
    let _ = writeln!(
        h,
        "<div class=\"metric\"><span class=\"value\">{}</span>\
         <span class=\"label\">units</span></div>",
        view.summary.total_units
    );
    let _ = writeln!(h, "</div>");
    let _ = writeln!(h, "</section>");
}

fn render_improvements(h: &mut String, view: &PopulatedView) {
    let summary = &view.summary;
    let _ = writeln!(h, "<section class=\"improvements\">");
    let _ = writeln!(
        h,
        "<h2>Needs Improvement ({} below {} line coverage)</h2>",
        summary.needs_improvement.len(),
        format_percentage(summary.threshold)
    );
    if summary.needs_improvement.is_empty() {
        let _ = writeln!(h, "<p>Every unit meets the threshold.</p>");
    } else {
        let _ = writeln!(h, "<ul>");
        for item in &summary.needs_improvement {
            let _ = writeln!(
                h,
                "<li><code>{}</code> {}</li>",
                escape(&item.name),
                cell(&item.line, "span")
            );
        }
        let _ = writeln!(h, "</ul>");
    }
    let _ = writeln!(h, "</section>");
}

fn render_packages(h: &mut String, view: &PopulatedView) {
    let _ = writeln!(h, "<section class=\"packages\">");
    let _ = writeln!(h, "<h2>Packages</h2>");
    for group in &view.groups {
        let class = if group.is_default { " class=\"default-group\"" } else { "" };
        let _ = writeln!(h, "<h3{class}>{}</h3>", escape(&group.key));
        render_table(h, &group.rows);
    }
    let _ = writeln!(h, "</section>");
}

fn render_units(h: &mut String, view: &PopulatedView) {
    let _ = writeln!(h, "<section class=\"units\">");
    let _ = writeln!(h, "<h2>All Units</h2>");
    render_table(h, &view.rows);
    let _ = writeln!(h, "</section>");
}

fn render_table(h: &mut String, rows: &[UnitRow]) {
    let _ = writeln!(h, "<table>");
    let _ = writeln!(
        h,
        "<tr><th>Unit</th><th>Line</th><th>Branch</th><th>Method</th><th>Class</th></tr>"
    );
    for row in rows {
        let _ = write!(h, "<tr><td><code>{}</code></td>", escape(&row.name));
        for (_, pct) in row.cells() {
            let _ = write!(h, "{}", cell(pct, "td"));
        }
        let _ = writeln!(h, "</tr>");
    }
    let _ = writeln!(h, "</table>");
}

fn cell(pct: &TaggedPercent, tag: &str) -> String {
    format!("<{tag} class=\"band-{}\">{}</{tag}>", pct.band, pct.text)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const REPORT_CSS: &str = "\
body{font-family:-apple-system,BlinkMacSystemFont,\"Segoe UI\",sans-serif;\
max-width:960px;margin:0 auto;padding:2rem;color:#333;background:#fafafa}\
h1{border-bottom:2px solid #333;padding-bottom:.5rem}\
h2{margin-top:2rem;color:#2c3e50}\
.generated{color:#7f8c8d;font-size:.9rem}\
.summary{background:#fff;padding:1.5rem;border-radius:8px;\
box-shadow:0 1px 3px rgba(0,0,0,.1)}\
.metrics{display:flex;flex-wrap:wrap;gap:1rem}\
.metric{text-align:center;padding:1rem;background:#f8f9fa;\
border-radius:6px;min-width:100px}\
.metric .value{display:block;font-size:1.8rem;font-weight:bold}\
.metric .label{font-size:.85rem;color:#7f8c8d}\
table{border-collapse:collapse;width:100%;margin:1rem 0}\
th,td{padding:.5rem .75rem;text-align:left;border-bottom:1px solid #e0e0e0}\
th{background:#f8f9fa;font-weight:600}\
code{background:#f0f0f0;padding:2px 6px;border-radius:3px;font-size:.9em}\
.band-excellent{color:#1e8449}\
.band-good{color:#27ae60}\
.band-fair{color:#b7950b}\
.band-poor{color:#d35400}\
.band-critical{color:#c0392b;font-weight:600}\
.default-group{font-style:italic}\
.empty{padding:2rem;text-align:center;background:#fff;border-radius:8px}\
section{margin-bottom:2rem}\
footer{margin-top:3rem;text-align:center;color:#aaa;font-size:.85rem}";
