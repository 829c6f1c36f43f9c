// Tree renderer — project → package → unit outline.

use std::fmt::Write as _;

use tracing::{info, instrument};

use super::traits::ReportRenderer;
use super::view::{ReportView, UnitRow};
use super::{NO_DATA_MESSAGE, ReportContext};
use crate::types::AnalysisResult;

const BRANCH: &str = "├── ";
const LAST: &str = "└── ";
const PIPE: &str = "│   ";
const BLANK: &str = "    ";

#[derive(Debug)]
pub struct TreeRenderer;

impl ReportRenderer for TreeRenderer {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn output_path(&self) -> &'static str {
        "coverage-tree.txt"
    }

    #[instrument(skip_all, name = "tree_render")]
    fn render(
        &self,
        result: &AnalysisResult,
        ctx: &ReportContext,
    ) -> crate::error::Result<String> {
        let view = ReportView::build(result, &ctx.settings);
        let mut t = String::with_capacity(2048);
        let _ = writeln!(t, "{}", ctx.project_name);

        match &view {
            ReportView::Empty => {
                let _ = writeln!(t, "{LAST}{NO_DATA_MESSAGE}");
            }
            ReportView::Populated(view) => {
                let _ = writeln!(
                    t,
                    "{BRANCH}summary: {}",
                    view.summary
                        .averages()
                        .iter()
                        .map(|(d, p)| format!("{} {}", d.as_str(), p.text))
                        .collect::<Vec<_>>()
                        .join(" | ")
                );
                for (i, group) in view.groups.iter().enumerate() {
                    let last_group = i + 1 == view.groups.len();
                    let (head, indent) = if last_group { (LAST, BLANK) } else { (BRANCH, PIPE) };
                    let _ = writeln!(t, "{head}{}/", group.key);
                    for (j, row) in group.rows.iter().enumerate() {
                        let leaf = if j + 1 == group.rows.len() { LAST } else { BRANCH };
                        let _ = writeln!(t, "{indent}{leaf}{}", unit_label(row));
                    }
                }
            }
        }

        info!(bytes = t.len(), "Tree report rendered");
        Ok(t)
    }
}

fn unit_label(row: &UnitRow) -> String {
    let cells: Vec<String> = row
        .cells()
        .iter()
        .map(|(d, p)| format!("{}={}", &d.as_str()[..1], p.text))
        .collect();
    format!("{}  [{}]  {}", row.name, row.line.band, cells.join(" "))
}
