use std::path::{Path, PathBuf};

use crate::error::RenderError;
use crate::types::AnalysisResult;

use super::ReportContext;

/// Common interface for report formats.
pub trait ReportRenderer: Send + Sync {
    /// Format name, as used in configuration and on the command line.
    fn name(&self) -> &'static str;

    /// Output file name relative to the report directory.
    fn output_path(&self) -> &'static str;

    /// Produce the report. Pure: the same input always yields the same bytes.
    fn render(&self, result: &AnalysisResult, ctx: &ReportContext)
    -> crate::error::Result<String>;

    /// Render and write the report into `output_dir`, returning the file written.
    fn write(
        &self,
        result: &AnalysisResult,
        ctx: &ReportContext,
        output_dir: &Path,
    ) -> crate::error::Result<PathBuf> {
        let content = self.render(result, ctx)?;
        let output = output_dir.join(self.output_path());
        let io_err = |source| RenderError::Io {
            path: output.display().to_string(),
            source,
        };
        std::fs::create_dir_all(output_dir).map_err(io_err)?;
        std::fs::write(&output, content).map_err(io_err)?;
        Ok(output)
    }
}
