use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, CovlensError};

/// Directory holding project-local covlens state.
pub const CONFIG_DIR: &str = ".covlens";
/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Ordering of package groups in hierarchical views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GroupOrder {
    /// Order of first appearance in the analysis result.
    #[default]
    FirstSeen,
    /// Lexicographic by group key.
    Alphabetical,
}

/// Top-level covlens configuration, matching `.covlens/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CovlensConfig {
    #[serde(default)]
    pub covlens: CovlensSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CovlensSection {
    pub version: String,
}

impl Default for CovlensSection {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSection {
    /// Execution-record file, relative to the project root. Discovered when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec_file: Option<PathBuf>,
    /// Explicit artifact paths. Discovered when empty.
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
    /// Glob patterns excluded from artifact discovery.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            exec_file: None,
            artifacts: Vec::new(),
            exclude_patterns: vec![
                "**/.git/**".into(),
                "**/.gradle/**".into(),
                "**/node_modules/**".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// Units with line coverage strictly below this value need improvement.
    pub needs_improvement_threshold: f64,
    pub group_order: GroupOrder,
    /// Group key for units without a namespace.
    pub default_group: String,
    /// Renderer names to run (`text`, `tree`, `html`, `json`).
    pub formats: Vec<String>,
    /// Output directory, relative to the project root.
    pub output_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            needs_improvement_threshold: 70.0,
            group_order: GroupOrder::FirstSeen,
            default_group: "default".to_string(),
            formats: vec!["text".into(), "html".into()],
            output_dir: PathBuf::from("coverage-report"),
            project_name: None,
        }
    }
}

impl CovlensConfig {
    /// Path of the config file for a project root.
    pub fn path_for(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Read, parse, and validate a config file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()).into());
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Load the project config if present, defaults otherwise.
    pub fn load_or_default(project_root: &Path) -> crate::error::Result<Self> {
        let path = Self::path_for(project_root);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(text: &str) -> crate::error::Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> crate::error::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CovlensError::Config(ConfigError::Invalid(e.to_string())))
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        let threshold = self.report.needs_improvement_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "needs_improvement_threshold must be within 0..=100, got {threshold}"
            ))
            .into());
        }
        if self.report.default_group.trim().is_empty() {
            return Err(ConfigError::Invalid("default_group must not be empty".into()).into());
        }
        for format in &self.report.formats {
            if !crate::pipeline::CoveragePipeline::ALL_RENDERER_NAMES.contains(&format.as_str()) {
                return Err(ConfigError::Invalid(format!("unknown report format: {format}")).into());
            }
        }
        for pattern in &self.analysis.exclude_patterns {
            glob::Pattern::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("bad exclude pattern {pattern}: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_roundtrip_through_toml() {
        let config = CovlensConfig::default();
        let text = config.to_toml().unwrap();
        let back = CovlensConfig::parse(&text).unwrap();
        assert!((back.report.needs_improvement_threshold - 70.0).abs() < f64::EPSILON);
        assert_eq!(back.report.group_order, GroupOrder::FirstSeen);
        assert_eq!(back.report.formats, vec!["text", "html"]);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = CovlensConfig::parse("").unwrap();
        assert_eq!(config.report.default_group, "default");
        assert!(config.analysis.exec_file.is_none());
    }

    #[test]
    fn partial_report_table_keeps_other_defaults() {
        let config = CovlensConfig::parse("[report]\nneeds_improvement_threshold = 80.0\n").unwrap();
        assert!((config.report.needs_improvement_threshold - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.report.default_group, "default");
        assert_eq!(config.report.formats, vec!["text", "html"]);
        assert_eq!(config.report.output_dir, PathBuf::from("coverage-report"));
        assert_eq!(config.covlens.version, "0.1.0");
    }

    #[test]
    fn alphabetical_order_parses() {
        let config = CovlensConfig::parse(
            "[report]\nneeds_improvement_threshold = 80.0\ngroup_order = \"alphabetical\"\n\
             default_group = \"(root)\"\nformats = [\"json\"]\noutput_dir = \"out\"\n",
        )
        .unwrap();
        assert_eq!(config.report.group_order, GroupOrder::Alphabetical);
        assert_eq!(config.report.default_group, "(root)");
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let err = CovlensConfig::parse(
            "[report]\nneeds_improvement_threshold = 120.0\ndefault_group = \"default\"\n\
             formats = []\noutput_dir = \"out\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, CovlensError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unknown_format() {
        let err = CovlensConfig::parse(
            "[report]\nneeds_improvement_threshold = 70.0\ndefault_group = \"default\"\n\
             formats = [\"pdf\"]\noutput_dir = \"out\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("pdf"));
    }

    #[test]
    fn rejects_bad_toml() {
        let err = CovlensConfig::parse("[report\n").unwrap_err();
        assert!(matches!(err, CovlensError::Config(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = CovlensConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, CovlensError::Config(ConfigError::NotFound(_))));
    }
}
