/// Top-level covlens error type.
///
/// All fallible operations in `covlens-core` return [`Result<T, CovlensError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum CovlensError {
    /// The execution-record file exists but could not be loaded. Fatal for a run.
    #[error("Execution record error: {0}")]
    RecordLoad(#[from] RecordLoadError),

    /// A single artifact could not be parsed. Recovered by skipping the artifact.
    #[error("Artifact error: {0}")]
    ArtifactParse(#[from] ArtifactParseError),

    /// Error during report rendering or writing.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The run was aborted through its cancellation token.
    #[error("Analysis cancelled")]
    Cancelled,

    /// Filesystem I/O error outside the categories above.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors loading an execution-record file.
#[derive(thiserror::Error, Debug)]
pub enum RecordLoadError {
    /// Filesystem error while reading the record.
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The first block is not a header, or the magic number is wrong.
    #[error("Invalid execution data file")]
    InvalidHeader,

    /// The header declares a format version this reader does not understand.
    #[error("Incompatible execution data version {found:#06x} (expected {expected:#06x})")]
    IncompatibleVersion { found: u16, expected: u16 },

    /// A block type byte that is not header, session info, or execution data.
    #[error("Unknown block type {0:#04x}")]
    UnknownBlock(u8),

    /// The data ended in the middle of a block.
    #[error("Unexpected end of execution data")]
    Truncated,

    /// A length-prefixed string is not valid modified UTF-8.
    #[error("Malformed string in execution data")]
    MalformedString,

    /// Two entries for the same class id disagree on the class name.
    #[error("Different class names {existing} and {incoming} for id {id:016x}")]
    NameConflict {
        id: i64,
        existing: String,
        incoming: String,
    },

    /// Two entries for the same class id disagree on the probe count.
    #[error("Incompatible execution data for class {name} with id {id:016x}")]
    ProbeCountMismatch { id: i64, name: String },
}

/// Errors parsing one artifact.
#[derive(thiserror::Error, Debug)]
pub enum ArtifactParseError {
    /// Filesystem error while reading the artifact.
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The artifact is not a class file (bad magic or truncated structure).
    #[error("Malformed class file {path}: {message}")]
    Malformed {
        /// Path of the artifact that failed to parse.
        path: String,
        /// Description of the parse failure.
        message: String,
    },

    /// The artifact uses bytecode the engine cannot analyse.
    #[error("Unsupported bytecode in {path}: {message}")]
    Unsupported { path: String, message: String },

    /// The artifact is a container format the engine does not open.
    #[error("Unsupported artifact format: {0}")]
    UnsupportedFormat(String),

    /// A unit with the same name was already produced earlier in the run.
    #[error("Duplicate unit {name} in {path}")]
    DuplicateUnit { name: String, path: String },
}

/// Errors during the rendering phase.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// JSON serialization of the aggregate failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested report format does not exist.
    #[error("Unknown report format: {0}")]
    UnknownFormat(String),

    /// Filesystem I/O error writing rendered output.
    #[error("Cannot write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors in covlens configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, CovlensError>`.
pub type Result<T> = std::result::Result<T, CovlensError>;
