use std::path::PathBuf;

use thiserror::Error;

/// Fatal, stage-level failures.
///
/// Per-record problems (malformed lines, unmatched gold entries) never reach
/// this type: they are dropped where they occur and tallied in job counters.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Reading or writing a file failed.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An input path does not exist or holds no readable files.
    #[error("input not found: '{}'", path.display())]
    MissingInput { path: PathBuf },

    /// The totals record is absent or lacks L or F.
    #[error("total counters have not been found at '{}'", path.display())]
    MissingTotals { path: PathBuf },

    /// A totals line could not be parsed.
    #[error("malformed totals record in '{}': {line:?}", path.display())]
    MalformedTotals { path: PathBuf, line: String },

    /// The JSON configuration file is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The configuration file could not be opened.
    #[error("cannot read configuration '{}': {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker pool could not be created.
    #[error("cannot build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A stage reported failure; the pipeline stops here.
    #[error("stage {stage} failed: {reason}")]
    StageFailed { stage: &'static str, reason: String },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
