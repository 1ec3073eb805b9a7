use std::path::PathBuf;

/// Failures a pipeline cycle can end with.
///
/// Malformed lines are not errors; they are dropped and counted by the loaders.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Input file missing, empty, or without a single parseable line. Retried next cycle.
    #[error("input not ready: {} ({reason})", path.display())]
    InputNotReady { path: PathBuf, reason: &'static str },

    /// A column the reducer depends on is absent from every line of the input.
    #[error("column '{column}' missing from {}", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json encode failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Retryable conditions are logged at warning level and skip the cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::InputNotReady { .. } | PipelineError::MissingColumn { .. }
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
