//src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop an analysis run.
///
/// Statistics whose denominator is zero (or regressions without enough
/// distinct points) are *not* errors: they come back as `f64::NAN` or `None`.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("required input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("{}:{line}: cannot parse {field}={value:?} ({reason})", path.display())]
    MalformedInput {
        path: PathBuf,
        line: u64,
        field: String,
        value: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type StatsResult<T> = Result<T, StatsError>;

impl StatsError {
    /// Shorthand used by the row parsers.
    pub fn malformed(
        path: &std::path::Path,
        line: u64,
        field: &str,
        value: &str,
        reason: impl Into<String>,
    ) -> Self {
        StatsError::MalformedInput {
            path: path.to_path_buf(),
            line,
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
