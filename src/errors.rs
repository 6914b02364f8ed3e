use std::path::PathBuf;

use arrow::error::ArrowError;
use polars::prelude::PolarsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    /// A single input line could not be parsed. Recoverable: the record is
    /// skipped and counted.
    #[error("malformed interval in {path}:{line}: {reason}")]
    MalformedInterval {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("no valid intervals in {path} ({malformed} malformed lines)")]
    EmptyIntervalFile { path: String, malformed: usize },

    /// A symbol or name missing from a lookup. Recoverable: the candidate
    /// edge or node is dropped.
    #[error("unresolved identifier '{identifier}' ({context})")]
    UnresolvedIdentifier { identifier: String, context: String },

    #[error("stage '{stage}' completed {completed} of {expected} tasks; failed: {failed:?}")]
    IncompleteBarrier {
        stage: String,
        expected: usize,
        completed: usize,
        failed: Vec<String>,
    },

    #[error("node '{node}' has no complete feature vector at export time")]
    IncompleteGraph { node: String },

    #[error("unknown {kind} '{value}'")]
    CallerConfiguration { kind: &'static str, value: String },

    #[error("intervals in '{label}' are not sorted by (chromosome, start, end)")]
    UnsortedIntervals { label: String },

    #[error("chromosome '{0}' is missing from the chromosome size table")]
    MissingChromosome(String),

    #[error("missing column '{column}' in {path}")]
    MissingColumn { path: String, column: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Arrow(#[from] ArrowError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GraphError {
    /// Fatal errors abort the tissue run. Everything else is skipped and
    /// counted by the stage that produced it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GraphError::MalformedInterval { .. } | GraphError::UnresolvedIdentifier { .. }
        )
    }

    pub fn unresolved(identifier: impl Into<String>, context: impl Into<String>) -> Self {
        GraphError::UnresolvedIdentifier {
            identifier: identifier.into(),
            context: context.into(),
        }
    }
}
