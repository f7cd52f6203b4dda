use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{JobStatus, Tool};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("File ID '{0}' not found. Upload a FASTA file first.")]
    UploadNotFound(String),

    #[error("Job ID '{0}' not found.")]
    JobNotFound(String),

    #[error("Reference database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Job store error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Summary database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl EngineError {
    /// True for errors surfaced synchronously to the caller: unknown
    /// identifiers and unsupported tool/algorithm/database combinations.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EngineError::UploadNotFound(_)
                | EngineError::JobNotFound(_)
                | EngineError::DatabaseNotFound(_)
                | EngineError::Invalid(_)
        )
    }
}

/// Failure of an external alignment tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran but exited unsuccessfully. `stderr` is kept for
    /// diagnostics and deliberately left out of the display message.
    #[error("{tool} exited with status {}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    NonZeroExit {
        tool: Tool,
        code: Option<i32>,
        stderr: String,
    },
}

impl ToolError {
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ToolError::NonZeroExit { stderr, .. } => Some(stderr),
            ToolError::Spawn { .. } => None,
        }
    }
}

/// What went wrong while turning raw tool output into a result document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeErrorKind {
    /// A row did not have the column count of the expected layout.
    ColumnCount,
    /// A numeric column could not be coerced.
    InvalidNumber,
    /// The input sequence file could not be parsed.
    InputSequences,
    /// A raw artifact could not be read.
    Io,
}

impl fmt::Display for NormalizeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeErrorKind::ColumnCount => write!(f, "column count mismatch"),
            NormalizeErrorKind::InvalidNumber => write!(f, "invalid number"),
            NormalizeErrorKind::InputSequences => write!(f, "unreadable input sequences"),
            NormalizeErrorKind::Io => write!(f, "io"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct NormalizeError {
    pub kind: NormalizeErrorKind,
    pub message: String,
}

impl NormalizeError {
    pub fn new(kind: NormalizeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {job_id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
}
