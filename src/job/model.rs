use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// External alignment tools the engine knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Blast,
    Vsearch,
}

impl Tool {
    /// Thread count used when the job parameters do not ask for one.
    pub const DEFAULT_THREADS: u64 = 4;

    /// Name of the job parameter carrying the requested thread count.
    pub fn threads_param(&self) -> &'static str {
        match self {
            Tool::Blast => "num_threads",
            Tool::Vsearch => "threads",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Blast => write!(f, "blast"),
            Tool::Vsearch => write!(f, "vsearch"),
        }
    }
}

impl FromStr for Tool {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blast" => Ok(Tool::Blast),
            "vsearch" => Ok(Tool::Vsearch),
            other => Err(EngineError::Invalid(format!("unsupported tool: {other}"))),
        }
    }
}

/// Search mode within a tool. Each algorithm belongs to exactly one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "blastn")]
    Blastn,
    #[serde(rename = "megablast")]
    Megablast,
    #[serde(rename = "dc-megablast")]
    DcMegablast,
    #[serde(rename = "usearch_global")]
    UsearchGlobal,
    #[serde(rename = "search_exact")]
    SearchExact,
}

impl Algorithm {
    pub fn tool(&self) -> Tool {
        match self {
            Algorithm::Blastn | Algorithm::Megablast | Algorithm::DcMegablast => Tool::Blast,
            Algorithm::UsearchGlobal | Algorithm::SearchExact => Tool::Vsearch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Blastn => "blastn",
            Algorithm::Megablast => "megablast",
            Algorithm::DcMegablast => "dc-megablast",
            Algorithm::UsearchGlobal => "usearch_global",
            Algorithm::SearchExact => "search_exact",
        }
    }

    /// Rejects algorithms that do not belong to `tool`.
    pub fn check_tool(&self, tool: Tool) -> Result<(), EngineError> {
        if self.tool() == tool {
            Ok(())
        } else {
            Err(EngineError::Invalid(format!(
                "algorithm {} is not available for {tool}",
                self.as_str()
            )))
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blastn" => Ok(Algorithm::Blastn),
            "megablast" => Ok(Algorithm::Megablast),
            "dc-megablast" => Ok(Algorithm::DcMegablast),
            "usearch_global" => Ok(Algorithm::UsearchGlobal),
            "search_exact" => Ok(Algorithm::SearchExact),
            other => Err(EngineError::Invalid(format!("unsupported algorithm: {other}"))),
        }
    }
}

/// A tool parameter value as accepted from callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Integer(i) => Some(*i as f64),
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Non-negative integer view; fractional numbers are truncated.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ParamValue::Integer(i) => u64::try_from(*i).ok(),
            ParamValue::Number(n) if *n >= 0.0 => Some(n.trunc() as u64),
            ParamValue::Number(_) => None,
            ParamValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<&str> for ParamValue {
    /// Parses CLI-style `key=value` values, preferring numbers.
    fn from(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            ParamValue::Integer(i)
        } else if let Ok(n) = raw.parse::<f64>() {
            ParamValue::Number(n)
        } else {
            ParamValue::Text(raw.to_string())
        }
    }
}

pub type Parameters = BTreeMap<String, ParamValue>;

/// Caller-supplied description of an annotation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub file_id: String,
    pub tool: Tool,
    pub algorithm: Algorithm,
    /// Reference database identifier, resolved through the registry.
    pub database: String,
    #[serde(default)]
    pub parameters: Parameters,
}

/// Tracks the lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Finished => write!(f, "finished"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "finished" => Ok(JobStatus::Finished),
            "failed" => Ok(JobStatus::Failed),
            other => Err(EngineError::Invalid(format!(
                "invalid status value: {other}. Valid values are: queued, running, finished, failed."
            ))),
        }
    }
}

/// Which stage of execution a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The input file disappeared between submission and execution.
    Input,
    /// The external tool could not be launched or exited non-zero.
    ToolExecution,
    /// The tool succeeded but its output could not be normalized.
    Parse,
    /// Anything else: artifact writes, worker panics.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Input => write!(f, "input"),
            FailureKind::ToolExecution => write!(f, "tool execution"),
            FailureKind::Parse => write!(f, "parse"),
            FailureKind::Internal => write!(f, "internal"),
        }
    }
}

/// Bytes of tool stderr kept on a failure.
pub const STDERR_TAIL_BYTES: usize = 4096;

/// Short, user-facing account of why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Tail of the tool's stderr, for diagnostics only. Never shown to
    /// clients as the job error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stderr: None,
        }
    }

    /// Attach the last [`STDERR_TAIL_BYTES`] of `stderr`. Blank output is dropped.
    pub fn with_stderr(mut self, stderr: &str) -> Self {
        let stderr = stderr.trim_end();
        if stderr.trim().is_empty() {
            return self;
        }
        let mut start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
        while !stderr.is_char_boundary(start) {
            start += 1;
        }
        self.stderr = Some(stderr[start..].to_string());
        self
    }
}

/// One requested annotation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub file_id: String,
    pub tool: Tool,
    pub algorithm: Algorithm,
    pub database: String,
    pub database_path: PathBuf,
    pub parameters: Parameters,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: Option<String>,
    /// Output artifacts keyed by kind (`raw`, `alignments`, `json`).
    pub result_files: BTreeMap<String, PathBuf>,
    pub failure: Option<JobFailure>,
}

impl Job {
    pub fn new(request: JobRequest, database_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_id: request.file_id,
            tool: request.tool,
            algorithm: request.algorithm,
            database: request.database,
            database_path,
            parameters: request.parameters,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: None,
            result_files: BTreeMap::new(),
            failure: None,
        }
    }

    /// Thread count the caller asked for, or `default`.
    pub fn requested_threads(&self, default: u64) -> u64 {
        self.parameters
            .get(self.tool.threads_param())
            .and_then(ParamValue::as_u64)
            .unwrap_or(default)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
