//! Tool invocation adapter.
//!
//! Translates a job's (tool, algorithm, database, parameters) tuple into one
//! external command line, runs it through a [`CommandExecutor`], and maps
//! the exit status to either the raw artifact paths or a [`ToolError`].
//! The raw output itself is never interpreted here.

mod blast;
mod process;
mod vsearch;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BlastDefaults, EngineConfig, ToolPaths, VsearchDefaults};
use crate::error::ToolError;
use crate::job::{Algorithm, Job, ParamValue, Parameters, Tool};

pub use process::ProcessExecutor;

/// A fully built external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Files a tool run leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtifacts {
    /// Primary tabular hit table.
    pub hits: PathBuf,
    /// VSEARCH alignment transcript.
    pub alignments: Option<PathBuf>,
}

impl RawArtifacts {
    /// Artifact paths keyed by kind, as recorded on the job.
    pub fn files(&self) -> BTreeMap<String, PathBuf> {
        let mut files = BTreeMap::from([("raw".to_string(), self.hits.clone())]);
        if let Some(alignments) = &self.alignments {
            files.insert("alignments".to_string(), alignments.clone());
        }
        files
    }
}

/// A planned run: the command and where it will write.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: ToolCommand,
    pub artifacts: RawArtifacts,
}

/// Everything needed to plan one tool run.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool: Tool,
    pub algorithm: Algorithm,
    pub input: PathBuf,
    pub database: PathBuf,
    pub parameters: Parameters,
    /// CPU count granted by the governor.
    pub cpus: u64,
    /// Job-scoped directory the raw artifacts go into.
    pub output_dir: PathBuf,
}

impl ToolRequest {
    pub fn for_job(job: &Job, input: &Path, cpus: u64, output_dir: &Path) -> Self {
        Self {
            tool: job.tool,
            algorithm: job.algorithm,
            input: input.to_path_buf(),
            database: job.database_path.clone(),
            parameters: job.parameters.clone(),
            cpus,
            output_dir: output_dir.to_path_buf(),
        }
    }

    fn param_f64(&self, key: &str, default: f64) -> f64 {
        self.parameters
            .get(key)
            .and_then(ParamValue::as_f64)
            .unwrap_or(default)
    }

    fn param_u64(&self, key: &str, default: u64) -> u64 {
        self.parameters
            .get(key)
            .and_then(ParamValue::as_u64)
            .unwrap_or(default)
    }
}

/// Captured outcome of an external process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands. The production implementation spawns real
/// processes; tests substitute fakes that write canned output.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &ToolCommand) -> std::io::Result<ProcessOutput>;
}

/// Executable names and per-tool parameter defaults.
#[derive(Debug, Clone, Default)]
pub struct ToolSettings {
    pub paths: ToolPaths,
    pub blast: BlastDefaults,
    pub vsearch: VsearchDefaults,
}

impl From<&EngineConfig> for ToolSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            paths: config.tools.clone(),
            blast: config.blast.clone(),
            vsearch: config.vsearch.clone(),
        }
    }
}

pub struct ToolAdapter {
    executor: Arc<dyn CommandExecutor>,
    settings: ToolSettings,
}

impl ToolAdapter {
    pub fn new(executor: Arc<dyn CommandExecutor>, settings: ToolSettings) -> Self {
        Self { executor, settings }
    }

    /// Thread count used when a job does not request one.
    pub fn default_threads(&self, tool: Tool) -> u64 {
        match tool {
            Tool::Blast => self.settings.blast.num_threads,
            Tool::Vsearch => self.settings.vsearch.threads,
        }
    }

    pub fn plan(&self, request: &ToolRequest) -> Invocation {
        match request.tool {
            Tool::Blast => blast::plan(&self.settings.paths.blast, &self.settings.blast, request),
            Tool::Vsearch => {
                vsearch::plan(&self.settings.paths.vsearch, &self.settings.vsearch, request)
            }
        }
    }

    /// Run the tool to completion. Any non-zero exit is a hard failure; no
    /// partial output is salvaged.
    pub async fn run(&self, request: &ToolRequest) -> Result<RawArtifacts, ToolError> {
        let invocation = self.plan(request);
        tracing::info!(tool = %request.tool, cpus = request.cpus, command = %invocation.command, "launching alignment tool");

        let output = self
            .executor
            .execute(&invocation.command)
            .await
            .map_err(|source| ToolError::Spawn {
                program: invocation.command.program.clone(),
                source,
            })?;

        if !output.success() {
            tracing::error!(
                tool = %request.tool,
                code = ?output.code,
                stderr = %output.stderr.trim(),
                "alignment tool failed"
            );
            return Err(ToolError::NonZeroExit {
                tool: request.tool,
                code: output.code,
                stderr: output.stderr,
            });
        }

        Ok(invocation.artifacts)
    }
}
