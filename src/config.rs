//! Engine configuration loaded from `eutax.toml`.
//!
//! [`EngineConfig`] holds every tunable. Values missing from the file fall
//! back to sensible defaults. `EUTAX_CONFIG_PATH` selects a different file and
//! `OUTPUT_DIR` takes precedence over the file's `output_dir`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::EngineError;

pub const CONFIG_FILE: &str = "eutax.toml";
pub const CONFIG_PATH_ENV: &str = "EUTAX_CONFIG_PATH";
pub const OUTPUT_DIR_ENV: &str = "OUTPUT_DIR";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory for per-job output directories.
    pub output_dir: PathBuf,

    /// Maximum number of jobs executing at once.
    pub max_concurrent_jobs: usize,

    /// CPU count shared between concurrent jobs. Defaults to the host's
    /// available parallelism.
    pub total_cpus: Option<u64>,

    /// Capacity of the bounded submission channel.
    pub queue_capacity: usize,

    /// Durable job summary database. Defaults to `<output_dir>/job_summaries.db`.
    pub summary_path: Option<PathBuf>,

    pub tools: ToolPaths,
    pub blast: BlastDefaults,
    pub vsearch: VsearchDefaults,

    /// Reference databases keyed by id.
    pub refdbs: BTreeMap<String, RefDbConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            max_concurrent_jobs: 2,
            total_cpus: None,
            queue_capacity: 64,
            summary_path: None,
            tools: ToolPaths::default(),
            blast: BlastDefaults::default(),
            vsearch: VsearchDefaults::default(),
            refdbs: BTreeMap::new(),
        }
    }
}

/// Executable names or paths of the alignment tools.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub blast: String,
    pub vsearch: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            blast: "blastn".to_string(),
            vsearch: "vsearch".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlastDefaults {
    pub max_target_seqs: u64,
    pub num_threads: u64,
}

impl Default for BlastDefaults {
    fn default() -> Self {
        Self {
            max_target_seqs: 10,
            num_threads: 4,
        }
    }
}

/// VSEARCH defaults. `id` and `query_cov` are percentages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VsearchDefaults {
    pub id: f64,
    pub query_cov: f64,
    pub maxaccepts: u64,
    pub maxrejects: u64,
    pub maxhits: u64,
    pub threads: u64,
}

impl Default for VsearchDefaults {
    fn default() -> Self {
        Self {
            id: 70.0,
            query_cov: 50.0,
            maxaccepts: 100,
            maxrejects: 100,
            maxhits: 100,
            threads: 4,
        }
    }
}

/// One reference database. `paths` is keyed by `blast`, `vsearch_global`
/// and `vsearch_exact`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RefDbConfig {
    pub description: String,
    pub version: String,
    pub regions: Vec<String>,
    pub paths: BTreeMap<String, PathBuf>,
}

impl EngineConfig {
    /// Load from `EUTAX_CONFIG_PATH`, or `eutax.toml` in the current
    /// directory. Uses defaults when the file does not exist.
    pub fn load() -> Result<Self, EngineError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Load from an explicit path, applying environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, EngineError> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::from_toml(&contents)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_toml(contents: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = toml::from_str(contents)?;
        if config.queue_capacity == 0 {
            return Err(EngineError::Config("queue_capacity must be at least 1".into()));
        }
        Ok(config)
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(OUTPUT_DIR_ENV)
            && !dir.is_empty()
        {
            self.output_dir = PathBuf::from(dir);
        }
        self
    }

    /// Concurrency bound, never below one.
    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs.max(1)
    }

    pub fn total_cpus(&self) -> u64 {
        self.total_cpus.filter(|&n| n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() as u64)
                .unwrap_or(1)
        })
    }

    pub fn summary_path(&self) -> PathBuf {
        self.summary_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join("job_summaries.db"))
    }
}
