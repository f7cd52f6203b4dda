//! Collaborators the engine consults before a job exists: the upload store
//! (file id to path) and the reference-database registry (database id plus
//! tool/algorithm to a concrete database path).

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use flate2::read::MultiGzDecoder;
use uuid::Uuid;

use crate::config::RefDbConfig;
use crate::error::EngineError;
use crate::job::{Algorithm, Tool};
use crate::normalize::is_gzip;

/// Accepted upload extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".fasta", ".fa", ".fna", ".fa.gz", ".fna.gz", ".txt", ".txt.gz"];

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Maps an opaque file id to a path on durable storage.
pub trait UploadStore: Send + Sync {
    fn resolve(&self, file_id: &str) -> Option<PathBuf>;
}

#[derive(Default)]
pub struct MemoryUploadStore {
    files: RwLock<HashMap<String, PathBuf>>,
}

impl MemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing FASTA file and return its new file id.
    ///
    /// The name must carry one of [`ALLOWED_EXTENSIONS`], the file must not
    /// exceed [`MAX_UPLOAD_BYTES`] and the content must have at least one `>`
    /// header line.
    pub fn register(&self, path: &Path) -> Result<String, EngineError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            return Err(EngineError::Invalid(format!(
                "Invalid file extension. Allowed extensions: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }
        if std::fs::metadata(path)?.len() > MAX_UPLOAD_BYTES {
            return Err(EngineError::Invalid("File too large".into()));
        }
        if !has_fasta_header(path)? {
            return Err(EngineError::Invalid(
                "Invalid FASTA format. File must contain sequences in FASTA format.".into(),
            ));
        }

        let file_id = Uuid::new_v4().to_string();
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(file_id.clone(), path.to_path_buf());
        tracing::debug!(%file_id, path = %path.display(), "registered upload");
        Ok(file_id)
    }
}

impl UploadStore for MemoryUploadStore {
    fn resolve(&self, file_id: &str) -> Option<PathBuf> {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(file_id)
            .cloned()
    }
}

fn has_fasta_header(path: &Path) -> Result<bool, EngineError> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    for line in BufReader::new(reader).lines() {
        // Undecodable content is simply not FASTA.
        let Ok(line) = line else { return Ok(false) };
        if line.starts_with('>') {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Public description of a reference database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefDbInfo {
    pub id: String,
    pub description: String,
    pub version: String,
    pub regions: Vec<String>,
    pub tools_supported: Vec<Tool>,
}

pub trait RefDbRegistry: Send + Sync {
    /// Path of `db_id` for the given tool/algorithm pair.
    fn resolve(&self, db_id: &str, tool: Tool, algorithm: Algorithm) -> Result<PathBuf, EngineError>;

    fn list(&self) -> Vec<RefDbInfo>;
}

/// Registry backed by the `[refdbs]` table of the configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigRefDbRegistry {
    databases: BTreeMap<String, RefDbConfig>,
}

impl ConfigRefDbRegistry {
    pub fn new(databases: BTreeMap<String, RefDbConfig>) -> Self {
        Self { databases }
    }
}

/// Key under `paths` holding the database for a tool/algorithm pair.
fn path_key(tool: Tool, algorithm: Algorithm) -> &'static str {
    match (tool, algorithm) {
        (Tool::Blast, _) => "blast",
        (Tool::Vsearch, Algorithm::SearchExact) => "vsearch_exact",
        (Tool::Vsearch, _) => "vsearch_global",
    }
}

impl RefDbRegistry for ConfigRefDbRegistry {
    fn resolve(&self, db_id: &str, tool: Tool, algorithm: Algorithm) -> Result<PathBuf, EngineError> {
        let db = self
            .databases
            .get(db_id)
            .ok_or_else(|| EngineError::DatabaseNotFound(db_id.to_string()))?;
        db.paths.get(path_key(tool, algorithm)).cloned().ok_or_else(|| {
            EngineError::Invalid(format!(
                "Reference database '{db_id}' does not support {tool} with algorithm {algorithm}"
            ))
        })
    }

    fn list(&self) -> Vec<RefDbInfo> {
        self.databases
            .iter()
            .map(|(id, db)| {
                let mut tools_supported = Vec::new();
                if db.paths.contains_key("blast") {
                    tools_supported.push(Tool::Blast);
                }
                if db.paths.keys().any(|k| k.starts_with("vsearch_")) {
                    tools_supported.push(Tool::Vsearch);
                }
                RefDbInfo {
                    id: id.clone(),
                    description: db.description.clone(),
                    version: db.version.clone(),
                    regions: db.regions.clone(),
                    tools_supported,
                }
            })
            .collect()
    }
}
