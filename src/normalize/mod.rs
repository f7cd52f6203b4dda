//! Result normalization.
//!
//! Turns the raw tabular artifacts of either alignment tool into one
//! [`ResultDocument`]: hits grouped per query, taxonomy decomposed from the
//! subject id, aligned pairs rebuilt with a midline, hits put in a
//! deterministic tool-specific order, and every input query present even when
//! the tool reported nothing for it.
//!
//! Failures are returned inside the document (`error`) rather than as a
//! partial result, so "no hits" and "could not read the output" stay distinct.

mod alignment;
mod blast;
mod fasta;
mod taxonomy;
mod vsearch;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};

use crate::error::{NormalizeError, NormalizeErrorKind};
use crate::job::Tool;

pub use alignment::{Alignment, AlignmentIndex, midline};
pub use blast::{BLAST_COLUMNS, normalize_blast};
pub use fasta::{InputSequences, gunzip, is_gzip};
pub use taxonomy::Taxonomy;
pub use vsearch::{VSEARCH_COLUMNS, normalize_vsearch};

/// Subject strand, normalized across tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strand {
    Plus,
    Minus,
}

impl Strand {
    /// Accepts BLAST's `plus`/`minus` and VSEARCH's `+`/`-`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "plus" | "+" => Some(Strand::Plus),
            "minus" | "-" => Some(Strand::Minus),
            _ => None,
        }
    }
}

/// One alignment between a query and a reference sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub sseqid: String,
    pub taxonomy: Taxonomy,
    pub pident: f64,
    pub length: u64,
    pub mismatch: u64,
    pub gapopen: u64,
    pub qstart: u64,
    pub qend: u64,
    pub sstart: u64,
    pub send: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evalue: Option<f64>,
    /// BLAST bit score; for VSEARCH the raw alignment score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitscore: Option<f64>,
    pub qcovs: f64,
    pub sstrand: Option<Strand>,
    pub slen: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_id: String,
    pub query_length: Option<u64>,
    pub hit_count: usize,
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total_queries: usize,
    pub total_hits: usize,
}

/// Canonical, tool-independent annotation result of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub tool: Tool,
    pub results: Vec<QueryResult>,
    pub summary: ResultSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NormalizeError>,
}

impl ResultDocument {
    /// A document that only reports why normalization failed.
    pub fn failed(tool: Tool, error: NormalizeError) -> Self {
        Self {
            tool,
            results: Vec::new(),
            summary: ResultSummary::default(),
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn query(&self, query_id: &str) -> Option<&QueryResult> {
        self.results.iter().find(|r| r.query_id == query_id)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), crate::error::EngineError> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Normalize the raw artifacts of a finished tool run.
///
/// `alignments` is the VSEARCH transcript; it is ignored for BLAST. A missing
/// transcript only means no aligned pairs are attached.
pub fn normalize_artifacts(
    tool: Tool,
    raw: &Path,
    alignments: Option<&Path>,
    input: Option<&InputSequences>,
) -> ResultDocument {
    let raw_text = match std::fs::read_to_string(raw) {
        Ok(text) => text,
        Err(e) => {
            return ResultDocument::failed(
                tool,
                NormalizeError::new(NormalizeErrorKind::Io, format!("{}: {e}", raw.display())),
            );
        }
    };

    match tool {
        Tool::Blast => normalize_blast(&raw_text, input),
        Tool::Vsearch => {
            let index = match alignments.map(std::fs::read_to_string) {
                Some(Ok(transcript)) => AlignmentIndex::parse(&transcript),
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "alignment transcript unreadable; hits will carry no alignments");
                    AlignmentIndex::default()
                }
                None => AlignmentIndex::default(),
            };
            normalize_vsearch(&raw_text, &index, input)
        }
    }
}

/// A parsed hit row before grouping.
pub(crate) struct RawHit {
    pub query_id: String,
    /// Query length as reported by the tool; zero means unknown.
    pub query_length: u64,
    pub hit: Hit,
}

/// Split tab-separated tool output into rows of exactly `columns` fields.
pub(crate) fn read_rows(raw: &str, columns: usize) -> Result<Vec<(u64, StringRecord)>, NormalizeError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(raw.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| NormalizeError::new(NormalizeErrorKind::Io, e.to_string()))?;
        if record.len() == 1 && record.get(0).is_some_and(|field| field.trim().is_empty()) {
            continue;
        }
        let line = record.position().map_or(0, |p| p.line());
        if record.len() != columns {
            return Err(NormalizeError::new(
                NormalizeErrorKind::ColumnCount,
                format!("line {line}: expected {columns} columns, found {}", record.len()),
            ));
        }
        rows.push((line, record));
    }
    Ok(rows)
}

/// Coerce column `idx` of `record` to a number.
pub(crate) fn number<T: FromStr>(
    record: &StringRecord,
    idx: usize,
    name: &str,
    line: u64,
) -> Result<T, NormalizeError> {
    let raw = record.get(idx).unwrap_or_default().trim();
    raw.parse().map_err(|_| {
        NormalizeError::new(
            NormalizeErrorKind::InvalidNumber,
            format!("line {line}: column {name} is not a number: {raw:?}"),
        )
    })
}

pub(crate) fn text(record: &StringRecord, idx: usize) -> String {
    record.get(idx).unwrap_or_default().trim().to_string()
}

/// Descending on present values; absent values sort last.
pub(crate) fn desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ascending on present values; absent values sort last.
pub(crate) fn asc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Group hits per query, order them with `order`, and backfill queries from
/// `input` that have no hits.
///
/// Queries follow input-file order; queries only seen in the tool output
/// come after, in order of first appearance.
pub(crate) fn assemble(
    tool: Tool,
    hits: Vec<RawHit>,
    input: Option<&InputSequences>,
    order: fn(&Hit, &Hit) -> Ordering,
) -> ResultDocument {
    let mut groups: Vec<QueryResult> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    if let Some(input) = input {
        for (id, len) in input.iter() {
            slots.insert(id.to_string(), groups.len());
            groups.push(QueryResult {
                query_id: id.to_string(),
                query_length: Some(len),
                hit_count: 0,
                hits: Vec::new(),
            });
        }
    }

    for raw in hits {
        let slot = *slots.entry(raw.query_id.clone()).or_insert_with(|| {
            groups.push(QueryResult {
                query_id: raw.query_id.clone(),
                query_length: None,
                hit_count: 0,
                hits: Vec::new(),
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        if raw.query_length > 0 {
            group.query_length = Some(raw.query_length);
        }
        group.hits.push(raw.hit);
    }

    let mut total_hits = 0;
    for group in &mut groups {
        group.hits.sort_by(order);
        group.hit_count = group.hits.len();
        total_hits += group.hit_count;
    }

    ResultDocument {
        tool,
        summary: ResultSummary {
            total_queries: groups.len(),
            total_hits,
        },
        results: groups,
        error: None,
    }
}
