//! Aligned sequence pairs and the VSEARCH alignment transcript.
//!
//! BLAST reports the aligned query/subject subsequences directly in its
//! tabular output. VSEARCH only writes them to the human-readable `--alnout`
//! transcript, which [`AlignmentIndex`] turns into a lookup keyed by
//! `(query, target)`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const MATCH: char = '|';
const MISMATCH: char = ' ';

/// Aligned query/subject pair with a match midline between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alignment {
    pub qseq: String,
    pub midline: String,
    pub sseq: String,
}

impl Alignment {
    pub fn new(qseq: impl Into<String>, sseq: impl Into<String>) -> Self {
        let qseq = qseq.into();
        let sseq = sseq.into();
        let midline = midline(&qseq, &sseq);
        Self {
            qseq,
            midline,
            sseq,
        }
    }
}

/// `|` where the columns agree (ignoring case), a blank otherwise.
/// Gap columns never match a residue, so they come out blank too.
pub fn midline(qseq: &str, sseq: &str) -> String {
    qseq.chars()
        .zip(sseq.chars())
        .map(|(q, s)| {
            if q.eq_ignore_ascii_case(&s) {
                MATCH
            } else {
                MISMATCH
            }
        })
        .collect()
}

/// Aligned subsequences recovered from a VSEARCH `--alnout` transcript.
#[derive(Debug, Default)]
pub struct AlignmentIndex {
    pairs: HashMap<(String, String), (String, String)>,
}

#[derive(Default)]
struct Block {
    query: Option<String>,
    target: Option<String>,
    qseq: String,
    tseq: String,
}

impl AlignmentIndex {
    pub fn parse(transcript: &str) -> Self {
        let mut index = Self::default();
        let mut block = Block::default();

        for line in transcript.lines() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("Query ") {
                // Both the hit-table header (`Query >q1`) and the per-alignment
                // header (` Query 300nt >q1`) open a new block.
                index.flush(&mut block);
                if let Some(label) = label_after_marker(rest) {
                    block.query = Some(label);
                }
            } else if let Some(rest) = trimmed.strip_prefix("Target ") {
                index.flush(&mut block);
                block.target = label_after_marker(rest);
            } else if let Some(rest) = trimmed.strip_prefix("Qry ") {
                if let Some(segment) = segment(rest) {
                    block.qseq.push_str(segment);
                }
            } else if let Some(rest) = trimmed.strip_prefix("Tgt ") {
                if let Some(segment) = segment(rest) {
                    block.tseq.push_str(segment);
                }
            } else if trimmed.contains(" cols, ") {
                index.flush(&mut block);
            }
        }
        index.flush(&mut block);
        index
    }

    pub fn get(&self, query: &str, target: &str) -> Option<Alignment> {
        self.pairs
            .get(&(query.to_string(), target.to_string()))
            .map(|(qseq, tseq)| Alignment::new(qseq.as_str(), tseq.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Store the finished pair, if any, and reset for the next one. The
    /// query label survives: one query block holds several targets.
    fn flush(&mut self, block: &mut Block) {
        let qseq = std::mem::take(&mut block.qseq);
        let tseq = std::mem::take(&mut block.tseq);
        let target = block.target.take();
        if let (Some(query), Some(target)) = (block.query.clone(), target)
            && !qseq.is_empty()
            && !tseq.is_empty()
        {
            self.pairs.entry((query, target)).or_insert((qseq, tseq));
        }
    }
}

fn label_after_marker(rest: &str) -> Option<String> {
    rest.split_once('>')
        .map(|(_, label)| label.trim().to_string())
        .filter(|label| !label.is_empty())
}

/// Sequence column of a `Qry`/`Tgt` row: `<start> <strand> <residues> <end>`.
fn segment(rest: &str) -> Option<&str> {
    let mut tokens = rest.split_whitespace();
    let _start = tokens.next()?;
    let _strand = tokens.next()?;
    tokens.next()
}
