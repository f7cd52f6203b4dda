use std::cmp::Ordering;

use super::{
    AlignmentIndex, Hit, InputSequences, RawHit, ResultDocument, Strand, Taxonomy, assemble,
    number, read_rows, text,
};
use crate::error::NormalizeError;
use crate::job::Tool;

/// `--userfields` requested from VSEARCH. Mirrors the first sixteen BLAST
/// columns, with `raw` in the bit score slot; `evalue` is a placeholder the
/// tool never fills for nucleotides.
pub const VSEARCH_COLUMNS: [&str; 16] = [
    "query", "target", "id", "alnlen", "mism", "opens", "qlo", "qhi", "tlo", "thi", "evalue",
    "raw", "qcov", "tstrand", "ql", "tl",
];

/// Normalize VSEARCH `--userout` output, attaching aligned pairs from the
/// transcript where one exists for the (query, target) pair.
pub fn normalize_vsearch(
    raw: &str,
    alignments: &AlignmentIndex,
    input: Option<&InputSequences>,
) -> ResultDocument {
    match parse(raw, alignments) {
        Ok(hits) => assemble(Tool::Vsearch, hits, input, order),
        Err(e) => {
            tracing::warn!(error = %e, "VSEARCH output could not be normalized");
            ResultDocument::failed(Tool::Vsearch, e)
        }
    }
}

fn parse(raw: &str, alignments: &AlignmentIndex) -> Result<Vec<RawHit>, NormalizeError> {
    read_rows(raw, VSEARCH_COLUMNS.len())?
        .into_iter()
        .map(|(line, row)| {
            let query_id = text(&row, 0);
            let sseqid = text(&row, 1);
            let hit = Hit {
                taxonomy: Taxonomy::from_subject_id(&sseqid),
                pident: number(&row, 2, "id", line)?,
                length: number(&row, 3, "alnlen", line)?,
                mismatch: number(&row, 4, "mism", line)?,
                gapopen: number(&row, 5, "opens", line)?,
                qstart: number(&row, 6, "qlo", line)?,
                qend: number(&row, 7, "qhi", line)?,
                sstart: number(&row, 8, "tlo", line)?,
                send: number(&row, 9, "thi", line)?,
                evalue: None,
                bitscore: Some(number(&row, 11, "raw", line)?),
                qcovs: number(&row, 12, "qcov", line)?,
                sstrand: Strand::parse(&text(&row, 13)),
                slen: number(&row, 15, "tl", line)?,
                alignment: alignments.get(&query_id, &sseqid),
                sseqid,
            };
            Ok(RawHit {
                query_length: number(&row, 14, "ql", line)?,
                query_id,
                hit,
            })
        })
        .collect()
}

/// Identity first, then alignment length and coverage; subject id last.
fn order(a: &Hit, b: &Hit) -> Ordering {
    b.pident
        .total_cmp(&a.pident)
        .then_with(|| b.length.cmp(&a.length))
        .then_with(|| b.qcovs.total_cmp(&a.qcovs))
        .then_with(|| a.sseqid.cmp(&b.sseqid))
}
