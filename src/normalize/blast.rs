use std::cmp::Ordering;

use super::{
    Alignment, Hit, InputSequences, RawHit, ResultDocument, Strand, Taxonomy, asc, assemble, desc,
    number, read_rows, text,
};
use crate::error::NormalizeError;
use crate::job::Tool;

/// `-outfmt 6` column layout requested from BLAST.
pub const BLAST_COLUMNS: [&str; 18] = [
    "qseqid", "sseqid", "pident", "length", "mismatch", "gapopen", "qstart", "qend", "sstart",
    "send", "evalue", "bitscore", "qcovs", "sstrand", "qlen", "slen", "qseq", "sseq",
];

/// Normalize BLAST tabular output.
pub fn normalize_blast(raw: &str, input: Option<&InputSequences>) -> ResultDocument {
    match parse(raw) {
        Ok(hits) => assemble(Tool::Blast, hits, input, order),
        Err(e) => {
            tracing::warn!(error = %e, "BLAST output could not be normalized");
            ResultDocument::failed(Tool::Blast, e)
        }
    }
}

fn parse(raw: &str) -> Result<Vec<RawHit>, NormalizeError> {
    read_rows(raw, BLAST_COLUMNS.len())?
        .into_iter()
        .map(|(line, row)| {
            let sseqid = text(&row, 1);
            let hit = Hit {
                taxonomy: Taxonomy::from_subject_id(&sseqid),
                pident: number(&row, 2, "pident", line)?,
                length: number(&row, 3, "length", line)?,
                mismatch: number(&row, 4, "mismatch", line)?,
                gapopen: number(&row, 5, "gapopen", line)?,
                qstart: number(&row, 6, "qstart", line)?,
                qend: number(&row, 7, "qend", line)?,
                sstart: number(&row, 8, "sstart", line)?,
                send: number(&row, 9, "send", line)?,
                evalue: Some(number(&row, 10, "evalue", line)?),
                bitscore: Some(number(&row, 11, "bitscore", line)?),
                qcovs: number(&row, 12, "qcovs", line)?,
                sstrand: Strand::parse(&text(&row, 13)),
                slen: number(&row, 15, "slen", line)?,
                alignment: Some(Alignment::new(text(&row, 16), text(&row, 17))),
                sseqid,
            };
            Ok(RawHit {
                query_id: text(&row, 0),
                query_length: number(&row, 14, "qlen", line)?,
                hit,
            })
        })
        .collect()
}

/// Best bit score first, then lowest e-value, identity, alignment length and
/// coverage; subject id settles whatever is left.
fn order(a: &Hit, b: &Hit) -> Ordering {
    desc(a.bitscore, b.bitscore)
        .then_with(|| asc(a.evalue, b.evalue))
        .then_with(|| b.pident.total_cmp(&a.pident))
        .then_with(|| b.length.cmp(&a.length))
        .then_with(|| b.qcovs.total_cmp(&a.qcovs))
        .then_with(|| a.sseqid.cmp(&b.sseqid))
}
