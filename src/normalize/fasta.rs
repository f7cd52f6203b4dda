use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use bio::io::fasta;
use flate2::read::MultiGzDecoder;

use crate::error::{NormalizeError, NormalizeErrorKind};

/// True when `path` names a gzip-compressed file.
pub fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Decompress a gzipped FASTA file into `target`, for tools that only read
/// plain text.
pub fn gunzip(source: &Path, target: &Path) -> io::Result<()> {
    let mut reader = MultiGzDecoder::new(File::open(source)?);
    let mut writer = BufWriter::new(File::create(target)?);
    io::copy(&mut reader, &mut writer)?;
    writer.flush()
}

/// Query ids and lengths of the submitted input file, in file order.
///
/// Duplicate ids keep their first record, so every distinct query is listed
/// exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSequences {
    records: Vec<(String, u64)>,
}

impl InputSequences {
    /// Read a FASTA file, transparently decompressing `.gz` input.
    pub fn from_path(path: &Path) -> Result<Self, NormalizeError> {
        let file = File::open(path).map_err(|e| {
            NormalizeError::new(
                NormalizeErrorKind::InputSequences,
                format!("{}: {e}", path.display()),
            )
        })?;
        let reader: Box<dyn Read> = if is_gzip(path) {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Self::from_reader(reader)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, NormalizeError> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for record in fasta::Reader::new(reader).records() {
            let record = record.map_err(|e| {
                NormalizeError::new(NormalizeErrorKind::InputSequences, e.to_string())
            })?;
            let id = record.id().to_string();
            if seen.insert(id.clone()) {
                records.push((id, record.seq().len() as u64));
            }
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.records.iter().map(|(id, len)| (id.as_str(), *len))
    }

    pub fn length_of(&self, id: &str) -> Option<u64> {
        self.iter().find(|(qid, _)| *qid == id).map(|(_, len)| len)
    }

    pub fn lengths(&self) -> Vec<u64> {
        self.records.iter().map(|(_, len)| *len).collect()
    }
}
