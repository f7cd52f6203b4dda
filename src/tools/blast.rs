use super::{Invocation, ToolRequest, RawArtifacts, ToolCommand};
use crate::config::BlastDefaults;
use crate::normalize::BLAST_COLUMNS;

const HITS_FILE: &str = "blast_hits.tsv";

/// `blastn -task <algorithm> ... -outfmt "6 <18 columns>"`, one HSP per subject.
pub(super) fn plan(program: &str, defaults: &BlastDefaults, request: &ToolRequest) -> Invocation {
    let hits = request.output_dir.join(HITS_FILE);
    let max_target_seqs = request.param_u64("max_target_seqs", defaults.max_target_seqs);
    let outfmt = format!("6 {}", BLAST_COLUMNS.join(" "));

    let args = vec![
        "-task".to_string(),
        request.algorithm.to_string(),
        "-query".to_string(),
        request.input.display().to_string(),
        "-db".to_string(),
        request.database.display().to_string(),
        "-out".to_string(),
        hits.display().to_string(),
        "-strand".to_string(),
        "both".to_string(),
        "-max_target_seqs".to_string(),
        max_target_seqs.to_string(),
        "-max_hsps".to_string(),
        "1".to_string(),
        "-outfmt".to_string(),
        outfmt,
        "-num_threads".to_string(),
        request.cpus.to_string(),
    ];

    Invocation {
        command: ToolCommand {
            program: program.to_string(),
            args,
        },
        artifacts: RawArtifacts {
            hits,
            alignments: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Algorithm, ParamValue, Tool};
    use crate::tools::testing::sample_request;

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let pos = args.iter().position(|a| a == flag).unwrap();
        &args[pos + 1]
    }

    #[test]
    fn builds_blastn_command() {
        let inv = plan("blastn", &BlastDefaults::default(), &sample_request(Tool::Blast, Algorithm::Megablast));
        let args = &inv.command.args;
        assert_eq!(inv.command.program, "blastn");
        assert_eq!(value_after(args, "-task"), "megablast");
        assert_eq!(value_after(args, "-query"), "/uploads/reads.fasta");
        assert_eq!(value_after(args, "-db"), "/db/EUKARYOME");
        assert_eq!(value_after(args, "-strand"), "both");
        assert_eq!(value_after(args, "-max_target_seqs"), "10");
        assert_eq!(value_after(args, "-max_hsps"), "1");
        assert_eq!(value_after(args, "-num_threads"), "4");
        assert_eq!(value_after(args, "-out"), "/out/job-1/blast_hits.tsv");

        let outfmt = value_after(args, "-outfmt");
        assert!(outfmt.starts_with("6 qseqid sseqid pident"));
        assert!(outfmt.ends_with("qlen slen qseq sseq"));
        assert_eq!(outfmt.split(' ').count(), 19);
        assert!(inv.artifacts.alignments.is_none());
    }

    #[test]
    fn threads_come_from_allocation_not_parameters() {
        let mut request = sample_request(Tool::Blast, Algorithm::Blastn);
        request.parameters.insert("num_threads".into(), ParamValue::Integer(64));
        request.parameters.insert("max_target_seqs".into(), ParamValue::Integer(50));
        request.cpus = 2;
        let inv = plan("blastn", &BlastDefaults::default(), &request);
        assert_eq!(value_after(&inv.command.args, "-num_threads"), "2");
        assert_eq!(value_after(&inv.command.args, "-max_target_seqs"), "50");
    }
}
