use super::{Invocation, ToolRequest, RawArtifacts, ToolCommand};
use crate::config::VsearchDefaults;
use crate::job::Algorithm;
use crate::normalize::VSEARCH_COLUMNS;

const HITS_FILE: &str = "vsearch_hits.tsv";
const ALIGNMENTS_FILE: &str = "vsearch_alignments.txt";

/// `vsearch --usearch_global|--search_exact ...` writing a 16-column
/// `--userout` table plus an `--alnout` transcript.
///
/// Identity and coverage are taken as percentages and passed as fractions.
/// Exact search has no identity/coverage thresholds or accept/reject caps.
pub(super) fn plan(program: &str, defaults: &VsearchDefaults, request: &ToolRequest) -> Invocation {
    let hits = request.output_dir.join(HITS_FILE);
    let alignments = request.output_dir.join(ALIGNMENTS_FILE);

    let mut args = vec![
        format!("--{}", request.algorithm),
        request.input.display().to_string(),
        "--db".to_string(),
        request.database.display().to_string(),
    ];

    if request.algorithm == Algorithm::UsearchGlobal {
        let id = request.param_f64("id", defaults.id);
        let query_cov = request.param_f64("query_cov", defaults.query_cov);
        args.extend([
            "--id".to_string(),
            fraction(id),
            "--query_cov".to_string(),
            fraction(query_cov),
            "--maxaccepts".to_string(),
            request.param_u64("maxaccepts", defaults.maxaccepts).to_string(),
            "--maxrejects".to_string(),
            request.param_u64("maxrejects", defaults.maxrejects).to_string(),
        ]);
    }

    args.extend([
        "--userout".to_string(),
        hits.display().to_string(),
        "--userfields".to_string(),
        VSEARCH_COLUMNS.join("+"),
        "--alnout".to_string(),
        alignments.display().to_string(),
        "--strand".to_string(),
        "both".to_string(),
        "--maxhits".to_string(),
        request.param_u64("maxhits", defaults.maxhits).to_string(),
        "--threads".to_string(),
        request.cpus.to_string(),
        "--quiet".to_string(),
    ]);

    Invocation {
        command: ToolCommand {
            program: program.to_string(),
            args,
        },
        artifacts: RawArtifacts {
            hits,
            alignments: Some(alignments),
        },
    }
}

fn fraction(percent: f64) -> String {
    (percent / 100.0).to_string()
}
