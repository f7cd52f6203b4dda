//! Command-line interface built on clap.
//!
//! Defines [`Cli`] with the [`Command`] subcommands (run, normalize, report,
//! refdbs) and the global flags (--config, --verbose).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::job::{Algorithm, ParamValue, Tool};

/// EUTAX: taxonomic annotation of DNA sequences with BLAST or VSEARCH.
#[derive(Debug, Parser)]
#[command(name = "eutax", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to $EUTAX_CONFIG_PATH or ./eutax.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToolArg {
    Blast,
    Vsearch,
}

impl From<ToolArg> for Tool {
    fn from(arg: ToolArg) -> Self {
        match arg {
            ToolArg::Blast => Tool::Blast,
            ToolArg::Vsearch => Tool::Vsearch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmArg {
    Blastn,
    Megablast,
    #[value(name = "dc-megablast")]
    DcMegablast,
    #[value(name = "usearch_global")]
    UsearchGlobal,
    #[value(name = "search_exact")]
    SearchExact,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Blastn => Algorithm::Blastn,
            AlgorithmArg::Megablast => Algorithm::Megablast,
            AlgorithmArg::DcMegablast => Algorithm::DcMegablast,
            AlgorithmArg::UsearchGlobal => Algorithm::UsearchGlobal,
            AlgorithmArg::SearchExact => Algorithm::SearchExact,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Annotate a FASTA file and wait for the result.
    Run {
        /// Input FASTA file (.fasta, .fa, .fna, .txt, optionally gzipped).
        input: PathBuf,

        #[arg(long, value_enum)]
        tool: ToolArg,

        #[arg(long, value_enum)]
        algorithm: AlgorithmArg,

        /// Reference database id.
        #[arg(long)]
        db: String,

        /// Tool parameter as key=value; repeatable.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,

        /// Print the whole result document as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Normalize raw tool output without running anything.
    Normalize {
        /// Raw tabular output (BLAST outfmt 6 or VSEARCH userout).
        raw: PathBuf,

        #[arg(long, value_enum)]
        tool: ToolArg,

        /// VSEARCH alignment transcript (--alnout).
        #[arg(long)]
        alignments: Option<PathBuf>,

        /// FASTA input of the run, used to list queries without hits.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Write the document here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Total CPU hours recorded in the job summaries.
    Report,

    /// List the configured reference databases.
    Refdbs,
}

/// Parse `key=value`. Integers and decimals become numbers, anything else
/// stays text.
pub fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    Ok((key.to_string(), ParamValue::from(value.trim())))
}
