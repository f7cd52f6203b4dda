use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use eutax::cli::{Cli, Command};
use eutax::config::EngineConfig;
use eutax::job::{Algorithm, JobRequest, JobStatus, Parameters, Tool};
use eutax::normalize::{InputSequences, ResultDocument, normalize_artifacts};
use eutax::registry::{ConfigRefDbRegistry, MemoryUploadStore, RefDbRegistry};
use eutax::service::{AnnotationService, ResultLookup, ServiceParts};
use eutax::summary::{SqliteSummaryStore, SummaryStore, cpu_hours};
use eutax::tools::ProcessExecutor;
use eutax::ui::{self, JobProgress};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Command::Run {
            input,
            tool,
            algorithm,
            db,
            params,
            json,
        } => {
            let request = RunRequest {
                input: &input,
                tool: tool.into(),
                algorithm: algorithm.into(),
                database: db,
                parameters: params.into_iter().collect(),
            };
            run(&config, request, json).await
        }
        Command::Normalize {
            raw,
            tool,
            alignments,
            input,
            output,
        } => normalize(tool.into(), &raw, alignments.as_deref(), input.as_deref(), output.as_deref()),
        Command::Report => report(&config).await,
        Command::Refdbs => {
            ui::print_refdbs(&ConfigRefDbRegistry::new(config.refdbs.clone()).list());
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let directive = if verbose { "eutax=debug" } else { "eutax=info" };
    let filter = match std::env::var("RUST_LOG") {
        Ok(value) if !value.is_empty() => EnvFilter::new(value),
        _ => EnvFilter::new(directive),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

fn open_summaries(config: &EngineConfig) -> Result<SqliteSummaryStore> {
    let path = config.summary_path();
    SqliteSummaryStore::open(&path).with_context(|| format!("Failed to open {}", path.display()))
}

struct RunRequest<'a> {
    input: &'a Path,
    tool: Tool,
    algorithm: Algorithm,
    database: String,
    parameters: Parameters,
}

async fn run(config: &EngineConfig, request: RunRequest<'_>, json: bool) -> Result<()> {
    let uploads = Arc::new(MemoryUploadStore::new());
    let file_id = uploads
        .register(request.input)
        .with_context(|| format!("Cannot use {} as input", request.input.display()))?;

    let summaries = open_summaries(config)?;
    let service = AnnotationService::start(
        config,
        ServiceParts {
            uploads,
            refdbs: Arc::new(ConfigRefDbRegistry::new(config.refdbs.clone())),
            summaries: Arc::new(summaries),
            executor: Arc::new(ProcessExecutor),
        },
    );

    let label = format!("{} {} on {}", request.tool, request.algorithm, request.database);
    let job_id = service
        .submit(JobRequest {
            file_id,
            tool: request.tool,
            algorithm: request.algorithm,
            database: request.database,
            parameters: request.parameters,
        })
        .await
        .context("Job rejected")?;

    let progress = JobProgress::start(&label);
    let job = loop {
        let Some(job) = service.job(&job_id) else {
            service.shutdown().await;
            bail!("Job {job_id} disappeared");
        };
        if job.is_terminal() {
            break job;
        }
        progress.update(&job);
        tokio::time::sleep(Duration::from_millis(200)).await;
    };
    progress.complete(&job);
    let lookup = service.result(&job_id);
    service.shutdown().await;

    match lookup {
        ResultLookup::Ready(path) => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if json {
                println!("{contents}");
            } else {
                let document: ResultDocument = serde_json::from_str(&contents)?;
                ui::print_document(&document);
            }
            Ok(())
        }
        ResultLookup::NotReady(JobStatus::Failed) => bail!("Job {job_id} failed"),
        ResultLookup::NotReady(status) => bail!("Job {job_id} ended as {status} without results"),
        ResultLookup::NotFound => bail!("Job {job_id} disappeared"),
    }
}

fn normalize(
    tool: Tool,
    raw: &Path,
    alignments: Option<&Path>,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let sequences = input
        .map(InputSequences::from_path)
        .transpose()
        .context("Failed to read input sequences")?;
    let document = normalize_artifacts(tool, raw, alignments, sequences.as_ref());

    match output {
        Some(path) => {
            document
                .write_json(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            ui::print_document(&document);
        }
        None => println!("{}", serde_json::to_string_pretty(&document)?),
    }
    if let Some(error) = &document.error {
        bail!("Raw output could not be normalized: {error}");
    }
    Ok(())
}

async fn report(config: &EngineConfig) -> Result<()> {
    let store = open_summaries(config)?;
    let summaries = store
        .list()
        .await
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for summary in &summaries {
        *by_status.entry(summary.status.to_string()).or_default() += 1;
    }
    println!("Jobs recorded: {}", summaries.len());
    for (status, count) in by_status {
        println!("  {status:<10} {count}");
    }
    println!("Total CPU hours: {:.1}", cpu_hours(&summaries));
    Ok(())
}
