//! Terminal output for the CLI: a spinner while a job runs and colored
//! summaries once it ends.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::job::{Job, JobStatus};
use crate::normalize::ResultDocument;
use crate::registry::RefDbInfo;

/// Spinner following one job from submission to its terminal state.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    dim: Style,
}

impl JobProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("queued: {label}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Reflect the job's current status and progress marker.
    pub fn update(&self, job: &Job) {
        match &job.progress {
            Some(progress) => self.pb.set_message(format!("{}: {progress}", job.status)),
            None => self.pb.set_message(job.status.to_string()),
        }
    }

    /// Stop the spinner and print the outcome.
    pub fn complete(&self, job: &Job) {
        self.pb.finish_and_clear();
        match (job.status, &job.failure) {
            (JobStatus::Finished, _) => {
                println!("  {} Job {} finished", self.green.apply_to("✓"), job.id);
            }
            (_, Some(failure)) => {
                println!(
                    "  {} Job {} failed ({} failure): {}",
                    self.red.apply_to("✗"),
                    job.id,
                    failure.kind,
                    failure.message
                );
            }
            (status, None) => println!("  Job {} ended as {status}", job.id),
        }
        for (kind, path) in &job.result_files {
            println!("    {} {}", self.dim.apply_to(format!("{kind:>10}")), path.display());
        }
    }
}

/// One-line-per-query overview of a result document.
pub fn print_document(document: &ResultDocument) {
    let green = Style::new().green();
    let red = Style::new().red().bold();
    if let Some(error) = &document.error {
        println!("{} {error}", red.apply_to("normalization failed:"));
        return;
    }
    for result in &document.results {
        let best = result
            .hits
            .first()
            .map(|hit| hit.sseqid.as_str())
            .unwrap_or("-");
        println!(
            "{:<30} {:>6} hits  {}",
            result.query_id,
            result.hit_count,
            green.apply_to(best)
        );
    }
    println!(
        "{} queries, {} hits",
        document.summary.total_queries, document.summary.total_hits
    );
}

pub fn print_refdbs(refdbs: &[RefDbInfo]) {
    let bold = Style::new().bold();
    if refdbs.is_empty() {
        println!("No reference databases configured.");
        return;
    }
    for db in refdbs {
        let tools: Vec<String> = db.tools_supported.iter().map(ToString::to_string).collect();
        println!(
            "{} {} [{}] tools: {}",
            bold.apply_to(&db.id),
            db.version,
            db.regions.join(", "),
            tools.join(", ")
        );
        if !db.description.is_empty() {
            println!("    {}", db.description);
        }
    }
}
