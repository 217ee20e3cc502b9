use std::collections::HashSet;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use fanout_core::{OverallStatus, Report, TaskSpec};
use fanout_observability::init_tracing;
use fanout_orchestrator::Orchestrator;
use fanout_scheduler::SchedulerConfig;
use fanout_worker::{ExecutionError, from_fn};
use tokio::time::sleep;
use tracing::info;

/// Runs a synthetic batch through the orchestrator and prints its report.
///
/// Each task sleeps for a duration derived from its index; every
/// `--fail-every`-th task fails its first attempt so the retry path runs.
#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of tasks in the batch.
    #[arg(long, default_value_t = 8)]
    tasks: usize,

    /// Maximum tasks running at once.
    #[arg(long, default_value_t = 3)]
    concurrency: usize,

    /// Overall deadline for the batch, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    deadline_ms: u64,

    /// Per-task timeout, in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    timeout_ms: u64,

    /// Retries allowed per task.
    #[arg(long, default_value_t = 2)]
    max_retries: u32,

    /// Every n-th task fails its first attempt (0 disables).
    #[arg(long, default_value_t = 3)]
    fail_every: usize,

    /// Base work time per task, in milliseconds.
    #[arg(long, default_value_t = 150)]
    work_ms: u64,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// The task index, little-endian.
fn payload(index: usize) -> Vec<u8> {
    (index as u32).to_le_bytes().to_vec()
}

fn task_index(payload: &[u8]) -> Result<usize, ExecutionError> {
    let bytes: [u8; 4] = payload
        .try_into()
        .map_err(|_| ExecutionError::new("malformed payload"))?;
    Ok(u32::from_le_bytes(bytes) as usize)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();
    info!(?cli, "starting fanout demo");

    let work = Duration::from_millis(cli.work_ms);
    let fail_every = cli.fail_every;
    let failed_once = Arc::new(Mutex::new(HashSet::new()));

    let orchestrator = Orchestrator::builder()
        .config(SchedulerConfig::from_env())
        .executor("default", from_fn(move |payload, cancel| {
            let failed_once = failed_once.clone();
            async move {
                let index = task_index(&payload)?;
                let should_fail = fail_every > 0 && index % fail_every == fail_every - 1 && {
                    let mut seen = failed_once
                        .lock()
                        .map_err(|_| ExecutionError::new("poisoned state"))?;
                    seen.insert(index)
                };

                tokio::select! {
                    _ = cancel.cancelled() => return Err(ExecutionError::new("cancelled")),
                    _ = sleep(work * (1 + (index % 4) as u32)) => {}
                }

                if should_fail {
                    return Err(ExecutionError::new(format!("task {index} transient failure")));
                }
                Ok(format!("task {index} done").into_bytes())
            }
        }))
        .build();

    let specs: Vec<_> = (0..cli.tasks)
        .map(|index| {
            TaskSpec::builder(payload(index))
                .id(format!("task-{index}"))
                .timeout(Duration::from_millis(cli.timeout_ms))
                .max_retries(cli.max_retries)
                .priority(-((index % 3) as i32))
                .build()
        })
        .collect();

    let report = orchestrator
        .run_batch(specs, cli.concurrency, Duration::from_millis(cli.deadline_ms))
        .await?;

    match cli.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => print_text(&report),
    }

    if report.overall_status() != OverallStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_text(report: &Report) {
    let counts = report.counts();
    println!(
        "{:?}: {} tasks, {} succeeded, {} failed, {} timed out, {} cancelled{}",
        report.overall_status(),
        report.total(),
        counts.succeeded,
        counts.failed,
        counts.timed_out,
        counts.cancelled,
        if report.is_truncated() { " (deadline exceeded)" } else { "" },
    );
    for state in report.tasks() {
        let detail = match (&state.result, &state.error) {
            (Some(result), _) => String::from_utf8_lossy(result).into_owned(),
            (None, Some(error)) => error.to_string(),
            (None, None) => String::new(),
        };
        println!(
            "  {:<10} {:<10} attempts={} {}",
            state.id.as_str(),
            state.status.as_str(),
            state.attempts,
            detail
        );
    }
}
