//! Retry Command

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use bddkit_e2e::registry::extract_failures;
use bddkit_e2e::{
    EnvironmentConfig, FailedTestRegistry, HarnessError, ProcessExecutor, RetryOptions,
    RetryOrchestrator, RetrySummary,
};

use super::Context;
use crate::output::{
    print_info, print_item, print_success, print_warning, OutputFormat, TableDisplay,
};

#[derive(Args, Debug)]
pub struct RetryArgs {
    /// Environment to load (defaults to dev)
    #[arg(short, long, env = "TEST_ENV")]
    pub env: Option<String>,

    /// Maximum retry attempts (defaults to test.retries, which $RETRY_COUNT overrides)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Seconds to wait between attempts (defaults to test.retry_delay_seconds, which $RETRY_DELAY overrides)
    #[arg(long)]
    pub delay: Option<u64>,

    /// Main cucumber JSON report (defaults to runner.reports_dir/runner.report_file)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Parallel workers per attempt
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Remove the failed-test registry and last summary before running
    #[arg(long)]
    pub clear: bool,

    /// Print current failure statistics without retrying
    #[arg(long)]
    pub stats_only: bool,
}

impl TableDisplay for RetrySummary {
    fn headers() -> Vec<&'static str> {
        vec![
            "Outcome",
            "Attempts",
            "Originally Failing",
            "Recovered",
            "Still Failing",
            "Success Rate",
        ]
    }

    fn row(&self) -> Vec<String> {
        vec![
            format!("{:?}", self.outcome),
            self.attempts_run.to_string(),
            self.original_failure_count.to_string(),
            self.recovered_count.to_string(),
            self.still_failing_count.to_string(),
            self.success_rate_percent
                .as_ref()
                .map(|rate| format!("{}%", rate))
                .unwrap_or_else(|| "n/a".to_string()),
        ]
    }
}

pub async fn execute(args: RetryArgs, ctx: &Context) -> Result<ExitCode> {
    let config = ctx.load_config(args.env.as_deref())?;
    let registry = FailedTestRegistry::new(&config.runner.reports_dir);
    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| config.runner.report_path());

    if args.clear {
        registry.clear()?;
        print_info("Cleared failed-test registry and last retry summary");
    }

    if args.stats_only {
        return stats(&registry, &report_path, ctx.format);
    }

    let workers = ctx.choose_workers(&config, args.workers);
    let options = RetryOptions {
        env: config.name.clone(),
        max_retries: args.max_retries.unwrap_or(config.test.retries),
        delay: Duration::from_secs(args.delay.unwrap_or(config.test.retry_delay_seconds)),
        report_path,
        workers,
    };

    run_session(ctx, &config, options).await
}

/// Run a retry session and print the before/after counts
pub async fn run_session(
    ctx: &Context,
    config: &EnvironmentConfig,
    options: RetryOptions,
) -> Result<ExitCode> {
    if !options.report_path.exists() {
        print_warning(&format!(
            "No report at {}; nothing to retry",
            options.report_path.display()
        ));
        return Ok(ExitCode::SUCCESS);
    }

    let orchestrator = RetryOrchestrator::new(
        ctx.loader(),
        &config.runner.reports_dir,
        Arc::new(ProcessExecutor),
    )
    .with_env_vars(ctx.vars.clone());
    let summary = orchestrator.run(&options).await?;

    print_item(&summary, ctx.format);
    if ctx.format != OutputFormat::Json {
        println!(
            "Before: {} failing  After: {} failing",
            summary.original_failure_count, summary.still_failing_count
        );
        for name in &summary.recovered_names {
            println!("  recovered: {}", name);
        }
        for name in &summary.still_failing_names {
            println!("  still failing: {}", name);
        }
    }

    if summary.all_passing() {
        print_success("No scenarios failing");
        Ok(ExitCode::SUCCESS)
    } else {
        print_warning(&format!(
            "{} scenario(s) still failing",
            summary.still_failing_count
        ));
        Ok(ExitCode::FAILURE)
    }
}

/// Failure counts behind `--stats-only`
#[derive(Debug)]
struct FailureStats {
    /// Failing scenarios in the main report; 0 when there is no report
    current: usize,
    recorded: usize,
    last_summary: Option<RetrySummary>,
}

impl FailureStats {
    fn collect(registry: &FailedTestRegistry, report_path: &Path) -> Result<Self> {
        let current = match extract_failures(report_path, 1) {
            Ok(failures) => failures.len(),
            Err(HarnessError::ReportNotFound(_)) => 0,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            current,
            recorded: registry.load()?.len(),
            last_summary: registry.load_summary()?,
        })
    }

    /// After a retry session its residual count is authoritative.
    fn still_failing(&self) -> usize {
        self.last_summary
            .as_ref()
            .map(|summary| summary.still_failing_count)
            .unwrap_or(self.current)
    }
}

fn stats(
    registry: &FailedTestRegistry,
    report_path: &Path,
    format: OutputFormat,
) -> Result<ExitCode> {
    let stats = FailureStats::collect(registry, report_path)?;

    println!("Failing in {}: {}", report_path.display(), stats.current);
    println!("Records in {}: {}", registry.registry_path().display(), stats.recorded);

    match &stats.last_summary {
        Some(summary) => {
            println!("Last retry session ({}):", summary.timestamp.to_rfc3339());
            print_item(summary, format);
        }
        None => print_info("No retry session recorded"),
    }

    Ok(if stats.still_failing() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
