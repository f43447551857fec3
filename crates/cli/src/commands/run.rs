//! Run Command
//!
//! Runs the whole suite once, optionally followed by a retry session for
//! whatever failed.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::info;

use bddkit_e2e::invocation::{remove_stale_report, ExecutionOutcome};
use bddkit_e2e::registry::extract_failures;
use bddkit_e2e::{
    EnvironmentConfig, FailedTest, InvocationBuilder, ProcessExecutor, RetryOptions, TestExecutor,
};

use super::{retry, Context};
use crate::output::{print_info, print_success, print_warning};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Environment to load (defaults to dev)
    #[arg(short, long, env = "TEST_ENV")]
    pub env: Option<String>,

    /// Parallel workers (defaults to $PARALLEL_WORKERS, test.workers, then the host recommendation)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Cucumber tag expression, e.g. "@smoke and not @wip"
    #[arg(short, long)]
    pub tags: Option<String>,

    /// Stop at the first failing scenario ($FAIL_FAST sets it through the config)
    #[arg(long)]
    pub fail_fast: bool,

    /// Retry failed scenarios afterwards using the configured retry policy
    #[arg(long)]
    pub retry: bool,
}

pub async fn execute(args: RunArgs, ctx: &Context) -> Result<ExitCode> {
    let mut config = ctx.load_config(args.env.as_deref())?;
    if args.fail_fast {
        config.test.fail_fast = true;
    }

    let workers = ctx.choose_workers(&config, args.workers);
    let report_path = config.runner.report_path();
    info!(
        "Running '{}' suite against {} with {} worker(s)",
        config.name, config.app.base_url, workers
    );

    let (outcome, failures) =
        run_suite(&config, workers, args.tags.clone(), &ProcessExecutor).await?;

    if failures.is_empty() && outcome.success() {
        print_success(&format!(
            "Suite passed in {:.1}s",
            outcome.duration.as_secs_f64()
        ));
        return Ok(ExitCode::SUCCESS);
    }

    print_info(&format!("{} scenario(s) failed", failures.len()));

    if args.retry && !failures.is_empty() && !config.test.fail_fast {
        let options = RetryOptions {
            env: config.name.clone(),
            max_retries: config.test.retries,
            delay: Duration::from_secs(config.test.retry_delay_seconds),
            report_path,
            workers,
        };
        return retry::run_session(ctx, &config, options).await;
    }

    Ok(ExitCode::from(runner_exit_status(outcome.exit_code)))
}

/// Run the whole suite once and read back its failures. A report left over
/// from an earlier run is removed first, so a runner that writes none yields
/// no failures rather than stale ones.
async fn run_suite(
    config: &EnvironmentConfig,
    workers: usize,
    tags: Option<String>,
    executor: &dyn TestExecutor,
) -> Result<(ExecutionOutcome, Vec<FailedTest>)> {
    let report_path = config.runner.report_path();
    let invocation = InvocationBuilder::new(config, &report_path)
        .workers(workers)
        .tags(tags)
        .build();

    remove_stale_report(&report_path)?;
    let outcome = executor.execute(&invocation).await?;

    let failures = if report_path.exists() {
        extract_failures(&report_path, 1)?
    } else {
        print_warning(&format!("Runner wrote no report at {}", report_path.display()));
        Vec::new()
    };
    Ok((outcome, failures))
}

/// Mirror the runner's exit status; a clean exit with failures still fails.
fn runner_exit_status(code: Option<i32>) -> u8 {
    match code {
        Some(code) if code > 0 && code <= u8::MAX as i32 => code as u8,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bddkit_e2e::{ConfigLoader, HarnessResult, RunnerInvocation};
    use std::path::Path;

    /// Exits with a fixed code, optionally writing a report first
    struct FixedRunner {
        report: Option<&'static str>,
        exit_code: i32,
    }

    #[async_trait]
    impl TestExecutor for FixedRunner {
        async fn execute(&self, invocation: &RunnerInvocation) -> HarnessResult<ExecutionOutcome> {
            if let Some(report) = self.report {
                std::fs::write(&invocation.report_path, report)?;
            }
            Ok(ExecutionOutcome {
                exit_code: Some(self.exit_code),
                duration: Duration::ZERO,
            })
        }
    }

    const ONE_FAILING: &str = r#"[{ "uri": "features/a.feature", "elements": [
        { "name": "Login", "line": 3, "steps": [
            { "keyword": "Then ", "name": "it works", "result": { "status": "failed", "error_message": "boom" } }
        ] }
    ] }]"#;

    fn config(dir: &Path) -> EnvironmentConfig {
        let reports_dir = dir.join("test-results");
        std::fs::create_dir_all(&reports_dir).unwrap();
        std::fs::write(
            dir.join("dev.json"),
            serde_json::json!({ "runner": { "reports_dir": reports_dir } }).to_string(),
        )
        .unwrap();
        ConfigLoader::new(dir).load("dev").unwrap()
    }

    #[tokio::test]
    async fn test_run_suite_ignores_stale_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let report_path = config.runner.report_path();
        std::fs::write(&report_path, ONE_FAILING).unwrap();

        let runner = FixedRunner { report: None, exit_code: 2 };
        let (outcome, failures) = run_suite(&config, 1, None, &runner).await.unwrap();

        assert!(failures.is_empty());
        assert!(!report_path.exists());
        assert_eq!(runner_exit_status(outcome.exit_code), 2);
    }

    #[tokio::test]
    async fn test_run_suite_reads_fresh_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let runner = FixedRunner { report: Some(ONE_FAILING), exit_code: 1 };
        let (outcome, failures) = run_suite(&config, 1, None, &runner).await.unwrap();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].scenario_name, "Login");
        assert!(!outcome.success());
    }

    #[test]
    fn test_runner_exit_status() {
        assert_eq!(runner_exit_status(Some(1)), 1);
        assert_eq!(runner_exit_status(Some(3)), 3);
        // clean exit but the report listed failures
        assert_eq!(runner_exit_status(Some(0)), 1);
        // killed by a signal
        assert_eq!(runner_exit_status(None), 1);
        assert_eq!(runner_exit_status(Some(-1)), 1);
        assert_eq!(runner_exit_status(Some(300)), 1);
    }
}
