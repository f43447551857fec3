//! Scenario-level retry orchestration
//!
//! Re-runs only the scenarios that failed in the main report, one attempt
//! at a time, narrowing to whatever still fails after each attempt:
//!
//! ```text
//! Idle -> Extracting -> NoFailures                          (done)
//!                    -> Retrying -> Attempt(k) -> Recovered  (done)
//!                                              -> Attempt(k+1), while k < max
//!                                              -> Exhausted  (done)
//! ```
//!
//! Attempts are strictly sequential with a flat delay between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::ConfigLoader;
use crate::error::{HarnessError, HarnessResult};
use crate::invocation::{
    attempt_report_path, remove_stale_report, InvocationBuilder, ScenarioScope, TestExecutor,
};
use crate::registry::{extract_failures, FailedTest, FailedTestRegistry, ScenarioKey};
use crate::vars::EnvVars;

/// How a retry session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcome {
    /// The main report had no failures; nothing was re-run
    NoFailures,
    /// Every originally failing scenario passed on some attempt
    Recovered,
    /// Attempts ran out with scenarios still failing
    Exhausted,
}

/// Result of one retry session, persisted as `retry-summary.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySummary {
    pub timestamp: DateTime<Utc>,
    pub original_failure_count: usize,
    pub retried_count: usize,
    pub still_failing_count: usize,
    pub recovered_count: usize,
    /// Two-decimal percentage; `None` when nothing failed originally
    pub success_rate_percent: Option<String>,
    pub recovered_names: Vec<String>,
    pub still_failing_names: Vec<String>,
    pub attempts_run: u32,
    pub outcome: RetryOutcome,
}

impl RetrySummary {
    /// Summary for a session that found nothing to retry
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            original_failure_count: 0,
            retried_count: 0,
            still_failing_count: 0,
            recovered_count: 0,
            success_rate_percent: None,
            recovered_names: Vec::new(),
            still_failing_names: Vec::new(),
            attempts_run: 0,
            outcome: RetryOutcome::NoFailures,
        }
    }

    /// Derive counts and the recovered set from the original and final
    /// failure lists. Scenarios are matched by file, line and name.
    pub fn from_sets(original: &[FailedTest], still_failing: &[FailedTest], attempts_run: u32) -> Self {
        if original.is_empty() {
            return Self::empty();
        }

        let still_keys: HashSet<ScenarioKey> = still_failing.iter().map(FailedTest::key).collect();
        let (still, recovered): (Vec<&FailedTest>, Vec<&FailedTest>) = original
            .iter()
            .partition(|t| still_keys.contains(&t.key()));
        let recovered_names: Vec<String> =
            recovered.iter().map(|t| t.scenario_name.clone()).collect();

        let original_count = original.len();
        let still_count = still.len();

        Self {
            timestamp: Utc::now(),
            original_failure_count: original_count,
            retried_count: original_count,
            still_failing_count: still_count,
            recovered_count: recovered_names.len(),
            success_rate_percent: success_rate(original_count, still_count),
            recovered_names,
            still_failing_names: still.iter().map(|t| t.scenario_name.clone()).collect(),
            attempts_run,
            outcome: if still_count == 0 {
                RetryOutcome::Recovered
            } else {
                RetryOutcome::Exhausted
            },
        }
    }

    pub fn all_passing(&self) -> bool {
        self.still_failing_count == 0
    }
}

/// `(original - still) / original * 100` to two decimals; `None` for zero
pub fn success_rate(original: usize, still_failing: usize) -> Option<String> {
    if original == 0 {
        return None;
    }
    let recovered = original.saturating_sub(still_failing) as f64;
    Some(format!("{:.2}", recovered / original as f64 * 100.0))
}

/// Inputs for one retry session
#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub env: String,
    pub max_retries: u32,
    pub delay: Duration,
    /// Main report to read the original failures from
    pub report_path: PathBuf,
    /// Worker count passed to the runner for each attempt
    pub workers: usize,
}

/// Drives retry sessions against a runner
pub struct RetryOrchestrator {
    loader: ConfigLoader,
    registry: FailedTestRegistry,
    executor: Arc<dyn TestExecutor>,
    reports_dir: PathBuf,
    vars: EnvVars,
}

impl RetryOrchestrator {
    pub fn new(
        loader: ConfigLoader,
        reports_dir: impl Into<PathBuf>,
        executor: Arc<dyn TestExecutor>,
    ) -> Self {
        let reports_dir = reports_dir.into();
        Self {
            loader,
            registry: FailedTestRegistry::new(&reports_dir),
            executor,
            reports_dir,
            vars: EnvVars::default(),
        }
    }

    /// Overrides applied to the config reloaded for each attempt
    pub fn with_env_vars(mut self, vars: EnvVars) -> Self {
        self.vars = vars;
        self
    }

    pub fn registry(&self) -> &FailedTestRegistry {
        &self.registry
    }

    /// Run one retry session and persist its summary.
    ///
    /// A runner invocation that does not complete, or leaves no readable
    /// report, counts as an attempt that recovered nothing. On the final
    /// attempt that error is returned instead.
    pub async fn run(&self, options: &RetryOptions) -> HarnessResult<RetrySummary> {
        info!("Extracting failures from {}", options.report_path.display());
        let original = extract_failures(&options.report_path, 1)?;

        if original.is_empty() {
            info!("No failed scenarios to retry");
            let summary = RetrySummary::empty();
            self.registry.write_summary(&summary)?;
            return Ok(summary);
        }

        self.registry.persist(&original)?;
        info!(
            "{} failed scenario(s), retrying up to {} time(s)",
            original.len(),
            options.max_retries
        );

        let mut still_failing = original.clone();
        let mut attempts_run = 0;

        for attempt in 1..=options.max_retries {
            attempts_run = attempt;
            let is_last = attempt == options.max_retries;

            info!(
                "Retry attempt {}/{}: {} scenario(s)",
                attempt,
                options.max_retries,
                still_failing.len()
            );

            match self.run_attempt(options, attempt, &still_failing).await {
                Ok(failing) => {
                    self.registry.persist(&failing)?;
                    info!(
                        "Attempt {}: {} recovered, {} still failing",
                        attempt,
                        still_failing.len().saturating_sub(failing.len()),
                        failing.len()
                    );
                    still_failing = failing;
                }
                Err(e) if is_last => {
                    error!("Retry attempt {} failed: {}", attempt, e);
                    return Err(HarnessError::AttemptFailed {
                        attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Retry attempt {} failed, nothing recovered: {}", attempt, e);
                }
            }

            if still_failing.is_empty() {
                break;
            }

            if !is_last && !options.delay.is_zero() {
                info!("Waiting {:?} before next attempt", options.delay);
                tokio::time::sleep(options.delay).await;
            }
        }

        let summary = RetrySummary::from_sets(&original, &still_failing, attempts_run);
        self.registry.write_summary(&summary)?;

        match summary.outcome {
            RetryOutcome::Recovered => info!(
                "All {} scenario(s) recovered after {} attempt(s)",
                summary.recovered_count, summary.attempts_run
            ),
            _ => warn!(
                "{} scenario(s) still failing after {} attempt(s)",
                summary.still_failing_count, summary.attempts_run
            ),
        }

        Ok(summary)
    }

    async fn run_attempt(
        &self,
        options: &RetryOptions,
        attempt: u32,
        failing: &[FailedTest],
    ) -> HarnessResult<Vec<FailedTest>> {
        let mut config = self.loader.load(&options.env)?;
        config.apply_env_overrides(&self.vars);

        let report_path = attempt_report_path(&self.reports_dir, attempt);
        remove_stale_report(&report_path)?;

        let invocation = InvocationBuilder::new(&config, &report_path)
            .workers(options.workers)
            .scope(ScenarioScope::Only(failing.to_vec()))
            .build();

        let outcome = self.executor.execute(&invocation).await?;
        if !outcome.success() {
            info!(
                "Runner exited with {:?} on attempt {}",
                outcome.exit_code, attempt
            );
        }

        extract_failures(&report_path, attempt + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SourceLocation;
    use test_case::test_case;

    fn failed(name: &str, line: u32) -> FailedTest {
        FailedTest {
            scenario_name: name.to_string(),
            location: SourceLocation {
                file: "features/a.feature".to_string(),
                line,
            },
            error_summary: "boom".to_string(),
            recorded_at: Utc::now(),
            attempt_number: 1,
        }
    }

    #[test_case(4, 0, Some("100.00"))]
    #[test_case(3, 1, Some("66.67"))]
    #[test_case(2, 2, Some("0.00"))]
    #[test_case(0, 0, None)]
    fn test_success_rate(original: usize, still: usize, expected: Option<&str>) {
        assert_eq!(success_rate(original, still).as_deref(), expected);
    }

    #[test]
    fn test_summary_from_sets() {
        let original = vec![failed("A", 1), failed("B", 5), failed("C", 9)];
        let still = vec![failed("B", 5)];

        let summary = RetrySummary::from_sets(&original, &still, 2);
        assert_eq!(summary.original_failure_count, 3);
        assert_eq!(summary.retried_count, 3);
        assert_eq!(summary.still_failing_count, 1);
        assert_eq!(summary.recovered_count, 2);
        assert_eq!(summary.recovered_names, vec!["A", "C"]);
        assert_eq!(summary.success_rate_percent.as_deref(), Some("66.67"));
        assert_eq!(summary.outcome, RetryOutcome::Exhausted);
    }

    #[test]
    fn test_summary_same_name_different_line() {
        let original = vec![failed("Login", 3), failed("Login", 20)];
        let still = vec![failed("Login", 20)];

        let summary = RetrySummary::from_sets(&original, &still, 1);
        assert_eq!(summary.recovered_count, 1);
        assert_eq!(summary.still_failing_count, 1);
    }

    #[test]
    fn test_empty_summary() {
        let summary = RetrySummary::from_sets(&[], &[], 0);
        assert_eq!(summary.outcome, RetryOutcome::NoFailures);
        assert!(summary.all_passing());
        assert_eq!(summary.success_rate_percent, None);
    }
}
