//! BDD runner invocation
//!
//! Runner command lines are built as an argv list, never as a shell string,
//! so scenario names with quotes or shell metacharacters pass through
//! untouched. Execution goes through the [`TestExecutor`] trait; the real
//! implementation spawns the runner with `tokio::process`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use crate::config::EnvironmentConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::registry::FailedTest;
use crate::vars;

/// A fully resolved runner command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub current_dir: Option<PathBuf>,
    /// Where the runner has been told to write its JSON report
    pub report_path: PathBuf,
}

impl RunnerInvocation {
    /// Human-readable rendering for logs; not meant to be fed to a shell
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Which scenarios an invocation covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScenarioScope {
    /// Everything under the features directory
    #[default]
    All,
    /// Exactly these scenarios
    Only(Vec<FailedTest>),
}

/// Builds [`RunnerInvocation`]s from an environment config
#[derive(Debug, Clone)]
pub struct InvocationBuilder<'a> {
    config: &'a EnvironmentConfig,
    report_path: PathBuf,
    workers: usize,
    tags: Option<String>,
    scope: ScenarioScope,
    current_dir: Option<PathBuf>,
}

impl<'a> InvocationBuilder<'a> {
    pub fn new(config: &'a EnvironmentConfig, report_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            report_path: report_path.into(),
            workers: 1,
            tags: None,
            scope: ScenarioScope::All,
            current_dir: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn tags(mut self, tags: Option<String>) -> Self {
        self.tags = tags.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn scope(mut self, scope: ScenarioScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn current_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.current_dir = dir;
        self
    }

    pub fn build(self) -> RunnerInvocation {
        let runner = &self.config.runner;
        let mut args = runner.args.clone();

        args.push("--format".to_string());
        args.push(format!("json:{}", self.report_path.display()));

        for reporter in &self.config.test.reporter {
            args.push("--format".to_string());
            args.push(reporter.clone());
        }

        args.push("--world-parameters".to_string());
        args.push(world_parameters(self.config).to_string());

        if self.workers > 1 {
            args.push("--parallel".to_string());
            args.push(self.workers.to_string());
        }

        if self.config.test.fail_fast {
            args.push("--fail-fast".to_string());
        }

        if let Some(tags) = &self.tags {
            args.push("--tags".to_string());
            args.push(tags.clone());
        }

        match &self.scope {
            ScenarioScope::All => {
                args.push(runner.features_dir.display().to_string());
            }
            ScenarioScope::Only(tests) if tests.iter().all(|t| t.location.is_known()) => {
                for test in tests {
                    let location = test.location.to_string();
                    if !args.contains(&location) {
                        args.push(location);
                    }
                }
            }
            ScenarioScope::Only(tests) => {
                // --name applies to every loaded scenario, so once one
                // scenario lacks a location all of them are matched by name.
                let mut patterns: Vec<String> = Vec::new();
                for test in tests {
                    let pattern = format!("^{}$", regex::escape(&test.scenario_name));
                    if !patterns.contains(&pattern) {
                        patterns.push(pattern);
                    }
                }
                for pattern in patterns {
                    args.push("--name".to_string());
                    args.push(pattern);
                }
                args.push(runner.features_dir.display().to_string());
            }
        }

        let mut env = BTreeMap::new();
        env.insert(vars::TEST_ENV.to_string(), self.config.name.clone());
        env.insert(
            vars::HEADLESS.to_string(),
            self.config.browser.headless.to_string(),
        );
        env.insert(vars::BASE_URL.to_string(), self.config.app.base_url.clone());

        RunnerInvocation {
            program: runner.program.clone(),
            args,
            env,
            current_dir: self.current_dir,
            report_path: self.report_path,
        }
    }
}

/// Browser and timeout settings handed to step definitions as `this.parameters`
fn world_parameters(config: &EnvironmentConfig) -> serde_json::Value {
    let browser = &config.browser;
    serde_json::json!({
        "environment": config.name,
        "baseUrl": config.app.base_url,
        "apiUrl": config.app.api_url,
        "scenarioTimeoutMs": config.test.timeout_ms,
        "browser": {
            "name": browser.name,
            "headless": browser.headless,
            "slowMoMs": browser.slow_mo_ms,
            "timeoutMs": browser.timeout_ms,
            "viewport": { "width": browser.viewport.width, "height": browser.viewport.height },
        },
    })
}

/// Remove a report left behind by an earlier run, so a runner that exits
/// without writing one is not mistaken for a fresh result.
pub fn remove_stale_report(path: &Path) -> HarnessResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale report {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Result of a runner process that ran to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs runner invocations. `Err` means the run did not complete (could
/// not spawn, crashed); failing scenarios are a normal `Ok` outcome.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn execute(&self, invocation: &RunnerInvocation) -> HarnessResult<ExecutionOutcome>;
}

/// Spawns the runner as a child process with inherited stdio
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl TestExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &RunnerInvocation) -> HarnessResult<ExecutionOutcome> {
        if let Some(parent) = invocation.report_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Running: {}", invocation.display_command());
        debug!("Runner env: {:?}", invocation.env);

        let mut cmd = TokioCommand::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let status = cmd.status().await.map_err(|e| {
            HarnessError::Runner(format!("failed to spawn {}: {}", invocation.program, e))
        })?;

        let outcome = ExecutionOutcome {
            exit_code: status.code(),
            duration: start.elapsed(),
        };
        debug!(
            "Runner exited with {:?} after {} ms",
            outcome.exit_code,
            outcome.duration.as_millis()
        );
        Ok(outcome)
    }
}

/// Report path for retry attempt `attempt` inside `reports_dir`
pub fn attempt_report_path(reports_dir: &Path, attempt: u32) -> PathBuf {
    reports_dir.join(format!("retry-{}.json", attempt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use crate::registry::SourceLocation;
    use chrono::Utc;

    fn config() -> EnvironmentConfig {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("staging.json"),
            r#"{
                "app": { "base_url": "https://staging" },
                "browser": { "headless": false },
                "test": { "timeout_ms": 90000, "reporter": ["progress", "html:test-results/report.html"] }
            }"#,
        )
        .unwrap();
        ConfigLoader::new(dir.path()).load("staging").unwrap()
    }

    fn failed(name: &str, file: &str, line: u32) -> FailedTest {
        FailedTest {
            scenario_name: name.to_string(),
            location: SourceLocation {
                file: file.to_string(),
                line,
            },
            error_summary: String::new(),
            recorded_at: Utc::now(),
            attempt_number: 1,
        }
    }

    /// Arguments after the fixed prefix: parallelism, filters and scope
    fn scope_args(invocation: &RunnerInvocation) -> Vec<&str> {
        let start = invocation
            .args
            .iter()
            .position(|a| a == "--world-parameters")
            .unwrap()
            + 2;
        invocation.args[start..].iter().map(String::as_str).collect()
    }

    #[test]
    fn test_full_run_invocation() {
        let config = config();
        let invocation = InvocationBuilder::new(&config, "test-results/cucumber-report.json")
            .workers(4)
            .tags(Some("@smoke and not @wip".to_string()))
            .build();

        assert_eq!(invocation.program, "npx");
        assert_eq!(
            invocation.args[..7],
            [
                "cucumber-js",
                "--format",
                "json:test-results/cucumber-report.json",
                "--format",
                "progress",
                "--format",
                "html:test-results/report.html",
            ]
        );
        assert_eq!(
            scope_args(&invocation),
            vec!["--parallel", "4", "--tags", "@smoke and not @wip", "features"]
        );
        assert_eq!(invocation.env["TEST_ENV"], "staging");
        assert_eq!(invocation.env["HEADLESS"], "false");
        assert_eq!(invocation.env["BASE_URL"], "https://staging");
    }

    #[test]
    fn test_world_parameters_carry_timeouts() {
        let config = config();
        let invocation = InvocationBuilder::new(&config, "r.json").build();

        let position = invocation
            .args
            .iter()
            .position(|a| a == "--world-parameters")
            .unwrap();
        let params: serde_json::Value =
            serde_json::from_str(&invocation.args[position + 1]).unwrap();

        assert_eq!(params["environment"], "staging");
        assert_eq!(params["baseUrl"], "https://staging");
        assert_eq!(params["scenarioTimeoutMs"], 90_000);
        assert_eq!(params["browser"]["timeoutMs"], 30_000);
        assert_eq!(params["browser"]["headless"], false);
        assert_eq!(params["browser"]["viewport"]["width"], 1280);
    }

    #[test]
    fn test_remove_stale_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cucumber-report.json");
        std::fs::write(&path, "[]").unwrap();

        remove_stale_report(&path).unwrap();
        assert!(!path.exists());
        // already gone is fine
        remove_stale_report(&path).unwrap();
    }

    #[test]
    fn test_single_worker_omits_parallel() {
        let config = config();
        let invocation = InvocationBuilder::new(&config, "r.json").workers(1).build();
        assert!(!invocation.args.contains(&"--parallel".to_string()));
    }

    #[test]
    fn test_scoped_invocation_uses_locations() {
        let config = config();
        let scope = ScenarioScope::Only(vec![
            failed("Search for user A", "features/search.feature", 5),
            failed("Search for user A", "features/admin.feature", 9),
        ]);
        let invocation = InvocationBuilder::new(&config, "test-results/retry-1.json")
            .scope(scope)
            .build();

        assert_eq!(
            scope_args(&invocation),
            vec!["features/search.feature:5", "features/admin.feature:9"]
        );
    }

    #[test]
    fn test_unlocated_scenario_switches_to_names() {
        let config = config();
        let scope = ScenarioScope::Only(vec![
            failed("Search for user A", "features/search.feature", 5),
            failed("Login as \"admin\"; echo $HOME", "", 0),
        ]);
        let invocation = InvocationBuilder::new(&config, "test-results/retry-1.json")
            .scope(scope)
            .build();

        assert_eq!(
            scope_args(&invocation),
            vec![
                "--name",
                "^Search for user A$",
                "--name",
                "^Login as \"admin\"; echo \\$HOME$",
                "features",
            ]
        );
    }

    #[test]
    fn test_scoped_by_name_only_keeps_features_dir() {
        let config = config();
        let scope = ScenarioScope::Only(vec![failed("Checkout (guest)", "", 0)]);
        let invocation = InvocationBuilder::new(&config, "r.json").scope(scope).build();

        assert!(invocation.args.ends_with(&[
            "--name".to_string(),
            "^Checkout \\(guest\\)$".to_string(),
            "features".to_string(),
        ]));
    }

    #[test]
    fn test_attempt_report_path() {
        assert_eq!(
            attempt_report_path(Path::new("test-results"), 2),
            PathBuf::from("test-results/retry-2.json")
        );
    }

    #[tokio::test]
    async fn test_process_executor_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = RunnerInvocation {
            program: "bddkit-definitely-not-a-real-binary".to_string(),
            args: vec![],
            env: BTreeMap::new(),
            current_dir: None,
            report_path: dir.path().join("r.json"),
        };
        let err = ProcessExecutor.execute(&invocation).await.unwrap_err();
        assert!(matches!(err, HarnessError::Runner(_)));
    }
}
