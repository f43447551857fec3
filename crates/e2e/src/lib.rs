//! bddkit E2E harness library
//!
//! Orchestration around a cucumber/Playwright browser suite:
//! - Loads layered per-environment JSON configuration
//! - Recommends and validates parallel worker counts
//! - Extracts failed scenarios from the cucumber JSON report
//! - Re-runs only those scenarios, attempt by attempt, and summarises
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RetryOrchestrator                      │
//! │    ├── ConfigLoader::load(env) -> EnvironmentConfig         │
//! │    ├── extract_failures(report) -> [FailedTest]             │
//! │    ├── InvocationBuilder -> RunnerInvocation (argv)         │
//! │    ├── TestExecutor::execute(invocation)                    │
//! │    └── FailedTestRegistry (failed-tests.json,               │
//! │                            retry-summary.json)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  WorkerAdvisor     HostResources + EnvVars -> WorkerPlan    │
//! │  backoff           retry_with_backoff, should_retry_test    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod invocation;
pub mod registry;
pub mod report;
pub mod retry;
pub mod vars;
pub mod workers;

pub use config::{ConfigLoader, EnvironmentConfig};
pub use error::{HarnessError, HarnessResult};
pub use invocation::{InvocationBuilder, ProcessExecutor, RunnerInvocation, TestExecutor};
pub use registry::{FailedTest, FailedTestRegistry};
pub use retry::{RetryOptions, RetryOrchestrator, RetrySummary};
pub use vars::EnvVars;
pub use workers::{WorkerAdvisor, WorkerPlan};
