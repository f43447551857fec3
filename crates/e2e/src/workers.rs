//! Parallel worker planning
//!
//! Recommends how many runner workers to use from CPU and memory figures,
//! CI detection and an explicit `PARALLEL_WORKERS` override, and checks a
//! chosen count against the same limits. Validation is advisory: nothing
//! stops a caller from running with an invalid count.

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::debug;

use crate::vars::{self, EnvVars};

/// Estimated memory footprint of one browser worker
pub const MEMORY_PER_WORKER_GB: f64 = 0.5;
/// Workers beyond this tend to destabilise browser suites
pub const MAX_STABLE_WORKERS: usize = 8;
/// Share of CPU cores given to workers
pub const CPU_UTILIZATION: f64 = 0.5;
/// Worker count used under CI unless configured otherwise
pub const DEFAULT_CI_WORKERS: usize = 2;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// CPU and memory figures for the current host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostResources {
    pub cpu_count: usize,
    pub total_memory_gb: f64,
    pub free_memory_gb: f64,
}

impl HostResources {
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let resources = Self {
            cpu_count: sys.cpus().len().max(1),
            total_memory_gb: sys.total_memory() as f64 / BYTES_PER_GB,
            free_memory_gb: sys.available_memory() as f64 / BYTES_PER_GB,
        };
        debug!("Detected host resources: {:?}", resources);
        resources
    }
}

/// Outcome of checking a worker count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerValidation {
    pub is_valid: bool,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Everything the advisor knows, for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPlan {
    pub cpu_count: usize,
    pub total_memory_gb: f64,
    pub free_memory_gb: f64,
    pub is_ci: bool,
    pub requested_workers: Option<usize>,
    pub recommended_workers: usize,
    pub validation: WorkerValidation,
}

#[derive(Debug, Clone)]
pub struct WorkerAdvisor {
    resources: HostResources,
    is_ci: bool,
    override_workers: Option<usize>,
    ci_workers: usize,
}

impl WorkerAdvisor {
    pub fn new(resources: HostResources, vars: &EnvVars) -> Self {
        Self {
            resources,
            is_ci: vars.is_ci(),
            override_workers: vars
                .value(vars::PARALLEL_WORKERS)
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|n| *n > 0),
            ci_workers: DEFAULT_CI_WORKERS,
        }
    }

    /// Advisor for the current host and process environment
    pub fn from_host() -> Self {
        Self::new(HostResources::detect(), &EnvVars::from_process())
    }

    /// Worker count to use under CI
    pub fn with_ci_workers(mut self, ci_workers: usize) -> Self {
        self.ci_workers = ci_workers.max(1);
        self
    }

    pub fn resources(&self) -> &HostResources {
        &self.resources
    }

    pub fn is_ci(&self) -> bool {
        self.is_ci
    }

    pub fn override_workers(&self) -> Option<usize> {
        self.override_workers
    }

    /// Recommended worker count, always at least 1.
    ///
    /// An explicit override wins; under CI the CI count is used; otherwise
    /// half the cores, bounded by memory and [`MAX_STABLE_WORKERS`].
    pub fn recommend(&self) -> usize {
        if let Some(n) = self.override_workers {
            return n;
        }
        if self.is_ci {
            return self.ci_workers;
        }
        self.computed()
    }

    fn computed(&self) -> usize {
        let by_cpu = ((self.resources.cpu_count as f64 * CPU_UTILIZATION).floor() as usize).max(1);
        let by_memory = (self.resources.total_memory_gb / MEMORY_PER_WORKER_GB).floor() as usize;

        by_cpu.min(by_memory).min(MAX_STABLE_WORKERS).max(1)
    }

    /// Check `workers` against the host's limits
    pub fn validate(&self, workers: usize) -> WorkerValidation {
        let mut validation = WorkerValidation {
            is_valid: true,
            ..Default::default()
        };

        if workers == 0 {
            validation.is_valid = false;
            validation
                .warnings
                .push("Worker count must be at least 1".to_string());
            validation
                .recommendations
                .push(format!("Use {} worker(s)", self.recommend()));
            return validation;
        }

        if workers > self.resources.cpu_count {
            validation.warnings.push(format!(
                "{} workers exceeds CPU cores ({})",
                workers, self.resources.cpu_count
            ));
            validation.recommendations.push(format!(
                "Reduce workers to at most {}",
                self.resources.cpu_count
            ));
        }

        if workers > MAX_STABLE_WORKERS {
            validation.warnings.push(format!(
                "{} workers exceeds stability cap of {}",
                workers, MAX_STABLE_WORKERS
            ));
            validation.recommendations.push(format!(
                "Browser suites are most stable with {} or fewer workers",
                MAX_STABLE_WORKERS
            ));
        }

        if workers == 1 {
            validation
                .warnings
                .push("Single worker gives no parallelism benefit".to_string());
            if self.computed() > 1 {
                validation.recommendations.push(format!(
                    "This host can run {} workers",
                    self.computed()
                ));
            }
        }

        let needed_gb = workers as f64 * MEMORY_PER_WORKER_GB;
        if needed_gb > self.resources.free_memory_gb {
            validation.is_valid = false;
            validation.warnings.push(format!(
                "Estimated memory usage {:.1} GB exceeds free memory {:.1} GB",
                needed_gb, self.resources.free_memory_gb
            ));
            let fits = (self.resources.free_memory_gb / MEMORY_PER_WORKER_GB).floor() as usize;
            validation
                .recommendations
                .push(format!("Reduce workers to {} or free up memory", fits.max(1)));
        }

        validation
    }

    /// Recommendation and validation for `requested`, or for the
    /// recommended count when nothing is requested
    pub fn plan(&self, requested: Option<usize>) -> WorkerPlan {
        let requested = requested.or(self.override_workers);
        let recommended = self.recommend();
        let validation = self.validate(requested.unwrap_or(recommended));

        WorkerPlan {
            cpu_count: self.resources.cpu_count,
            total_memory_gb: self.resources.total_memory_gb,
            free_memory_gb: self.resources.free_memory_gb,
            is_ci: self.is_ci,
            requested_workers: requested,
            recommended_workers: recommended,
            validation,
        }
    }
}
