//! Durable registry of failed scenarios
//!
//! Failures are extracted from a structured report and kept in a JSON file
//! next to the reports, together with the last retry summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::HarnessResult;
use crate::report::Report;
use crate::retry::RetrySummary;

/// File name of the failed-test registry inside the reports dir
pub const REGISTRY_FILE: &str = "failed-tests.json";
/// File name of the last retry summary inside the reports dir
pub const SUMMARY_FILE: &str = "retry-summary.json";

const MAX_ERROR_SUMMARY_CHARS: usize = 1000;

/// Where a scenario lives in the feature tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    /// 0 when unknown
    pub line: u32,
}

impl SourceLocation {
    pub fn is_known(&self) -> bool {
        !self.file.is_empty() && self.line > 0
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One scenario that failed in one execution attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTest {
    pub scenario_name: String,
    pub location: SourceLocation,
    pub error_summary: String,
    pub recorded_at: DateTime<Utc>,
    /// 1 for the original run, `k + 1` for retry attempt `k`
    pub attempt_number: u32,
}

/// Identity of a scenario across attempts: file, line and name
pub type ScenarioKey = (String, u32, String);

impl FailedTest {
    pub fn key(&self) -> ScenarioKey {
        (
            self.location.file.clone(),
            self.location.line,
            self.scenario_name.clone(),
        )
    }
}

/// Extract one [`FailedTest`] per scenario that has at least one failed step.
///
/// The error summary comes from the first failing step in document order.
/// Background records are not scenarios and are skipped.
pub fn extract_failures(report_path: &Path, attempt_number: u32) -> HarnessResult<Vec<FailedTest>> {
    let report = Report::from_file(report_path)?;
    let recorded_at = Utc::now();

    let failures: Vec<FailedTest> = report
        .features
        .iter()
        .flat_map(|feature| feature.elements.iter().map(move |e| (feature, e)))
        .filter(|(_, element)| !element.is_background() && !element.name.trim().is_empty())
        .filter_map(|(feature, element)| {
            element.first_failure().map(|step| FailedTest {
                scenario_name: element.name.clone(),
                location: SourceLocation {
                    file: feature.uri.clone(),
                    line: element.line,
                },
                error_summary: truncate(step.result.error_message.as_deref().unwrap_or("")),
                recorded_at,
                attempt_number,
            })
        })
        .collect();

    debug!(
        "{} failing scenario(s) out of {} in {}",
        failures.len(),
        report.scenario_count(),
        report_path.display()
    );
    Ok(failures)
}

fn truncate(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_SUMMARY_CHARS) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_string(),
    }
}

/// File-backed list of failures plus the last retry summary
#[derive(Debug, Clone)]
pub struct FailedTestRegistry {
    registry_path: PathBuf,
    summary_path: PathBuf,
}

impl FailedTestRegistry {
    /// Registry rooted in a reports directory
    pub fn new(reports_dir: impl AsRef<Path>) -> Self {
        let dir = reports_dir.as_ref();
        Self {
            registry_path: dir.join(REGISTRY_FILE),
            summary_path: dir.join(SUMMARY_FILE),
        }
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    /// Stored failures; empty when nothing has been persisted
    pub fn load(&self) -> HarnessResult<Vec<FailedTest>> {
        if !self.registry_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.registry_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Append `tests` to the stored list and rewrite it.
    ///
    /// A record already present for the same scenario and attempt is not
    /// written twice. Returns how many records were added.
    pub fn persist(&self, tests: &[FailedTest]) -> HarnessResult<usize> {
        let mut existing = self.load()?;
        let mut seen: HashSet<(ScenarioKey, u32)> = existing
            .iter()
            .map(|t| (t.key(), t.attempt_number))
            .collect();

        let before = existing.len();
        for test in tests {
            if seen.insert((test.key(), test.attempt_number)) {
                existing.push(test.clone());
            }
        }
        let added = existing.len() - before;

        write_json(&self.registry_path, &existing)?;
        debug!(
            "Registry {} now holds {} record(s)",
            self.registry_path.display(),
            existing.len()
        );
        Ok(added)
    }

    /// Remove the registry and the last summary. Absent files are fine.
    pub fn clear(&self) -> HarnessResult<()> {
        for path in [&self.registry_path, &self.summary_path] {
            match std::fs::remove_file(path) {
                Ok(()) => info!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn write_summary(&self, summary: &RetrySummary) -> HarnessResult<()> {
        write_json(&self.summary_path, summary)?;
        info!("Retry summary written to: {}", self.summary_path.display());
        Ok(())
    }

    pub fn load_summary(&self) -> HarnessResult<Option<RetrySummary>> {
        if !self.summary_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.summary_path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> HarnessResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
