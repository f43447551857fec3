//! Typed schema for the cucumber JSON report
//!
//! Only the fields the retry path needs are modeled. Anything else in the
//! report is ignored, but the fields that are modeled must be present with
//! the right type, so a shape mismatch surfaces as a parse error instead of
//! silently reading as "no failures".

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HarnessError, HarnessResult};

/// One feature file's worth of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    /// Feature file path as reported by the runner
    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub name: String,

    /// Scenarios (and backgrounds) in document order
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// A scenario or background record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub name: String,

    /// 1-based line in the feature file, 0 when the runner omits it
    #[serde(default)]
    pub line: u32,

    /// `scenario` or `background`
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub keyword: String,

    #[serde(default)]
    pub name: String,

    pub result: StepResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,

    #[serde(default)]
    pub error_message: Option<String>,

    /// Nanoseconds, as cucumber-js reports it
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
    Pending,
    Undefined,
    Ambiguous,
    #[serde(other)]
    Unknown,
}

impl Element {
    pub fn is_background(&self) -> bool {
        self.kind.as_deref() == Some("background")
    }

    /// First step whose status is `failed`, in document order
    pub fn first_failure(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|step| step.result.status == StepStatus::Failed)
    }
}

/// A parsed report: the sequence of features
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report {
    pub features: Vec<Feature>,
}

impl Report {
    pub fn from_json(path: &Path, json: &str) -> HarnessResult<Self> {
        serde_json::from_str(json).map_err(|e| HarnessError::ReportParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        if !path.exists() {
            return Err(HarnessError::ReportNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(path, &content)
    }

    pub fn scenario_count(&self) -> usize {
        self.features
            .iter()
            .flat_map(|f| &f.elements)
            .filter(|e| !e.is_background())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cucumber_report() {
        let json = r#"[
          {
            "uri": "features/search.feature",
            "name": "Search",
            "keyword": "Feature",
            "elements": [
              {
                "name": "Search for user A",
                "line": 7,
                "type": "scenario",
                "steps": [
                  { "keyword": "Given ", "name": "I open the home page", "result": { "status": "passed", "duration": 1200 } },
                  { "keyword": "When ", "name": "I search", "result": { "status": "failed", "error_message": "Timeout 30000ms exceeded" } },
                  { "keyword": "Then ", "name": "I see results", "result": { "status": "skipped" } }
                ]
              }
            ]
          }
        ]"#;

        let report = Report::from_json(Path::new("r.json"), json).unwrap();
        assert_eq!(report.features.len(), 1);
        let scenario = &report.features[0].elements[0];
        assert_eq!(scenario.line, 7);
        assert_eq!(
            scenario.first_failure().unwrap().result.error_message.as_deref(),
            Some("Timeout 30000ms exceeded")
        );
        assert_eq!(report.scenario_count(), 1);
    }

    #[test]
    fn test_unknown_status_is_not_failed() {
        let json = r#"[{ "elements": [{ "name": "s", "steps": [{ "result": { "status": "flaky-ish" } }] }] }]"#;
        let report = Report::from_json(Path::new("r.json"), json).unwrap();
        let step = &report.features[0].elements[0].steps[0];
        assert_eq!(step.result.status, StepStatus::Unknown);
        assert!(report.features[0].elements[0].first_failure().is_none());
    }

    #[test]
    fn test_missing_result_is_parse_error() {
        let json = r#"[{ "elements": [{ "name": "s", "steps": [{ "name": "no result" }] }] }]"#;
        let err = Report::from_json(Path::new("r.json"), json).unwrap_err();
        assert!(matches!(err, HarnessError::ReportParse { .. }));
    }

    #[test]
    fn test_object_instead_of_sequence_is_parse_error() {
        let err = Report::from_json(Path::new("r.json"), r#"{ "elements": [] }"#).unwrap_err();
        assert!(matches!(err, HarnessError::ReportParse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = Report::from_file(Path::new("/nonexistent/report.json")).unwrap_err();
        assert!(matches!(err, HarnessError::ReportNotFound(_)));
    }
}
