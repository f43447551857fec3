//! Snapshot of process environment variables
//!
//! Config overrides, CI detection and worker overrides all read from an
//! [`EnvVars`] value instead of `std::env` directly, so callers (and tests)
//! decide which variables are visible.

use std::collections::HashMap;

/// Selects the named environment when no explicit name is given
pub const TEST_ENV: &str = "TEST_ENV";
/// Replaces `app.base_url`
pub const BASE_URL: &str = "BASE_URL";
/// Replaces `browser.headless`
pub const HEADLESS: &str = "HEADLESS";
/// Explicit parallel worker count
pub const PARALLEL_WORKERS: &str = "PARALLEL_WORKERS";
/// Replaces `test.retries`
pub const RETRY_COUNT: &str = "RETRY_COUNT";
/// Replaces `test.retry_delay_seconds`
pub const RETRY_DELAY: &str = "RETRY_DELAY";
/// Replaces `test.fail_fast`
pub const FAIL_FAST: &str = "FAIL_FAST";

/// Presence of any of these marks the process as running under CI.
pub const CI_INDICATORS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "JENKINS_URL",
    "JENKINS_HOME",
    "BUILD_NUMBER",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "BUILDKITE",
    "TF_BUILD",
];

#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Non-empty, trimmed value
    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn is_ci(&self) -> bool {
        CI_INDICATORS.iter().any(|key| self.contains(key))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Parse a boolean-ish flag value (`true/false`, `1/0`, `yes/no`, `on/off`)
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("true", Some(true))]
    #[test_case(" 1 ", Some(true))]
    #[test_case("OFF", Some(false))]
    #[test_case("0", Some(false))]
    #[test_case("maybe", None)]
    fn test_parse_flag(input: &str, expected: Option<bool>) {
        assert_eq!(parse_flag(input), expected);
    }

    #[test]
    fn test_ci_detection_is_presence_only() {
        let vars: EnvVars = [("JENKINS_URL", "")].into_iter().collect();
        assert!(vars.is_ci());

        let vars: EnvVars = [("HOME", "/root")].into_iter().collect();
        assert!(!vars.is_ci());
    }

    #[test]
    fn test_value_ignores_blank() {
        let vars: EnvVars = [("TEST_ENV", "   ")].into_iter().collect();
        assert_eq!(vars.value("TEST_ENV"), None);
        assert_eq!(vars.get("TEST_ENV"), Some("   "));
    }
}
