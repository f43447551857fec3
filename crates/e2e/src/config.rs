//! Layered environment configuration
//!
//! Each environment is `base.json` shallow-merged with `<env>.json` from a
//! config directory. The result is an owned [`EnvironmentConfig`] value that
//! callers pass along explicitly; loading a different environment is just
//! another call to [`ConfigLoader::load`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::vars::{self, parse_flag, EnvVars};

/// Environment used when neither an explicit name nor `TEST_ENV` is set
pub const DEFAULT_ENV: &str = "dev";

const BASE_FILE: &str = "base";

/// Fully merged configuration for one named environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment name this config was loaded for
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub test: TestPolicy,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub runner: RunnerSettings,

    /// Named test users, passed through untouched
    #[serde(default)]
    pub users: serde_json::Map<String, Value>,

    /// Arbitrary fixture data, passed through untouched
    #[serde(default)]
    pub test_data: serde_json::Map<String, Value>,

    /// The merged document as read from disk
    #[serde(skip)]
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub api_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub name: String,
    pub headless: bool,
    pub slow_mo_ms: u64,
    pub timeout_ms: u64,
    pub viewport: Viewport,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            name: "chromium".to_string(),
            headless: true,
            slow_mo_ms: 0,
            timeout_ms: 30_000,
            viewport: Viewport::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

/// Scenario timeouts, retry policy and parallelism
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestPolicy {
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_seconds: u64,
    /// Fixed worker count; `None` lets the advisor decide
    pub workers: Option<usize>,
    pub ci_workers: usize,
    pub reporter: Vec<String>,
    pub fail_fast: bool,
}

impl Default for TestPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            retries: 2,
            retry_delay_seconds: 5,
            workers: None,
            ci_workers: 2,
            reporter: vec!["progress".to_string()],
            fail_fast: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub screenshots: bool,
    pub video: bool,
    pub trace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            screenshots: true,
            video: false,
            trace: false,
        }
    }
}

/// How to invoke the BDD runner and where its output lands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub program: String,
    pub args: Vec<String>,
    pub features_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub report_file: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            args: vec!["cucumber-js".to_string()],
            features_dir: PathBuf::from("features"),
            reports_dir: PathBuf::from("test-results"),
            report_file: "cucumber-report.json".to_string(),
        }
    }
}

impl RunnerSettings {
    /// Path of the main structured report
    pub fn report_path(&self) -> PathBuf {
        self.reports_dir.join(&self.report_file)
    }
}

impl EnvironmentConfig {
    /// Build a typed config from a merged JSON document
    pub fn from_value(env: &str, merged: Value, origin: &Path) -> HarnessResult<Self> {
        let mut config: Self =
            serde_json::from_value(merged.clone()).map_err(|e| HarnessError::ConfigParse {
                env: env.to_string(),
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;
        config.name = env.to_string();
        config.raw = merged;
        Ok(config)
    }

    /// Apply process-level overrides on top of the file-based values
    pub fn apply_env_overrides(&mut self, vars: &EnvVars) {
        if let Some(url) = vars.value(vars::BASE_URL) {
            debug!("BASE_URL override: {}", url);
            self.app.base_url = url.to_string();
        }

        if let Some(raw) = vars.value(vars::HEADLESS) {
            match parse_flag(raw) {
                Some(headless) => self.browser.headless = headless,
                None => warn!("Ignoring unparseable HEADLESS value '{}'", raw),
            }
        }

        if let Some(raw) = vars.value(vars::RETRY_COUNT) {
            match raw.parse::<u32>() {
                Ok(retries) => self.test.retries = retries,
                Err(_) => warn!("Ignoring unparseable RETRY_COUNT value '{}'", raw),
            }
        }

        if let Some(raw) = vars.value(vars::RETRY_DELAY) {
            match raw.parse::<u64>() {
                Ok(delay) => self.test.retry_delay_seconds = delay,
                Err(_) => warn!("Ignoring unparseable RETRY_DELAY value '{}'", raw),
            }
        }

        if let Some(raw) = vars.value(vars::FAIL_FAST) {
            match parse_flag(raw) {
                Some(fail_fast) => self.test.fail_fast = fail_fast,
                None => warn!("Ignoring unparseable FAIL_FAST value '{}'", raw),
            }
        }
    }
}

/// Reads and merges config files from one directory
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load `base.json` merged with `<env>.json`.
    ///
    /// Either file may be absent, but not both.
    pub fn load(&self, env: &str) -> HarnessResult<EnvironmentConfig> {
        validate_env_name(env)?;

        let base_path = self.dir.join(format!("{}.json", BASE_FILE));
        let env_path = self.dir.join(format!("{}.json", env));

        let base = read_layer(env, &base_path)?;
        let overlay = read_layer(env, &env_path)?;

        let merged = match (base, overlay) {
            (None, None) => {
                return Err(HarnessError::ConfigNotFound {
                    env: env.to_string(),
                    dir: self.dir.clone(),
                })
            }
            (Some(base), Some(overlay)) => merge_layers(&base, &overlay),
            (Some(base), None) => {
                warn!(
                    "No {} found, using base configuration only",
                    env_path.display()
                );
                base
            }
            (None, Some(overlay)) => overlay,
        };

        debug!("Loaded configuration for environment '{}'", env);
        EnvironmentConfig::from_value(env, merged, &env_path)
    }

    /// Names of the environment files present in the config directory
    pub fn available_environments(&self) -> HarnessResult<Vec<String>> {
        let mut names = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    let stem = stem.to_string_lossy();
                    if stem != BASE_FILE {
                        names.push(stem.to_string());
                    }
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

/// Pick the environment name: explicit argument, then `TEST_ENV`, then `dev`
pub fn resolve_env_name(explicit: Option<&str>, vars: &EnvVars) -> String {
    explicit
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or_else(|| vars.value(vars::TEST_ENV))
        .unwrap_or(DEFAULT_ENV)
        .to_string()
}

/// Merge `overlay` onto `base`: objects merge one level deep, everything
/// else (including arrays) is replaced wholesale.
pub fn merge_layers(base: &Value, overlay: &Value) -> Value {
    let (Some(base_map), Some(overlay_map)) = (base.as_object(), overlay.as_object()) else {
        return overlay.clone();
    };

    let mut merged = base_map.clone();
    for (key, value) in overlay_map {
        match (merged.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (leaf_key, leaf_value) in incoming {
                    existing.insert(leaf_key.clone(), leaf_value.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(merged)
}

fn read_layer(env: &str, path: &Path) -> HarnessResult<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content).map_err(|e| HarnessError::ConfigParse {
        env: env.to_string(),
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if !value.is_object() {
        return Err(HarnessError::ConfigParse {
            env: env.to_string(),
            path: path.to_path_buf(),
            reason: "top-level value must be an object".to_string(),
        });
    }

    Ok(Some(value))
}

fn validate_env_name(env: &str) -> HarnessResult<()> {
    if env.is_empty() || env.contains(['/', '\\']) || env.contains("..") {
        return Err(HarnessError::InvalidInput(format!(
            "invalid environment name '{}'",
            env
        )));
    }
    Ok(())
}
