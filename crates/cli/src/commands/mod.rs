//! CLI command implementations

pub mod config;
pub mod failures;
pub mod retry;
pub mod run;
pub mod workers;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use bddkit_e2e::config::resolve_env_name;
use bddkit_e2e::workers::HostResources;
use bddkit_e2e::{ConfigLoader, EnvVars, EnvironmentConfig, WorkerAdvisor};

use crate::output::{print_warning, OutputFormat};

/// State shared by every command
pub struct Context {
    pub config_dir: PathBuf,
    pub format: OutputFormat,
    pub vars: EnvVars,
}

impl Context {
    pub fn new(config_dir: PathBuf, format: OutputFormat, vars: EnvVars) -> Self {
        Self {
            config_dir,
            format,
            vars,
        }
    }

    pub fn loader(&self) -> ConfigLoader {
        ConfigLoader::new(&self.config_dir)
    }

    /// Resolve the environment name and load its config with env overrides applied
    pub fn load_config(&self, explicit_env: Option<&str>) -> Result<EnvironmentConfig> {
        let env = resolve_env_name(explicit_env, &self.vars);
        let mut config = self
            .loader()
            .load(&env)
            .with_context(|| format!("loading configuration for '{}'", env))?;
        config.apply_env_overrides(&self.vars);
        Ok(config)
    }

    pub fn advisor(&self, config: &EnvironmentConfig) -> WorkerAdvisor {
        WorkerAdvisor::new(HostResources::detect(), &self.vars)
            .with_ci_workers(config.test.ci_workers)
    }

    /// Worker count: CLI flag, then `PARALLEL_WORKERS`, then config, then
    /// the advisor's recommendation. Validation problems are printed, not
    /// enforced.
    pub fn choose_workers(&self, config: &EnvironmentConfig, flag: Option<usize>) -> usize {
        let advisor = self.advisor(config);
        let workers = flag
            .or(advisor.override_workers())
            .or(config.test.workers)
            .unwrap_or_else(|| advisor.recommend())
            .max(1);

        let validation = advisor.validate(workers);
        for warning in &validation.warnings {
            print_warning(warning);
        }
        if !validation.is_valid {
            print_warning(&format!(
                "{} worker(s) exceeds host limits; continuing anyway",
                workers
            ));
        }
        workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn context(vars: &[(&str, &str)]) -> (tempfile::TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("base.json"),
            r#"{ "app": { "base_url": "http://localhost:3000" }, "test": { "workers": 3 } }"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("qa.json"),
            r#"{ "app": { "base_url": "https://qa.internal" } }"#,
        )
        .unwrap();

        let ctx = Context::new(
            dir.path().to_path_buf(),
            OutputFormat::Plain,
            vars.iter().copied().collect(),
        );
        (dir, ctx)
    }

    #[test]
    fn test_load_config_resolves_env_from_vars() {
        let (_dir, ctx) = context(&[("TEST_ENV", "qa"), ("RETRY_COUNT", "7")]);
        let config = ctx.load_config(None).unwrap();

        assert_eq!(config.name, "qa");
        assert_eq!(config.app.base_url, "https://qa.internal");
        assert_eq!(config.test.retries, 7);
    }

    #[test]
    fn test_load_config_explicit_env_wins() {
        let (_dir, ctx) = context(&[("TEST_ENV", "qa"), ("BASE_URL", "http://override")]);
        let config = ctx.load_config(Some("dev")).unwrap();

        assert_eq!(config.name, "dev");
        assert_eq!(config.app.base_url, "http://override");
    }

    #[test]
    fn test_load_config_missing_dir_reports_env() {
        let ctx = Context::new(
            PathBuf::from("/nonexistent/bddkit-config"),
            OutputFormat::Plain,
            EnvVars::default(),
        );
        let err = ctx.load_config(Some("prod")).unwrap_err();
        assert!(format!("{:#}", err).contains("'prod'"));
    }

    #[test]
    fn test_choose_workers_precedence() {
        let (_dir, ctx) = context(&[("PARALLEL_WORKERS", "2")]);
        let config = ctx.load_config(None).unwrap();

        assert_eq!(ctx.choose_workers(&config, Some(1)), 1);
        assert_eq!(ctx.choose_workers(&config, None), 2);

        let (_dir, ctx) = context(&[]);
        let config = ctx.load_config(None).unwrap();
        assert_eq!(ctx.choose_workers(&config, None), 3);
    }
}
