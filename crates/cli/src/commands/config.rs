//! Config Command

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use bddkit_e2e::EnvironmentConfig;

use super::Context;
use crate::output::{print_item, print_list, TableDisplay};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Environment to show (defaults to $TEST_ENV, then dev)
    #[arg(short, long)]
    pub env: Option<String>,

    /// List environments available in the config directory
    #[arg(long)]
    pub list: bool,
}

#[derive(Serialize)]
#[serde(transparent)]
pub struct ConfigDisplay(pub EnvironmentConfig);

impl TableDisplay for ConfigDisplay {
    fn headers() -> Vec<&'static str> {
        vec![
            "Environment",
            "Base URL",
            "Browser",
            "Headless",
            "Retries",
            "Workers",
            "Reports",
        ]
    }

    fn row(&self) -> Vec<String> {
        let config = &self.0;
        vec![
            config.name.clone(),
            config.app.base_url.clone(),
            config.browser.name.clone(),
            config.browser.headless.to_string(),
            format!(
                "{} (every {}s)",
                config.test.retries, config.test.retry_delay_seconds
            ),
            config
                .test
                .workers
                .map(|n| n.to_string())
                .unwrap_or_else(|| "auto".to_string()),
            config.runner.reports_dir.display().to_string(),
        ]
    }
}

#[derive(Serialize)]
pub struct EnvironmentName {
    pub name: String,
}

impl TableDisplay for EnvironmentName {
    fn headers() -> Vec<&'static str> {
        vec!["Environment"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.name.clone()]
    }
}

pub async fn execute(args: ConfigArgs, ctx: &Context) -> Result<ExitCode> {
    if args.list {
        let names: Vec<EnvironmentName> = ctx
            .loader()
            .available_environments()?
            .into_iter()
            .map(|name| EnvironmentName { name })
            .collect();
        print_list(&names, ctx.format);
        return Ok(ExitCode::SUCCESS);
    }

    let config = ctx.load_config(args.env.as_deref())?;
    print_item(&ConfigDisplay(config), ctx.format);
    Ok(ExitCode::SUCCESS)
}
