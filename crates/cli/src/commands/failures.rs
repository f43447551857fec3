//! Failed-test registry commands

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use bddkit_e2e::{FailedTest, FailedTestRegistry};

use super::Context;
use crate::output::{ellipsize, print_list, print_message, TableDisplay};

#[derive(Subcommand, Debug)]
pub enum FailuresCommands {
    /// List recorded failures
    List {
        /// Environment whose reports directory holds the registry
        #[arg(short, long)]
        env: Option<String>,
    },

    /// Remove the registry and the last retry summary
    Clear {
        /// Environment whose reports directory holds the registry
        #[arg(short, long)]
        env: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(transparent)]
pub struct FailureDisplay(pub FailedTest);

impl TableDisplay for FailureDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Location", "Attempt", "Error", "Recorded"]
    }

    fn row(&self) -> Vec<String> {
        let test = &self.0;
        vec![
            test.scenario_name.clone(),
            test.location.to_string(),
            test.attempt_number.to_string(),
            ellipsize(&test.error_summary, 60),
            test.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]
    }
}

pub async fn execute(cmd: FailuresCommands, ctx: &Context) -> Result<ExitCode> {
    match cmd {
        FailuresCommands::List { env } => {
            let config = ctx.load_config(env.as_deref())?;
            let records: Vec<FailureDisplay> = FailedTestRegistry::new(&config.runner.reports_dir)
                .load()?
                .into_iter()
                .map(FailureDisplay)
                .collect();
            print_list(&records, ctx.format);
        }
        FailuresCommands::Clear { env } => {
            let config = ctx.load_config(env.as_deref())?;
            FailedTestRegistry::new(&config.runner.reports_dir).clear()?;
            print_message("Failed-test registry cleared", ctx.format);
        }
    }
    Ok(ExitCode::SUCCESS)
}
