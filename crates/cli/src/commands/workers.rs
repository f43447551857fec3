//! Workers Command

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use bddkit_e2e::workers::HostResources;
use bddkit_e2e::{WorkerAdvisor, WorkerPlan};

use super::Context;
use crate::output::{print_item, print_warning, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct WorkersArgs {
    /// Check this worker count against the host instead of the recommendation
    #[arg(long)]
    pub validate: Option<usize>,

    /// Environment whose test.ci_workers applies under CI
    #[arg(short, long)]
    pub env: Option<String>,
}

/// Display wrapper so the plan prints as one table row
#[derive(Serialize)]
#[serde(transparent)]
pub struct PlanDisplay(pub WorkerPlan);

impl TableDisplay for PlanDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["CPUs", "Memory (GB)", "Free (GB)", "CI", "Requested", "Recommended", "Valid"]
    }

    fn row(&self) -> Vec<String> {
        let plan = &self.0;
        vec![
            plan.cpu_count.to_string(),
            format!("{:.1}", plan.total_memory_gb),
            format!("{:.1}", plan.free_memory_gb),
            if plan.is_ci { "yes" } else { "no" }.to_string(),
            plan.requested_workers
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            plan.recommended_workers.to_string(),
            if plan.validation.is_valid { "yes" } else { "no" }.to_string(),
        ]
    }
}

pub async fn execute(args: WorkersArgs, ctx: &Context) -> Result<ExitCode> {
    // Config is optional here; without it the default CI worker count applies.
    let advisor = match ctx.load_config(args.env.as_deref()) {
        Ok(config) => ctx.advisor(&config),
        Err(_) => WorkerAdvisor::new(HostResources::detect(), &ctx.vars),
    };

    let plan = advisor.plan(args.validate);
    let validation = plan.validation.clone();
    print_item(&PlanDisplay(plan), ctx.format);

    if ctx.format != OutputFormat::Json {
        for warning in &validation.warnings {
            print_warning(warning);
        }
        for recommendation in &validation.recommendations {
            println!("  → {}", recommendation);
        }
    }

    Ok(ExitCode::SUCCESS)
}
