//! bddkit CLI - Main Entry Point
//!
//! Runs the BDD browser suite, retries failed scenarios, and reports on
//! worker planning and environment configuration.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bddkit_e2e::config::resolve_env_name;
use bddkit_e2e::{ConfigLoader, EnvVars};

mod commands;
mod output;

use commands::{config, failures, retry, run, workers, Context};

/// bddkit - retry orchestration for BDD browser suites
#[derive(Parser)]
#[command(name = "bddkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding base.json and <env>.json
    #[arg(long, default_value = "config", global = true)]
    config_dir: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole suite
    Run(run::RunArgs),

    /// Re-run only the scenarios that failed in the last report
    Retry(retry::RetryArgs),

    /// Show the recommended parallel worker count
    Workers(workers::WorkersArgs),

    /// Show the merged configuration for an environment
    Config(config::ConfigArgs),

    /// Inspect or clear the failed-test registry
    #[command(subcommand)]
    Failures(failures::FailuresCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let vars = EnvVars::from_process();

    init_logging(cli.verbose, &cli.config_dir, &vars);

    let ctx = Context::new(cli.config_dir, cli.format, vars);

    let result = match cli.command {
        Commands::Run(args) => run::execute(args, &ctx).await,
        Commands::Retry(args) => retry::execute(args, &ctx).await,
        Commands::Workers(args) => workers::execute(args, &ctx).await,
        Commands::Config(args) => config::execute(args, &ctx).await,
        Commands::Failures(cmd) => failures::execute(cmd, &ctx).await,
    };

    match result {
        Ok(code) => Ok(code),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            Ok(ExitCode::from(2))
        }
    }
}

/// `-v` forces debug; otherwise `RUST_LOG`, then the default environment's
/// `logging.level`, then info.
fn init_logging(verbose: bool, config_dir: &Path, vars: &EnvVars) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = ConfigLoader::new(config_dir)
                .load(&resolve_env_name(None, vars))
                .map(|config| config.logging.level)
                .unwrap_or_else(|_| "info".to_string());
            EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"))
        })
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overridable_settings_have_no_env_fallback() {
        // RETRY_COUNT, RETRY_DELAY and FAIL_FAST go through the config
        // overrides, which ignore unparseable values with a warning.
        let cli = Cli::command();
        for (command, flag) in [("retry", "max_retries"), ("retry", "delay"), ("run", "fail_fast")] {
            let arg = cli
                .find_subcommand(command)
                .and_then(|sub| sub.get_arguments().find(|a| a.get_id() == flag))
                .unwrap();
            assert!(arg.get_env().is_none(), "{} --{} reads the environment", command, flag);
        }
    }

    #[test]
    fn test_parse_retry_flags() {
        let cli = Cli::try_parse_from([
            "bddkit",
            "retry",
            "--env",
            "staging",
            "--max-retries",
            "3",
            "--delay",
            "10",
            "--report",
            "out/report.json",
            "--clear",
            "--stats-only",
        ])
        .unwrap();

        match cli.command {
            Commands::Retry(args) => {
                assert_eq!(args.env.as_deref(), Some("staging"));
                assert_eq!(args.max_retries, Some(3));
                assert_eq!(args.delay, Some(10));
                assert_eq!(args.report, Some(PathBuf::from("out/report.json")));
                assert!(args.clear);
                assert!(args.stats_only);
            }
            _ => panic!("expected retry command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bddkit", "workers", "--validate", "10", "--format", "json"]).unwrap();
        assert_eq!(cli.format, output::OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Workers(ref a) if a.validate == Some(10)));
    }

    #[test]
    fn test_failures_subcommands() {
        let cli = Cli::try_parse_from(["bddkit", "failures", "clear", "-e", "prod"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Failures(failures::FailuresCommands::Clear { env: Some(ref e) }) if e == "prod"
        ));
    }
}
