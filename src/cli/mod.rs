//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use settle::config::TestOrder;

/// Async test engine with quiescence-based completion
#[derive(Parser, Debug)]
#[command(name = "settle")]
#[command(version)]
#[command(about = "Run the bundled self-check suite and inspect settings")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the self-check suite
    Run(RunArgs),

    /// Print the resolved settings
    Settings(SettingsArgs),
}

/// Console output style
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Every subject and test
    #[default]
    Console,
    /// One character per test, then failures
    Dots,
    /// Failing subjects only
    Failures,
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Test order
    #[arg(short, long, value_parser = parse_order)]
    pub order: Option<TestOrder>,

    /// Seed for random order
    #[arg(short, long)]
    pub seed: Option<u32>,

    /// Per-test timeout in milliseconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Console)]
    pub format: OutputFormat,

    /// Also write a JUnit XML report to this path
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Emit Karma-style JSON lines on stdout instead of console output
    #[arg(long)]
    pub karma: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Arguments for settings command
#[derive(Parser, Debug)]
pub struct SettingsArgs {
    /// Output as JSON instead of YAML
    #[arg(long)]
    pub json: bool,

    /// Also list the environment variables that are read
    #[arg(long)]
    pub env: bool,
}

fn parse_order(s: &str) -> Result<TestOrder, String> {
    s.parse().map_err(|e: settle::error::SettleError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = Args::parse_from([
            "settle", "run", "--order", "random", "--seed", "7", "--format", "dots",
        ]);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.order, Some(TestOrder::Random));
                assert_eq!(run.seed, Some(7));
                assert_eq!(run.format, OutputFormat::Dots);
                assert!(!run.karma);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_order() {
        assert!(Args::try_parse_from(["settle", "run", "--order", "sideways"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let args = Args::parse_from(["settle", "settings", "--config", "settle.yaml"]);
        assert_eq!(args.config, Some(PathBuf::from("settle.yaml")));
    }
}
