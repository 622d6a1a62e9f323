//! settle - embeddable async test engine
//!
//! Runs tests to quiescence: a test is finished when its body and every
//! piece of work it scheduled have finished, or when any of that work fails.
//!
//! ## Usage
//!
//! ```bash
//! # Run the self-check suite
//! settle run
//!
//! # Shuffle with a fixed seed and print dots
//! settle run --order random --seed 42 --format dots
//!
//! # Write a JUnit report as well
//! settle run --junit test-results.xml
//!
//! # Show the resolved settings
//! settle settings --env
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use settle::config::{
    print_env_help, EnvConfig, ExecutionSettings, ExitHandler, ReportingSettings, SuiteSettings,
    SuiteSettingsSpec,
};
use settle::output::{
    ConsoleReporter, ConsoleView, DotsReporter, JUnitXmlReporter, JsonLinesSink, KarmaReporter,
    Reporter, Terminal,
};
use settle::selftest;
use settle::utils::logger::init_logger;

mod cli;

use cli::{Args, Command, OutputFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(args.verbose);

    match args.command {
        Command::Run(run_args) => {
            run_self_check(args.config.as_deref(), run_args, args.verbose).await?;
        }
        Command::Settings(settings_args) => {
            show_settings(args.config.as_deref(), settings_args)?;
        }
    }

    Ok(())
}

/// Config file, overlaid by environment variables
fn layered_spec(config: Option<&Path>) -> Result<SuiteSettingsSpec> {
    let env = EnvConfig::load().context("Invalid SETTLE_* environment variable")?;
    let path = config
        .map(Path::to_path_buf)
        .or_else(|| env.config_file.as_ref().map(PathBuf::from));

    let file = match path {
        Some(path) => SuiteSettingsSpec::load(&path)?,
        None => SuiteSettingsSpec::load_default()?,
    };
    let env_layer = env.overrides();
    Ok(file.merge(&env_layer))
}

async fn run_self_check(config: Option<&Path>, args: cli::RunArgs, verbose: bool) -> Result<()> {
    let mut spec = layered_spec(config)?;

    if let Some(timeout) = args.timeout {
        spec = spec.timeout_ms(timeout);
    }
    if let Some(order) = args.order {
        spec = spec.order(order);
    }
    if let Some(seed) = args.seed {
        spec = spec.order_seed(seed);
    }
    if verbose {
        spec = spec.verbose(true);
    }

    let colorize = !args.no_color;
    let primary: Arc<dyn Reporter> = if args.karma {
        Arc::new(KarmaReporter::new(Arc::new(JsonLinesSink::new(
            Terminal::stdout(),
        ))))
    } else {
        match args.format {
            OutputFormat::Console => console(ConsoleView::Full, colorize),
            OutputFormat::Failures => console(ConsoleView::FailuresOnly, colorize),
            OutputFormat::Dots => {
                let dots = DotsReporter::new();
                Arc::new(if colorize { dots } else { dots.no_color() })
            }
        }
    };
    spec = spec.reporter(primary);
    if let Some(path) = args.junit {
        spec = spec.reporter(Arc::new(JUnitXmlReporter::new(path)));
    }
    if spec.reporting.exit_and_report.is_none() {
        spec = spec.exit_and_report(true);
    }
    spec = spec.exit_handler(ExitHandler::Process);

    info!("Running self-check suite");
    let results = selftest::run(spec).await?;

    // only reached when exit_and_report is off
    if let Some(results) = results {
        info!(
            "Self-check finished: {} passed, {} failed, {} skipped",
            results.passed_count(),
            results.failed_count(),
            results.skipped_count()
        );
        if !results.passed() {
            std::process::exit(results.exit_code());
        }
    }
    Ok(())
}

fn console(view: ConsoleView, colorize: bool) -> Arc<dyn Reporter> {
    let reporter = ConsoleReporter::new(view);
    Arc::new(if colorize {
        reporter
    } else {
        reporter.no_color()
    })
}

#[derive(Serialize)]
struct ResolvedSettings<'a> {
    execution: &'a ExecutionSettings,
    reporting: &'a ReportingSettings,
}

fn show_settings(config: Option<&Path>, args: cli::SettingsArgs) -> Result<()> {
    let settings = SuiteSettings::resolve(&layered_spec(config)?);
    let resolved = ResolvedSettings {
        execution: &settings.execution,
        reporting: &settings.reporting,
    };

    let rendered = if args.json {
        serde_json::to_string_pretty(&resolved)?
    } else {
        serde_yaml::to_string(&resolved)?
    };
    println!("{rendered}");

    if args.env {
        println!();
        print_env_help();
    }
    Ok(())
}
