//! Environment variable configuration
//!
//! Provides environment variable overrides for suite settings. A variable
//! that is set but cannot be parsed is an error naming the variable.

use std::env;
use std::str::FromStr;

use super::{ExecutionOverrides, ReportingOverrides, SuiteSettingsSpec, TestOrder};
use crate::error::{Result, SettleError};

/// Environment variable prefix
const ENV_PREFIX: &str = "SETTLE";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Test timeout in milliseconds from SETTLE_TIMEOUT
    pub timeout: Option<u64>,
    /// Test order from SETTLE_ORDER
    pub order: Option<TestOrder>,
    /// Order seed from SETTLE_SEED
    pub seed: Option<u32>,
    /// Isolation from SETTLE_ISOLATED
    pub isolated: Option<bool>,
    /// Verbose from SETTLE_VERBOSE
    pub verbose: Option<bool>,
    /// Exit-and-report from SETTLE_EXIT
    pub exit_and_report: Option<bool>,
    /// Slow threshold in milliseconds from SETTLE_SLOW
    pub slow_threshold: Option<u64>,
    /// Config file from SETTLE_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load through `lookup`, which receives full variable names
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(&var_name(name));
        Ok(Self {
            timeout: parse(&get, "TIMEOUT")?,
            order: parse_order(get("ORDER"))?,
            seed: parse(&get, "SEED")?,
            isolated: parse_bool(&get, "ISOLATED")?,
            verbose: parse_bool(&get, "VERBOSE")?,
            exit_and_report: parse_bool(&get, "EXIT")?,
            slow_threshold: parse(&get, "SLOW")?,
            config_file: get("CONFIG"),
        })
    }

    /// Convert to a settings layer
    pub fn overrides(&self) -> SuiteSettingsSpec {
        SuiteSettingsSpec {
            execution: ExecutionOverrides {
                timeout: self.timeout,
                order: self.order,
                order_seed: self.seed,
                isolated: self.isolated,
                verbose: self.verbose,
                context_name: None,
            },
            reporting: ReportingOverrides {
                exit_and_report: self.exit_and_report,
                slow_threshold: self.slow_threshold,
                ..ReportingOverrides::default()
            },
        }
    }
}

fn var_name(name: &str) -> String {
    format!("{ENV_PREFIX}_{name}")
}

fn invalid(name: &str, value: &str) -> SettleError {
    SettleError::InvalidEnv {
        name: var_name(name),
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    get(name)
        .map(|value| value.trim().parse().map_err(|_| invalid(name, &value)))
        .transpose()
}

fn parse_order(value: Option<String>) -> Result<Option<TestOrder>> {
    value.map(|value| value.parse::<TestOrder>()).transpose()
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<bool>> {
    get(name)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "enabled" => Ok(true),
            "0" | "false" | "no" | "off" | "disabled" => Ok(false),
            _ => Err(invalid(name, &value)),
        })
        .transpose()
}

/// Print all SETTLE environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_TIMEOUT     Per-test timeout in milliseconds");
    println!("  {ENV_PREFIX}_ORDER       Test order (default, random)");
    println!("  {ENV_PREFIX}_SEED        Seed for random order");
    println!("  {ENV_PREFIX}_ISOLATED    Run nested suites in isolation (true/false)");
    println!("  {ENV_PREFIX}_VERBOSE     Log every test as it runs (true/false)");
    println!("  {ENV_PREFIX}_EXIT        Exit the process after the run (true/false)");
    println!("  {ENV_PREFIX}_SLOW        Slow test threshold in milliseconds");
    println!("  {ENV_PREFIX}_CONFIG      Path to configuration file");
    println!("  {ENV_PREFIX}_LOG         Log filter directive (e.g. settle=debug)");
}
