//! Configuration module
//!
//! Execution and reporting settings for a suite run, the partial overrides
//! used to layer them (defaults, host globals, config file, environment,
//! explicit), and the process exit contract.

mod env;
mod file;
mod global;

pub use env::{print_env_help, EnvConfig};
pub use file::find_config_file;
pub use global::{global_settings, install_global_settings};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::SettleError;
use crate::output::Reporter;

/// Default test timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Tests slower than this are highlighted by reporters
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 75;
/// Tests faster than this have their duration omitted from reports
pub const DEFAULT_MINIMUM_REPORTED_DURATION_MS: u64 = 15;

/// Order in which a subject runs its tests
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestOrder {
    /// Declaration order
    #[default]
    Default,
    /// Seeded shuffle
    Random,
}

impl FromStr for TestOrder {
    type Err = SettleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(TestOrder::Default),
            "random" => Ok(TestOrder::Random),
            _ => Err(SettleError::UnsupportedOrder(s.to_string())),
        }
    }
}

impl fmt::Display for TestOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestOrder::Default => write!(f, "default"),
            TestOrder::Random => write!(f, "random"),
        }
    }
}

/// Per-run execution policy. Overrides always produce a new value; the
/// original is never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Per-test deadline in milliseconds
    #[serde(alias = "timeout")]
    pub timeout_ms: u64,
    pub order: TestOrder,
    pub order_seed: Option<u32>,
    /// Run nested suites on their own instead of merging into the enclosing one
    pub isolated: bool,
    pub verbose: bool,
    pub context_name: Option<String>,
    /// Whether any test in the running suite is marked `only`. Set by the suite.
    #[serde(skip)]
    pub only_active: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            order: TestOrder::Default,
            order_seed: None,
            isolated: false,
            verbose: false,
            context_name: None,
            only_active: false,
        }
    }
}

impl ExecutionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), SettleError> {
        if self.timeout_ms == 0 {
            return Err(SettleError::InvalidTimeout);
        }
        Ok(())
    }

    /// Copy with every field present in `overrides` replaced
    pub fn with_overrides(&self, overrides: &ExecutionOverrides) -> Self {
        let mut settings = self.clone();
        if let Some(timeout) = overrides.timeout {
            settings.timeout_ms = timeout;
        }
        if let Some(order) = overrides.order {
            settings.order = order;
        }
        if overrides.order_seed.is_some() {
            settings.order_seed = overrides.order_seed;
        }
        if let Some(isolated) = overrides.isolated {
            settings.isolated = isolated;
        }
        if let Some(verbose) = overrides.verbose {
            settings.verbose = verbose;
        }
        if overrides.context_name.is_some() {
            settings.context_name = overrides.context_name.clone();
        }
        settings
    }

    pub fn with_context_name(&self, context_name: impl Into<String>) -> Self {
        self.with_overrides(&ExecutionOverrides {
            context_name: Some(context_name.into()),
            ..ExecutionOverrides::default()
        })
    }
}

/// Partial execution settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionOverrides {
    pub timeout: Option<u64>,
    pub order: Option<TestOrder>,
    pub order_seed: Option<u32>,
    pub isolated: Option<bool>,
    pub verbose: Option<bool>,
    pub context_name: Option<String>,
}

impl ExecutionOverrides {
    fn overlay(&mut self, other: &ExecutionOverrides) {
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.order.is_some() {
            self.order = other.order;
        }
        if other.order_seed.is_some() {
            self.order_seed = other.order_seed;
        }
        if other.isolated.is_some() {
            self.isolated = other.isolated;
        }
        if other.verbose.is_some() {
            self.verbose = other.verbose;
        }
        if other.context_name.is_some() {
            self.context_name = other.context_name.clone();
        }
    }
}

/// What "exit the process" means for this host
#[derive(Clone, Default)]
pub enum ExitHandler {
    /// `std::process::exit`
    #[default]
    Process,
    /// Host-provided exit capability
    Callback(Arc<dyn Fn(i32) + Send + Sync>),
    /// No exit capability (embedded hosts); the code is only logged
    Unavailable,
}

impl ExitHandler {
    pub fn exit(&self, code: i32) {
        match self {
            ExitHandler::Process => std::process::exit(code),
            ExitHandler::Callback(exit) => exit(code),
            ExitHandler::Unavailable => {
                info!("Test run finished with exit code {} (no process exit available)", code)
            }
        }
    }
}

impl fmt::Debug for ExitHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitHandler::Process => write!(f, "Process"),
            ExitHandler::Callback(_) => write!(f, "Callback"),
            ExitHandler::Unavailable => write!(f, "Unavailable"),
        }
    }
}

/// Per-run reporting policy; read-only while the suite runs
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSettings {
    #[serde(skip)]
    pub reporters: Vec<Arc<dyn Reporter>>,
    /// Exit the process with 0/1 once the top-level suite finishes
    pub exit_and_report: bool,
    #[serde(alias = "slow_threshold")]
    pub slow_threshold_ms: u64,
    #[serde(alias = "minimum_reported_duration")]
    pub minimum_reported_duration_ms: u64,
    #[serde(skip)]
    pub exit_handler: ExitHandler,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            reporters: Vec::new(),
            exit_and_report: false,
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
            minimum_reported_duration_ms: DEFAULT_MINIMUM_REPORTED_DURATION_MS,
            exit_handler: ExitHandler::default(),
        }
    }
}

impl ReportingSettings {
    pub fn with_overrides(&self, overrides: &ReportingOverrides) -> Self {
        let mut settings = self.clone();
        if let Some(reporters) = &overrides.reporters {
            settings.reporters = reporters.clone();
        }
        if let Some(exit_and_report) = overrides.exit_and_report {
            settings.exit_and_report = exit_and_report;
        }
        if let Some(slow) = overrides.slow_threshold {
            settings.slow_threshold_ms = slow;
        }
        if let Some(minimum) = overrides.minimum_reported_duration {
            settings.minimum_reported_duration_ms = minimum;
        }
        if let Some(handler) = &overrides.exit_handler {
            settings.exit_handler = handler.clone();
        }
        settings
    }
}

impl fmt::Debug for ReportingSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportingSettings")
            .field("reporters", &self.reporters.len())
            .field("exit_and_report", &self.exit_and_report)
            .field("slow_threshold_ms", &self.slow_threshold_ms)
            .field(
                "minimum_reported_duration_ms",
                &self.minimum_reported_duration_ms,
            )
            .field("exit_handler", &self.exit_handler)
            .finish()
    }
}

/// Partial reporting settings
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportingOverrides {
    #[serde(skip)]
    pub reporters: Option<Vec<Arc<dyn Reporter>>>,
    pub exit_and_report: Option<bool>,
    pub slow_threshold: Option<u64>,
    pub minimum_reported_duration: Option<u64>,
    #[serde(skip)]
    pub exit_handler: Option<ExitHandler>,
}

impl ReportingOverrides {
    fn overlay(&mut self, other: &ReportingOverrides) {
        if other.reporters.is_some() {
            self.reporters = other.reporters.clone();
        }
        if other.exit_and_report.is_some() {
            self.exit_and_report = other.exit_and_report;
        }
        if other.slow_threshold.is_some() {
            self.slow_threshold = other.slow_threshold;
        }
        if other.minimum_reported_duration.is_some() {
            self.minimum_reported_duration = other.minimum_reported_duration;
        }
        if other.exit_handler.is_some() {
            self.exit_handler = other.exit_handler.clone();
        }
    }
}

impl fmt::Debug for ReportingOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportingOverrides")
            .field("reporters", &self.reporters.as_ref().map(Vec::len))
            .field("exit_and_report", &self.exit_and_report)
            .field("slow_threshold", &self.slow_threshold)
            .field("minimum_reported_duration", &self.minimum_reported_duration)
            .field("exit_handler", &self.exit_handler)
            .finish()
    }
}

/// Resolved settings for one suite
#[derive(Clone, Debug, Default)]
pub struct SuiteSettings {
    pub execution: ExecutionSettings,
    pub reporting: ReportingSettings,
}

impl SuiteSettings {
    /// Defaults, overlaid by installed global settings, overlaid by `spec`
    pub fn resolve(spec: &SuiteSettingsSpec) -> Self {
        let base = match global_settings() {
            Some(global) => SuiteSettings::default().with_overrides(global),
            None => SuiteSettings::default(),
        };
        base.with_overrides(spec)
    }

    pub fn with_overrides(&self, spec: &SuiteSettingsSpec) -> Self {
        Self {
            execution: self.execution.with_overrides(&spec.execution),
            reporting: self.reporting.with_overrides(&spec.reporting),
        }
    }
}

/// Partial settings as written by a caller, a config file, or the environment
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuiteSettingsSpec {
    pub execution: ExecutionOverrides,
    pub reporting: ReportingOverrides,
}

impl SuiteSettingsSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout_ms(mut self, timeout: u64) -> Self {
        self.execution.timeout = Some(timeout);
        self
    }

    pub fn order(mut self, order: TestOrder) -> Self {
        self.execution.order = Some(order);
        self
    }

    pub fn order_seed(mut self, seed: u32) -> Self {
        self.execution.order_seed = Some(seed);
        self
    }

    pub fn isolated(mut self, isolated: bool) -> Self {
        self.execution.isolated = Some(isolated);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.execution.verbose = Some(verbose);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporting
            .reporters
            .get_or_insert_with(Vec::new)
            .push(reporter);
        self
    }

    pub fn no_reporters(mut self) -> Self {
        self.reporting.reporters = Some(Vec::new());
        self
    }

    pub fn exit_and_report(mut self, exit: bool) -> Self {
        self.reporting.exit_and_report = Some(exit);
        self
    }

    pub fn exit_handler(mut self, handler: ExitHandler) -> Self {
        self.reporting.exit_handler = Some(handler);
        self
    }

    /// Layer `other` on top of `self`
    pub fn merge(mut self, other: &SuiteSettingsSpec) -> Self {
        self.execution.overlay(&other.execution);
        self.reporting.overlay(&other.reporting);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = SuiteSettings::default();
        assert_eq!(settings.execution.timeout_ms, 10_000);
        assert_eq!(settings.execution.order, TestOrder::Default);
        assert_eq!(settings.reporting.slow_threshold_ms, 75);
        assert_eq!(settings.reporting.minimum_reported_duration_ms, 15);
        assert!(!settings.reporting.exit_and_report);
    }

    #[test]
    fn test_order_from_str() {
        assert_eq!("random".parse::<TestOrder>(), Ok(TestOrder::Random));
        assert_eq!("DEFAULT".parse::<TestOrder>(), Ok(TestOrder::Default));
        assert_eq!(
            "alphabetical".parse::<TestOrder>(),
            Err(SettleError::UnsupportedOrder("alphabetical".to_string()))
        );
    }

    #[test]
    fn test_overrides_do_not_mutate_original() {
        let original = ExecutionSettings::default();
        let named = original.with_context_name("thing under test works");

        assert_eq!(named.context_name.as_deref(), Some("thing under test works"));
        assert!(original.context_name.is_none());
        assert_eq!(named.timeout_ms, original.timeout_ms);
    }

    #[test]
    fn test_spec_merge_prefers_later_layer() {
        let file = SuiteSettingsSpec::new().timeout_ms(500).order(TestOrder::Random);
        let explicit = SuiteSettingsSpec::new().timeout_ms(50);
        let merged = file.merge(&explicit);

        let settings = SuiteSettings::default().with_overrides(&merged);
        assert_eq!(settings.execution.timeout_ms, 50);
        assert_eq!(settings.execution.order, TestOrder::Random);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let settings = ExecutionSettings {
            timeout_ms: 0,
            ..ExecutionSettings::default()
        };
        assert_eq!(settings.validate(), Err(SettleError::InvalidTimeout));
    }

    #[test]
    fn test_unknown_order_fails_to_parse() {
        let parsed: Result<SuiteSettingsSpec, _> =
            serde_json::from_str(r#"{"execution": {"order": "sideways"}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_exit_callback() {
        let code = Arc::new(std::sync::atomic::AtomicI32::new(-1));
        let seen = code.clone();
        let handler = ExitHandler::Callback(Arc::new(move |c| {
            seen.store(c, std::sync::atomic::Ordering::SeqCst)
        }));

        handler.exit(1);
        assert_eq!(code.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
