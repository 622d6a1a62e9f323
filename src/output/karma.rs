//! Karma bridge
//!
//! Translates reporter hooks into the calls a Karma-style runner expects:
//! `info` with the test count, one `result` per finished test, and
//! `complete` at the end. Where those calls go is up to the [`KarmaSink`];
//! [`JsonLinesSink`] writes them as JSON lines.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::reporter::Reporter;
use super::Terminal;
use crate::config::{install_global_settings, SuiteSettingsSpec};
use crate::executor::{Test, TestSubject, TestSuite};
use crate::models::{TestResult, TestStatus, TestSuiteResults};

/// One finished test, in the shape Karma expects
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KarmaResult {
    pub description: String,
    pub suite: Vec<String>,
    pub success: bool,
    pub skipped: bool,
    pub log: Vec<String>,
    pub time: u64,
}

/// Receiver of Karma calls
pub trait KarmaSink: Send + Sync {
    fn info(&self, info: Value);
    fn result(&self, result: &KarmaResult);
    fn complete(&self, coverage: Value);
    fn error(&self, message: &str);
}

/// Writes each call as a `{"type": ..., "payload": ...}` line
pub struct JsonLinesSink {
    terminal: Terminal,
}

impl JsonLinesSink {
    pub fn new(terminal: Terminal) -> Self {
        Self { terminal }
    }

    fn emit(&self, kind: &str, payload: Value) {
        let line = json!({ "type": kind, "payload": payload });
        self.terminal.write(&format!("{line}\n"));
    }
}

impl KarmaSink for JsonLinesSink {
    fn info(&self, info: Value) {
        self.emit("info", info);
    }

    fn result(&self, result: &KarmaResult) {
        let payload = serde_json::to_value(result).unwrap_or(Value::Null);
        self.emit("result", payload);
    }

    fn complete(&self, coverage: Value) {
        self.emit("complete", coverage);
    }

    fn error(&self, message: &str) {
        self.emit("error", Value::String(message.to_string()));
    }
}

pub struct KarmaReporter {
    sink: Arc<dyn KarmaSink>,
}

impl KarmaReporter {
    pub fn new(sink: Arc<dyn KarmaSink>) -> Self {
        Self { sink }
    }

    /// Install process-wide settings that report every suite to `sink` and
    /// never exit the process
    pub fn install(sink: Arc<dyn KarmaSink>) -> bool {
        info!("Bootstrapping Karma bridge");
        let spec = SuiteSettingsSpec::new()
            .exit_and_report(false)
            .reporter(Arc::new(KarmaReporter::new(sink.clone())));
        let installed = install_global_settings(spec);
        if !installed {
            sink.error("Global suite settings were already installed; Karma reporting is inactive");
        }
        installed
    }
}

#[async_trait]
impl Reporter for KarmaReporter {
    async fn on_suite_started(&self, suite: &TestSuite) {
        let total = suite.tests().len();
        debug!(
            "Karma: suite started with {} tests over {} subjects",
            total,
            suite.subjects().len()
        );
        self.sink.info(json!({ "total": total }));
    }

    async fn on_subject_started(&self, _suite: &TestSuite, subject: &TestSubject) {
        debug!("Karma: subject '{}' started", subject.description());
    }

    async fn on_test_started(&self, _suite: &TestSuite, _subject: &TestSubject, test: &Test) {
        debug!("Karma: test '{}' started", test.description());
    }

    async fn on_test_finished(
        &self,
        _suite: &TestSuite,
        subject: &TestSubject,
        test: &Test,
        result: &TestResult,
    ) {
        let log = match result.status {
            TestStatus::Fail => vec![result.message.clone()],
            _ => Vec::new(),
        };
        self.sink.result(&KarmaResult {
            description: test.description().to_string(),
            suite: vec![subject.description().to_string()],
            success: result.status.is_success(),
            skipped: result.is_skipped(),
            log,
            time: result.duration_ms,
        });
    }

    async fn on_suite_finished(&self, _suite: &TestSuite, results: &TestSuiteResults) {
        debug!(
            "Karma: suite finished: {}",
            if results.passed() { "passed" } else { "failed" }
        );
        self.sink.complete(json!({}));
    }
}
