//! JUnit XML reporter
//!
//! Writes one `<testsuite>` per subject and one `<testcase>` per test once
//! the suite finishes. Hidden results are left out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite as JUnitSuite};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use super::reporter::Reporter;
use crate::executor::TestSuite;
use crate::models::{TestResult, TestStatus, TestSuiteResults};

/// Default report file, relative to the working directory
pub const DEFAULT_JUNIT_PATH: &str = "test-results.xml";

pub struct JUnitXmlReporter {
    path: PathBuf,
}

impl JUnitXmlReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build the report; counts are derived from the cases
    pub fn report(results: &TestSuiteResults) -> Report {
        let timestamp = Utc::now();
        let mut report = Report::new("settle");
        report
            .set_timestamp(timestamp)
            .set_time(Duration::from_millis(results.duration_ms));

        for subject in &results.subject_results {
            let mut suite = JUnitSuite::new(subject.description.as_str());
            suite
                .set_timestamp(timestamp)
                .set_time(Duration::from_millis(subject.total_duration_ms()));
            for result in subject.results.iter().filter(|r| !r.hidden) {
                let mut case = TestCase::new(result.description.as_str(), status(result));
                case.set_classname(subject.description.as_str())
                    .set_time(Duration::from_millis(result.duration_ms));
                suite.add_test_case(case);
            }
            report.add_test_suite(suite);
        }
        report
    }

    /// Render the report document
    pub fn render(results: &TestSuiteResults) -> Result<String> {
        let mut xml = Vec::new();
        Self::report(results)
            .serialize(&mut xml)
            .context("Failed to serialize JUnit report")?;
        String::from_utf8(xml).context("JUnit report is not UTF-8")
    }

    pub fn write(&self, results: &TestSuiteResults) -> Result<()> {
        std::fs::write(&self.path, Self::render(results)?)
            .with_context(|| format!("Failed to write JUnit report: {}", self.path.display()))?;
        info!("JUnit report written to {}", self.path.display());
        Ok(())
    }
}

impl Default for JUnitXmlReporter {
    fn default() -> Self {
        Self::new(DEFAULT_JUNIT_PATH)
    }
}

#[async_trait]
impl Reporter for JUnitXmlReporter {
    async fn on_suite_finished(&self, _suite: &TestSuite, results: &TestSuiteResults) {
        if let Err(e) = self.write(results) {
            error!("{:#}", e);
        }
    }
}

fn status(result: &TestResult) -> TestCaseStatus {
    match result.status {
        TestStatus::Pass => TestCaseStatus::success(),
        TestStatus::Skip => {
            let mut status = TestCaseStatus::skipped();
            if !result.message.is_empty() {
                status.set_message(result.message.as_str());
            }
            status
        }
        TestStatus::Fail => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
            status.set_message(result.message.as_str());
            status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuiteSettings;
    use crate::models::{TestResult, TestSubjectResult};
    use std::sync::Arc;

    fn sample() -> TestSuiteResults {
        TestSuiteResults::new(
            Arc::new(TestSuite::new(SuiteSettings::default())),
            vec![
                TestSubjectResult::new(
                    "Stack",
                    vec![
                        TestResult::pass("pushes", 1500),
                        TestResult::fail("pops <empty>", 2, "expected \"None\""),
                        TestResult::skip("peeks", 0, "later"),
                        TestResult::hidden_skip("hidden"),
                    ],
                ),
                TestSubjectResult::new("Queue", vec![TestResult::pass("enqueues", 0)]),
            ],
        )
    }

    #[test]
    fn test_render() {
        let xml = JUnitXmlReporter::render(&sample()).unwrap();

        assert!(xml.starts_with("<?xml"));
        assert_eq!(xml.matches("<testsuite ").count(), 2);
        assert_eq!(xml.matches("<testcase ").count(), 4);
        assert!(xml.contains("name=\"pushes\""));
        assert!(xml.contains("time=\"1.500\""));
        assert!(xml.contains("classname=\"Stack\""));
        assert!(xml.contains("name=\"pops &lt;empty&gt;\""));
        assert!(xml.contains("message=\"expected &quot;None&quot;\""));
        assert_eq!(xml.matches("<failure").count(), 1);
        assert_eq!(xml.matches("<skipped").count(), 1);
        assert!(!xml.contains("hidden"));
    }

    #[test]
    fn test_report_counts() {
        let report = JUnitXmlReporter::report(&sample());

        assert_eq!(report.test_suites.len(), 2);
        assert_eq!(report.tests, 4);
        assert_eq!(report.failures, 1);
        assert_eq!(report.test_suites[0].test_cases.len(), 3);
    }

    #[test]
    fn test_control_characters_are_dropped() {
        let results = TestSuiteResults::new(
            Arc::new(TestSuite::new(SuiteSettings::default())),
            vec![TestSubjectResult::new(
                "Colors",
                vec![TestResult::fail("red", 0, "\u{1b}[31mboom\u{1b}[0m")],
            )],
        );

        let xml = JUnitXmlReporter::render(&results).unwrap();
        assert!(!xml.contains('\u{1b}'));
        assert!(xml.contains("boom"));
    }

    #[test]
    fn test_write_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = JUnitXmlReporter::new(dir.path().join("results.xml"));

        reporter.write(&sample()).unwrap();

        let written = std::fs::read_to_string(reporter.path()).unwrap();
        assert!(written.starts_with("<?xml"));
        assert!(written.trim_end().ends_with("</testsuites>"));
    }
}
