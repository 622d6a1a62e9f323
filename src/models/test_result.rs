//! Result models
//!
//! Outcomes of tests, subjects and suites.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::executor::TestSuite;

/// Outcome of one test
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
            TestStatus::Skip => "○",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Pass)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Fail)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Skip => write!(f, "SKIP"),
        }
    }
}

/// Result of a single test execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub description: String,
    pub status: TestStatus,
    pub message: String,
    /// Suppressed by only-filtering; reporters omit hidden results
    pub hidden: bool,
    pub duration_ms: u64,
}

impl TestResult {
    pub fn pass(description: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            description: description.into(),
            status: TestStatus::Pass,
            message: "Success".to_string(),
            hidden: false,
            duration_ms,
        }
    }

    pub fn fail(description: impl Into<String>, duration_ms: u64, message: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TestStatus::Fail,
            message: message.into(),
            hidden: false,
            duration_ms,
        }
    }

    pub fn skip(description: impl Into<String>, duration_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: TestStatus::Skip,
            message: reason.into(),
            hidden: false,
            duration_ms,
        }
    }

    /// Skip synthesized for tests suppressed by an `only` sibling
    pub fn hidden_skip(description: impl Into<String>) -> Self {
        Self {
            hidden: true,
            ..Self::skip(description, 0, "Not selected by only")
        }
    }

    pub fn passed(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_skipped(&self) -> bool {
        self.status == TestStatus::Skip
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status.symbol(),
            self.description,
            self.duration_ms
        )?;
        if self.status.is_failure() {
            write!(f, " - {}", self.message)?;
        }
        Ok(())
    }
}

/// Outcome of one subject, in executed order
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestSubjectResult {
    pub description: String,
    pub results: Vec<TestResult>,
    /// Seed used when the subject ran in random order
    pub order_seed: Option<u32>,
}

impl TestSubjectResult {
    pub fn new(description: impl Into<String>, results: Vec<TestResult>) -> Self {
        Self {
            description: description.into(),
            results,
            order_seed: None,
        }
    }

    pub fn with_order_seed(mut self, seed: Option<u32>) -> Self {
        self.order_seed = seed;
        self
    }

    /// Passed iff no non-skipped test failed
    pub fn passed(&self) -> bool {
        !self.results.iter().any(|r| r.status.is_failure())
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.results.iter().map(|r| r.duration_ms).sum()
    }
}

/// Final report of a suite run
#[derive(Clone, Debug, Serialize)]
pub struct TestSuiteResults {
    #[serde(skip)]
    pub suite: Arc<TestSuite>,
    pub subject_results: Vec<TestSubjectResult>,
    /// Seed shared by every subject when the suite ran in random order
    pub order_seed: Option<u32>,
    pub duration_ms: u64,
}

impl TestSuiteResults {
    pub fn new(suite: Arc<TestSuite>, subject_results: Vec<TestSubjectResult>) -> Self {
        Self {
            suite,
            subject_results,
            order_seed: None,
            duration_ms: 0,
        }
    }

    /// Passed iff every subject passed
    pub fn passed(&self) -> bool {
        self.subject_results.iter().all(|s| s.passed())
    }

    pub fn tests(&self) -> impl Iterator<Item = (&TestSubjectResult, &TestResult)> {
        self.subject_results
            .iter()
            .flat_map(|s| s.results.iter().map(move |r| (s, r)))
    }

    pub fn total(&self) -> usize {
        self.subject_results.iter().map(|s| s.results.len()).sum()
    }

    pub fn passed_count(&self) -> usize {
        self.count(TestStatus::Pass)
    }

    pub fn failed_count(&self) -> usize {
        self.count(TestStatus::Fail)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(TestStatus::Skip)
    }

    fn count(&self, status: TestStatus) -> usize {
        self.subject_results.iter().map(|s| s.count(status)).sum()
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for TestSuiteResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for subject in &self.subject_results {
            writeln!(f, "{}", subject.description)?;
            for result in &subject.results {
                if !result.hidden {
                    writeln!(f, "  {result}")?;
                }
            }
        }
        write!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {}",
            self.total(),
            self.passed_count(),
            self.failed_count(),
            self.skipped_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuiteSettings;

    fn suite_results(subjects: Vec<TestSubjectResult>) -> TestSuiteResults {
        TestSuiteResults::new(Arc::new(TestSuite::new(SuiteSettings::default())), subjects)
    }

    #[test]
    fn test_result_creation() {
        let result = TestResult::pass("adds numbers", 12);
        assert!(result.status.is_success());
        assert_eq!(result.message, "Success");
        assert_eq!(result.duration_ms, 12);
    }

    #[test]
    fn test_hidden_skip() {
        let result = TestResult::hidden_skip("not selected");
        assert!(result.hidden);
        assert!(result.is_skipped());
    }

    #[test]
    fn test_skips_do_not_fail_a_subject() {
        let subject = TestSubjectResult::new(
            "parser",
            vec![
                TestResult::pass("parses", 1),
                TestResult::skip("unicode", 0, "later"),
                TestResult::hidden_skip("other"),
            ],
        );
        assert!(subject.passed());
        assert_eq!(subject.count(TestStatus::Skip), 2);
    }

    #[test]
    fn test_suite_passed_aggregation() {
        let good = TestSubjectResult::new("a", vec![TestResult::pass("one", 1)]);
        let bad = TestSubjectResult::new(
            "b",
            vec![
                TestResult::pass("one", 1),
                TestResult::fail("two", 3, "This is an error"),
            ],
        );

        assert!(suite_results(vec![good.clone()]).passed());

        let results = suite_results(vec![good, bad]);
        assert!(!results.passed());
        assert_eq!(results.total(), 3);
        assert_eq!(results.failed_count(), 1);
        assert_eq!(results.exit_code(), 1);
        assert!(suite_results(vec![]).passed());
    }

    #[test]
    fn test_serializes_status_lowercase() {
        let json = serde_json::to_value(TestResult::fail("x", 1, "boom")).unwrap();
        assert_eq!(json["status"], "fail");
    }
}
