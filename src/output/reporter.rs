//! Reporter capability
//!
//! Reporters observe a run. Every hook has an empty default, so a reporter
//! implements only what it needs; the engine awaits each hook before moving on.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::executor::{Test, TestSubject, TestSuite};
use crate::models::{TestResult, TestSubjectResult, TestSuiteResults};

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn on_suite_started(&self, _suite: &TestSuite) {}

    async fn on_subject_started(&self, _suite: &TestSuite, _subject: &TestSubject) {}

    async fn on_test_started(&self, _suite: &TestSuite, _subject: &TestSubject, _test: &Test) {}

    async fn on_test_finished(
        &self,
        _suite: &TestSuite,
        _subject: &TestSubject,
        _test: &Test,
        _result: &TestResult,
    ) {
    }

    async fn on_subject_finished(
        &self,
        _suite: &TestSuite,
        _subject: &TestSubject,
        _result: &TestSubjectResult,
    ) {
    }

    async fn on_suite_finished(&self, _suite: &TestSuite, _results: &TestSuiteResults) {}
}

/// Fan-out over the configured reporters, in order
#[derive(Clone, Default)]
pub struct Reporters {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl Reporters {
    pub fn new(reporters: Vec<Arc<dyn Reporter>>) -> Self {
        Self { reporters }
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    pub async fn suite_started(&self, suite: &TestSuite) {
        for reporter in &self.reporters {
            reporter.on_suite_started(suite).await;
        }
    }

    pub async fn subject_started(&self, suite: &TestSuite, subject: &TestSubject) {
        for reporter in &self.reporters {
            reporter.on_subject_started(suite, subject).await;
        }
    }

    pub async fn test_started(&self, suite: &TestSuite, subject: &TestSubject, test: &Test) {
        for reporter in &self.reporters {
            reporter.on_test_started(suite, subject, test).await;
        }
    }

    pub async fn test_finished(
        &self,
        suite: &TestSuite,
        subject: &TestSubject,
        test: &Test,
        result: &TestResult,
    ) {
        for reporter in &self.reporters {
            reporter.on_test_finished(suite, subject, test, result).await;
        }
    }

    pub async fn subject_finished(
        &self,
        suite: &TestSuite,
        subject: &TestSubject,
        result: &TestSubjectResult,
    ) {
        for reporter in &self.reporters {
            reporter.on_subject_finished(suite, subject, result).await;
        }
    }

    pub async fn suite_finished(&self, suite: &TestSuite, results: &TestSuiteResults) {
        for reporter in &self.reporters {
            reporter.on_suite_finished(suite, results).await;
        }
    }
}

impl fmt::Debug for Reporters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporters")
            .field("count", &self.reporters.len())
            .finish()
    }
}
