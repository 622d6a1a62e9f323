//! Test subjects
//!
//! A subject groups tests about one thing and brackets each of them with
//! the `before`/`after` hooks of its container chain.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::lifecycle::{HookRegistry, LifecycleContainer, LifecycleEvent};
use super::order::{fresh_seed, run_order};
use super::suite::TestSuite;
use super::test::{Test, TestFunction, TestOptions};
use crate::config::{ExecutionSettings, TestOrder};
use crate::error::Result;
use crate::models::{TestResult, TestSubjectResult};
use crate::output::Reporters;
use crate::utils::description_concat;

pub struct TestSubject {
    description: String,
    tests: Mutex<Vec<Arc<Test>>>,
    hooks: HookRegistry,
    parent: Option<Weak<dyn LifecycleContainer>>,
}

impl TestSubject {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            tests: Mutex::new(Vec::new()),
            hooks: HookRegistry::default(),
            parent: None,
        }
    }

    /// A subject whose hooks are wrapped by `parent`'s hooks
    pub fn with_parent(description: impl Into<String>, parent: Weak<dyn LifecycleContainer>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new(description)
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Append a test; descriptions need not be unique
    pub fn add_test(
        &self,
        description: impl Into<String>,
        function: TestFunction,
        options: TestOptions,
    ) -> Arc<Test> {
        let test = Arc::new(Test::new(description, function, options));
        self.tests.lock().push(test.clone());
        test
    }

    /// Tests in declaration order
    pub fn tests(&self) -> Vec<Arc<Test>> {
        self.tests.lock().clone()
    }

    pub fn has_only(&self) -> bool {
        self.tests.lock().iter().any(|test| test.options().only)
    }

    /// Run every test in this subject, one at a time
    pub async fn run(
        &self,
        suite: &TestSuite,
        reporters: &Reporters,
        settings: &ExecutionSettings,
    ) -> Result<TestSubjectResult> {
        settings.validate()?;

        let tests = self.tests();
        let selected_only: Vec<bool> = tests.iter().map(|test| test.options().only).collect();
        // focus is suite-wide, but only narrows subjects that hold a focused test
        let only_active = settings.only_active && selected_only.iter().any(|&only| only);

        let seed = match settings.order {
            TestOrder::Default => None,
            TestOrder::Random => Some(settings.order_seed.unwrap_or_else(|| {
                let seed = fresh_seed();
                info!(
                    "Running '{}' in random order with seed {}; pass it as order_seed to reproduce",
                    self.description, seed
                );
                seed
            })),
        };
        let order = run_order(tests.len(), settings.order, seed.unwrap_or_default());
        debug!(subject = %self.description, ?order, "test order");

        let mut results = Vec::with_capacity(tests.len());
        for index in order {
            let test = &tests[index];
            if only_active && !selected_only[index] {
                results.push(TestResult::hidden_skip(test.description()));
                continue;
            }

            reporters.test_started(suite, self, test).await;
            let result = self.run_test(test, settings).await;
            reporters.test_finished(suite, self, test, &result).await;
            results.push(result);
        }

        Ok(TestSubjectResult::new(&self.description, results).with_order_seed(seed))
    }

    /// before → body → after; `after` runs whatever the outcome
    async fn run_test(&self, test: &Test, settings: &ExecutionSettings) -> TestResult {
        let timeout = settings.timeout();
        let context_name = description_concat(&self.description, test.description());

        let mut result = match self.fire_event(LifecycleEvent::Before, timeout).await {
            Ok(()) => test.run(settings, &context_name).await,
            Err(fault) if fault.is_skip() => TestResult::skip(test.description(), 0, fault.describe()),
            Err(fault) => TestResult::fail(
                test.description(),
                0,
                format!("before hook failed: {}", fault.describe()),
            ),
        };

        if let Err(fault) = self.fire_event(LifecycleEvent::After, timeout).await {
            if result.status.is_failure() || fault.is_skip() {
                warn!("after hook for '{}' failed: {}", context_name, fault);
            } else {
                result = TestResult::fail(
                    test.description(),
                    result.duration_ms,
                    format!("after hook failed: {}", fault.describe()),
                );
            }
        }
        result
    }
}

impl LifecycleContainer for TestSubject {
    fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    fn parent_container(&self) -> Option<Arc<dyn LifecycleContainer>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for TestSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSubject")
            .field("description", &self.description)
            .field("tests", &self.tests.lock().len())
            .field("hooks", &self.hooks)
            .finish()
    }
}
