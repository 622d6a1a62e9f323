//! Test suites
//!
//! A suite owns subjects and drives a full run: reporters are notified at
//! every boundary, subjects run strictly one after another, and the suite
//! can only run once.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::lifecycle::{HookRegistry, LifecycleContainer};
use super::order::fresh_seed;
use super::subject::TestSubject;
use super::test::Test;
use super::SUITE_KEY;
use crate::config::{ExecutionSettings, SuiteSettings, TestOrder};
use crate::context::{ExecutionContext, Properties};
use crate::error::{Result, SettleError};
use crate::models::TestSuiteResults;
use crate::output::Reporters;
use crate::utils::Timer;

static NEXT_SUITE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuiteState {
    /// Accepting subjects and tests
    Declaring,
    Running,
    Finished,
}

pub struct TestSuite {
    id: u64,
    settings: SuiteSettings,
    /// Execution settings as resolved for the current run
    resolved: Mutex<ExecutionSettings>,
    subjects: Mutex<Vec<Arc<TestSubject>>>,
    hooks: HookRegistry,
    state: Mutex<SuiteState>,
    top_level: AtomicBool,
    exit_suppressed: AtomicBool,
}

impl TestSuite {
    pub fn new(settings: SuiteSettings) -> Self {
        Self {
            id: NEXT_SUITE_ID.fetch_add(1, Ordering::Relaxed),
            resolved: Mutex::new(settings.execution.clone()),
            settings,
            subjects: Mutex::new(Vec::new()),
            hooks: HookRegistry::default(),
            state: Mutex::new(SuiteState::Declaring),
            top_level: AtomicBool::new(false),
            exit_suppressed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn settings(&self) -> &SuiteSettings {
        &self.settings
    }

    /// Execution settings as the run sees them: the suite-wide only flag
    /// and the chosen seed are filled in before any reporter hook fires.
    pub fn resolved_settings(&self) -> ExecutionSettings {
        self.resolved.lock().clone()
    }

    pub fn state(&self) -> SuiteState {
        *self.state.lock()
    }

    pub fn is_top_level(&self) -> bool {
        self.top_level.load(Ordering::Relaxed)
    }

    pub fn mark_top_level(&self) {
        self.top_level.store(true, Ordering::Relaxed);
    }

    /// Never exit the process from this suite, whatever its settings say
    pub fn suppress_exit(&self) {
        self.exit_suppressed.store(true, Ordering::Relaxed);
    }

    pub fn add_subject(&self, subject: Arc<TestSubject>) {
        self.subjects.lock().push(subject);
    }

    pub fn subjects(&self) -> Vec<Arc<TestSubject>> {
        self.subjects.lock().clone()
    }

    /// Every test of every subject, in declaration order
    pub fn tests(&self) -> Vec<Arc<Test>> {
        self.subjects().iter().flat_map(|subject| subject.tests()).collect()
    }

    pub fn has_only(&self) -> bool {
        self.subjects().iter().any(|subject| subject.has_only())
    }

    /// Run every subject. Fails if the suite has already run or its
    /// settings are invalid.
    pub async fn run(self: Arc<Self>) -> Result<TestSuiteResults> {
        {
            let mut state = self.state.lock();
            if *state != SuiteState::Declaring {
                return Err(SettleError::SuiteAlreadyRun(self.id));
            }
            if let Err(error) = self.settings.execution.validate() {
                *state = SuiteState::Finished;
                return Err(error);
            }
            *state = SuiteState::Running;
        }

        let mut execution = self.settings.execution.clone();
        execution.only_active = self.has_only();
        if execution.order == TestOrder::Random && execution.order_seed.is_none() {
            let seed = fresh_seed();
            info!(
                "Random test order with seed {}; set order_seed (or SETTLE_SEED) to reproduce",
                seed
            );
            execution.order_seed = Some(seed);
        }
        if execution.only_active {
            info!("Suite contains focused tests; unfocused tests in those subjects are skipped");
        }
        *self.resolved.lock() = execution.clone();

        let reporters = Reporters::new(self.settings.reporting.reporters.clone());
        let properties = Properties::new().with_shared(SUITE_KEY, self.clone());
        let name = format!("suite #{}", self.id);
        let context = match ExecutionContext::current() {
            Some(ambient) => ambient.fork(name, properties),
            None => ExecutionContext::root(name, properties),
        };

        let timer = Timer::start(format!("suite #{}", self.id));
        let subjects = self.subjects();
        info!(suite = self.id, subjects = subjects.len(), "Starting test suite");

        let suite = self.clone();
        let outcome = context
            .run(async {
                reporters.suite_started(&suite).await;
                let mut subject_results = Vec::with_capacity(subjects.len());
                for subject in &subjects {
                    reporters.subject_started(&suite, subject).await;
                    let result = subject.run(&suite, &reporters, &execution).await?;
                    reporters.subject_finished(&suite, subject, &result).await;
                    subject_results.push(result);
                }
                Ok::<_, SettleError>(subject_results)
            })
            .await;

        let subject_results = match outcome {
            Ok(subject_results) => subject_results,
            Err(error) => {
                *self.state.lock() = SuiteState::Finished;
                return Err(error);
            }
        };

        let mut results = TestSuiteResults::new(self.clone(), subject_results);
        results.order_seed = match execution.order {
            TestOrder::Random => execution.order_seed,
            TestOrder::Default => None,
        };
        results.duration_ms = timer.stop();

        context.run(reporters.suite_finished(&self, &results)).await;
        *self.state.lock() = SuiteState::Finished;

        info!(
            suite = self.id,
            passed = results.passed_count(),
            failed = results.failed_count(),
            skipped = results.skipped_count(),
            "Test suite finished in {}ms",
            results.duration_ms
        );
        Ok(results)
    }

    /// Exit with the aggregate outcome when the suite is configured to
    pub fn exit_and_report(&self, results: &TestSuiteResults) {
        let reporting = &self.settings.reporting;
        if !reporting.exit_and_report {
            return;
        }
        if self.exit_suppressed.load(Ordering::Relaxed) {
            warn!(suite = self.id, "exit_and_report ignored for a suite declared inside a running test");
            return;
        }
        reporting.exit_handler.exit(results.exit_code());
    }
}

impl LifecycleContainer for TestSuite {
    fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    fn parent_container(&self) -> Option<Arc<dyn LifecycleContainer>> {
        None
    }
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("subjects", &self.subjects.lock().len())
            .field("top_level", &self.is_top_level())
            .finish()
    }
}
