//! Declaration surface
//!
//! ```ignore
//! suite(SuiteSettingsSpec::new(), |s| async move {
//!     s.describe("Stack", |it| {
//!         it.before(|| async { Ok(()) });
//!         it.it("pops what was pushed", || async { Ok(()) });
//!     });
//!     Ok(())
//! })
//! .await?;
//! ```
//!
//! Which suite a declaration belongs to is decided by the ambient execution
//! context, never a global: a `suite` block declared while another suite is
//! being declared joins it, one declared with no suite around becomes a new
//! top-level suite, and one declared from inside a running test always runs
//! on its own.

use std::future::Future;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::config::{SuiteSettings, SuiteSettingsSpec};
use crate::context::{ExecutionContext, Properties, QuiescenceTracker, Settlement};
use crate::error::SettleError;
use crate::executor::{
    hook, Done, LifecycleContainer, LifecycleEvent, RunningTest, SuiteState, TestFunction,
    TestOptions, TestSubject, TestSuite, SUBJECT_KEY, SUITE_KEY, TEST_KEY,
};
use crate::models::TestSuiteResults;
use crate::utils::description_concat;

/// Declare a suite. Returns the results when this block ran a suite of its
/// own, or `None` when it merged into the suite being declared around it.
pub async fn suite<F, Fut>(spec: SuiteSettingsSpec, builder: F) -> anyhow::Result<Option<TestSuiteResults>>
where
    F: FnOnce(SuiteScope) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let ambient = ExecutionContext::current();
    let running_test = ambient
        .as_ref()
        .and_then(|context| context.property::<RunningTest>(TEST_KEY));
    let enclosing = ambient
        .as_ref()
        .and_then(|context| context.property::<TestSuite>(SUITE_KEY))
        .filter(|suite| suite.state() == SuiteState::Declaring);

    let mut settings = SuiteSettings::resolve(&spec);

    if let Some(test) = &running_test {
        warn!(
            "Suite declared inside running test '{}'; running it in isolation without exit_and_report",
            test.context_name
        );
        settings.execution.isolated = true;
    } else if let Some(enclosing) = enclosing.as_ref().filter(|_| !settings.execution.isolated) {
        debug!(suite = enclosing.id(), "merging nested suite declaration");
        declare(enclosing.clone(), builder).await?;
        return Ok(None);
    }

    let suite = Arc::new(TestSuite::new(settings));
    if running_test.is_some() {
        suite.suppress_exit();
    }
    if enclosing.is_none() && running_test.is_none() {
        suite.mark_top_level();
    }

    declare(suite.clone(), builder).await?;
    let results = suite.clone().run().await?;
    suite.exit_and_report(&results);
    Ok(Some(results))
}

/// Run a declaration block with `suite` ambient and wait for everything it
/// deferred to settle
async fn declare<F, Fut>(suite: Arc<TestSuite>, builder: F) -> anyhow::Result<()>
where
    F: FnOnce(SuiteScope) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let tracker = QuiescenceTracker::new(
        format!("declaring suite #{}", suite.id()),
        Properties::new().with_shared(SUITE_KEY, suite.clone()),
    );
    let body = builder(SuiteScope { suite });

    match tracker.run(body).await {
        Settlement::Stable => Ok(()),
        Settlement::Error(fault) => Err(anyhow::anyhow!(
            "Suite declaration failed: {}",
            fault.describe()
        )),
    }
}

/// Handle to the suite being declared
#[derive(Clone, Debug)]
pub struct SuiteScope {
    suite: Arc<TestSuite>,
}

impl SuiteScope {
    pub fn suite(&self) -> &Arc<TestSuite> {
        &self.suite
    }

    /// Declare a subject; `build` adds its tests and hooks
    pub fn describe<F>(&self, description: impl Into<String>, build: F) -> Arc<TestSubject>
    where
        F: FnOnce(&SubjectScope),
    {
        let parent = Arc::downgrade(&self.suite) as Weak<dyn LifecycleContainer>;
        let subject = Arc::new(TestSubject::with_parent(description, parent));
        self.suite.add_subject(subject.clone());
        build_subject(&self.suite, &subject, build);
        subject
    }

    /// Suite-wide hook, around every test of every subject
    pub fn before<F, Fut>(&self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.suite.add_event_listener(LifecycleEvent::Before, hook(handler));
    }

    pub fn after<F, Fut>(&self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.suite.add_event_listener(LifecycleEvent::After, hook(handler));
    }
}

fn build_subject<F>(suite: &Arc<TestSuite>, subject: &Arc<TestSubject>, build: F)
where
    F: FnOnce(&SubjectScope),
{
    let scope = SubjectScope {
        suite: suite.clone(),
        subject: subject.clone(),
    };
    let properties = Properties::new().with_shared(SUBJECT_KEY, subject.clone());
    let name = format!("declaring '{}'", subject.description());
    let context = match ExecutionContext::current() {
        Some(ambient) => ambient.fork(name, properties),
        None => ExecutionContext::root(name, properties),
    };
    context.enter_sync(|| build(&scope));
}

/// Handle to the subject being declared
#[derive(Clone, Debug)]
pub struct SubjectScope {
    suite: Arc<TestSuite>,
    subject: Arc<TestSubject>,
}

impl SubjectScope {
    pub fn subject(&self) -> &Arc<TestSubject> {
        &self.subject
    }

    pub fn it<F, Fut>(&self, description: impl Into<String>, body: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.it_with(description, TestOptions::default(), body);
    }

    pub fn it_with<F, Fut>(&self, description: impl Into<String>, options: TestOptions, body: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subject
            .add_test(description, TestFunction::new(body), options);
    }

    /// A test that finishes when it calls its [`Done`] handle
    pub fn it_done<F, Fut>(&self, description: impl Into<String>, body: F)
    where
        F: Fn(Done) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subject
            .add_test(description, TestFunction::with_done(body), TestOptions::default());
    }

    /// Nested subject: its description extends this one and its hooks run
    /// inside this subject's hooks
    pub fn describe<F>(&self, description: &str, build: F) -> Arc<TestSubject>
    where
        F: FnOnce(&SubjectScope),
    {
        let parent = Arc::downgrade(&self.subject) as Weak<dyn LifecycleContainer>;
        let subject = Arc::new(TestSubject::with_parent(
            description_concat(self.subject.description(), description),
            parent,
        ));
        self.suite.add_subject(subject.clone());
        build_subject(&self.suite, &subject, build);
        subject
    }

    pub fn before<F, Fut>(&self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subject.add_event_listener(LifecycleEvent::Before, hook(handler));
    }

    pub fn after<F, Fut>(&self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subject.add_event_listener(LifecycleEvent::After, hook(handler));
    }
}

/// Register a `before` hook on the innermost container being declared
pub fn before<F, Fut>(handler: F) -> crate::error::Result<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    ambient_container("before")?.add_event_listener(LifecycleEvent::Before, hook(handler));
    Ok(())
}

/// Register an `after` hook on the innermost container being declared
pub fn after<F, Fut>(handler: F) -> crate::error::Result<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    ambient_container("after")?.add_event_listener(LifecycleEvent::After, hook(handler));
    Ok(())
}

fn ambient_container(operation: &'static str) -> crate::error::Result<Arc<dyn LifecycleContainer>> {
    let context = ExecutionContext::current().ok_or(SettleError::NoAmbientSuite(operation))?;
    if let Some(subject) = context.property::<TestSubject>(SUBJECT_KEY) {
        return Ok(subject);
    }
    match context.property::<TestSuite>(SUITE_KEY) {
        Some(suite) if suite.state() == SuiteState::Declaring => Ok(suite),
        _ => Err(SettleError::NoAmbientSuite(operation)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExitHandler, TestOrder};
    use crate::context::defer;
    use crate::models::TestStatus;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::time::Duration;

    fn quiet() -> SuiteSettingsSpec {
        SuiteSettingsSpec::new()
            .no_reporters()
            .exit_handler(ExitHandler::Unavailable)
    }

    #[tokio::test]
    async fn test_top_level_suite_runs() {
        let results = suite(quiet(), |s| async move {
            s.describe("thing under test", |it| {
                it.it("works", || async { Ok(()) });
                it.it("fails", || async { anyhow::bail!("This is an error") });
            });
            Ok(())
        })
        .await
        .unwrap()
        .unwrap();

        assert!(results.suite.is_top_level());
        let subject = &results.subject_results[0];
        assert_eq!(subject.results[0].status, TestStatus::Pass);
        assert_eq!(subject.results[1].status, TestStatus::Fail);
        assert!(subject.results[1].message.starts_with("This is an error"));
        assert!(!results.passed());
    }

    #[tokio::test]
    async fn test_hooks_bracket_each_test() {
        let log = Arc::new(Mutex::new(String::new()));
        let recorded = log.clone();

        suite(quiet(), move |s| async move {
            let log = recorded;
            s.describe("thing under test", |it| {
                let before = log.clone();
                it.before(move || {
                    let before = before.clone();
                    async move {
                        before.lock().push('B');
                        Ok(())
                    }
                });
                let body = log.clone();
                it.it("one", move || {
                    let body = body.clone();
                    async move {
                        body.lock().push('1');
                        Ok(())
                    }
                });
                let body = log.clone();
                it.it("two", move || {
                    let body = body.clone();
                    async move {
                        body.lock().push('2');
                        Ok(())
                    }
                });
            });
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(log.lock().as_str(), "B1B2");
    }

    #[tokio::test]
    async fn test_nested_declaration_merges() {
        let results = suite(quiet(), |s| async move {
            s.describe("outer", |it| it.it("a", || async { Ok(()) }));
            let merged = suite(quiet(), |inner| async move {
                inner.describe("inner", |it| it.it("b", || async { Ok(()) }));
                Ok(())
            })
            .await?;
            assert!(merged.is_none());
            Ok(())
        })
        .await
        .unwrap()
        .unwrap();

        let names: Vec<_> = results
            .subject_results
            .iter()
            .map(|s| s.description.as_str())
            .collect();
        assert_eq!(names, ["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_isolated_declaration_runs_alone() {
        let results = suite(quiet(), |s| async move {
            s.describe("outer", |it| it.it("a", || async { Ok(()) }));
            let isolated = suite(quiet().isolated(true), |inner| async move {
                inner.describe("inner", |it| it.it("b", || async { Ok(()) }));
                Ok(())
            })
            .await?;
            assert_eq!(isolated.map(|r| r.total()), Some(1));
            Ok(())
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(results.subject_results.len(), 1);
    }

    #[tokio::test]
    async fn test_suite_inside_running_test_is_isolated_without_exit() {
        let exits = Arc::new(AtomicI32::new(-1));
        let inner_total = Arc::new(AtomicUsize::new(0));

        let seen_exit = exits.clone();
        let seen_total = inner_total.clone();
        let results = suite(quiet(), move |s| async move {
            s.describe("outer", move |it| {
                it.it("declares a suite", move || {
                    let seen_exit = seen_exit.clone();
                    let seen_total = seen_total.clone();
                    async move {
                        let handler = ExitHandler::Callback(Arc::new(move |code| {
                            seen_exit.store(code, Ordering::SeqCst)
                        }));
                        let nested = suite(
                            quiet().exit_and_report(true).exit_handler(handler),
                            |inner| async move {
                                inner.describe("inner", |it| {
                                    it.it("x", || async { Ok(()) });
                                    it.it("y", || async { Ok(()) });
                                });
                                Ok(())
                            },
                        )
                        .await?;
                        let nested = nested.ok_or_else(|| anyhow::anyhow!("nested suite did not run"))?;
                        assert!(!nested.suite.is_top_level());
                        seen_total.store(nested.total(), Ordering::SeqCst);
                        Ok(())
                    }
                });
            });
            Ok(())
        })
        .await
        .unwrap()
        .unwrap();

        assert!(results.passed());
        assert_eq!(results.total(), 1);
        assert_eq!(inner_total.load(Ordering::SeqCst), 2);
        assert_eq!(exits.load(Ordering::SeqCst), -1);
    }

    #[tokio::test]
    async fn test_declaration_waits_for_deferred_declarations() {
        let results = suite(quiet(), |s| async move {
            defer(Duration::from_millis(10), move || {
                s.describe("late", |it| it.it("declared later", || async { Ok(()) }));
                Ok(())
            });
            Ok(())
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(results.total(), 1);
    }

    #[tokio::test]
    async fn test_nested_subject_description_and_hooks() {
        let log = Arc::new(Mutex::new(String::new()));
        let recorded = log.clone();

        let results = suite(quiet(), move |s| async move {
            let log = recorded;
            s.describe("Stack", |outer| {
                let mark = log.clone();
                outer.before(move || {
                    let mark = mark.clone();
                    async move {
                        mark.lock().push('O');
                        Ok(())
                    }
                });
                outer.describe("#pop()", |inner| {
                    let mark = log.clone();
                    inner.before(move || {
                        let mark = mark.clone();
                        async move {
                            mark.lock().push('I');
                            Ok(())
                        }
                    });
                    inner.it("returns the top", || async { Ok(()) });
                });
            });
            Ok(())
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(results.subject_results[1].description, "Stack#pop()");
        assert_eq!(log.lock().as_str(), "OI");
    }

    #[tokio::test]
    async fn test_free_hooks_need_an_ambient_container() {
        assert_eq!(
            before(|| async { Ok(()) }),
            Err(SettleError::NoAmbientSuite("before"))
        );

        let attached = Arc::new(AtomicUsize::new(0));
        let counter = attached.clone();
        suite(quiet(), move |s| async move {
            s.describe("ambient", move |it| {
                let counter = counter.clone();
                after(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .expect("subject is ambient");
                it.it("runs", || async { Ok(()) });
            });
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(attached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_random_order_with_seed_is_reproducible() {
        let run = || async {
            suite(quiet().order(TestOrder::Random).order_seed(42), |s| async move {
                s.describe("shuffled", |it| {
                    for i in 0..8 {
                        it.it(format!("t{i}"), || async { Ok(()) });
                    }
                });
                Ok(())
            })
            .await
            .unwrap()
            .unwrap()
        };

        let first = run().await;
        let second = run().await;
        let order = |r: &TestSuiteResults| {
            r.subject_results[0]
                .results
                .iter()
                .map(|t| t.description.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), order(&second));
        assert_eq!(first.order_seed, Some(42));
    }
}
