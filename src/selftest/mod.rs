//! Bundled self-check suite
//!
//! The engine checking itself with its own declaration surface: single test
//! executions, quiescence, hooks, and whole nested suites run from inside a
//! test.

use anyhow::{ensure, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ExecutionSettings, ExitHandler, SuiteSettingsSpec};
use crate::context::{defer, spawn, ExecutionContext};
use crate::dsl::{suite, SuiteScope};
use crate::executor::{Test, TestFunction, TestOptions};
use crate::models::{TestStatus, TestSuiteResults};

/// Declare and run the self-check suite with `spec`
pub async fn run(spec: SuiteSettingsSpec) -> Result<Option<TestSuiteResults>> {
    suite(spec, |s| async move {
        declare_test_checks(&s);
        declare_hook_checks(&s);
        declare_sanity_checks(&s);
        Ok(())
    })
    .await
}

fn quiet() -> SuiteSettingsSpec {
    SuiteSettingsSpec::new()
        .no_reporters()
        .exit_handler(ExitHandler::Unavailable)
}

fn fast() -> ExecutionSettings {
    ExecutionSettings {
        timeout_ms: 500,
        ..ExecutionSettings::default()
    }
}

fn declare_test_checks(s: &SuiteScope) {
    s.describe("Test", |it| {
        it.it("executes the test function", || async {
            let ran = Arc::new(AtomicBool::new(false));
            let flag = ran.clone();
            let test = Test::new(
                "test",
                TestFunction::new(move || {
                    let flag = flag.clone();
                    async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                }),
                TestOptions::default(),
            );

            test.run(&fast(), "This Test!").await;
            ensure!(ran.load(Ordering::SeqCst), "body did not run");
            Ok(())
        });

        it.it("runs the body in a context of its own", || async {
            let outer = ExecutionContext::current().map(|c| c.id());
            let inner = Arc::new(Mutex::new(None));
            let seen = inner.clone();
            let test = Test::new(
                "test",
                TestFunction::new(move || {
                    let seen = seen.clone();
                    async move {
                        *seen.lock() = ExecutionContext::current().map(|c| c.id());
                        Ok(())
                    }
                }),
                TestOptions::default(),
            );

            test.run(&fast(), "This Test!").await;
            let inner = *inner.lock();
            ensure!(inner.is_some() && inner != outer, "body shared the caller's context");
            Ok(())
        });

        it.it("fails on an error", || async {
            let test = Test::new(
                "test",
                TestFunction::new(|| async { anyhow::bail!("this!") }),
                TestOptions::default(),
            );
            let result = test.run(&fast(), "This Test!").await;
            ensure!(result.status == TestStatus::Fail, "expected failure, got {}", result.status);
            Ok(())
        });

        it.it("fails on a deferred error", || async {
            let test = Test::new(
                "test",
                TestFunction::new(|| async {
                    defer(Duration::from_millis(10), || Err(anyhow::anyhow!("this!")));
                    Ok(())
                }),
                TestOptions::default(),
            );
            let result = test.run(&fast(), "This Test!").await;
            ensure!(result.status == TestStatus::Fail, "expected failure, got {}", result.status);
            ensure!(result.message.starts_with("this!"), "unexpected message: {}", result.message);
            Ok(())
        });

        it.it("fails on a panic in nested deferred work", || async {
            let test = Test::new(
                "test",
                TestFunction::new(|| async {
                    spawn(async {
                        spawn(async {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            explode()
                        });
                        Ok(())
                    });
                    Ok(())
                }),
                TestOptions::default(),
            );
            let result = test.run(&fast(), "This Test!").await;
            ensure!(result.message.contains("deep"), "unexpected message: {}", result.message);
            Ok(())
        });

        it.it("times out a body that never settles", || async {
            let settings = ExecutionSettings {
                timeout_ms: 50,
                ..ExecutionSettings::default()
            };
            let test = Test::new(
                "test",
                TestFunction::new(|| async {
                    futures::future::pending::<()>().await;
                    Ok(())
                }),
                TestOptions::default(),
            );
            let result = test.run(&settings, "This Test!").await;
            ensure!(
                result.message == "Timed out after 50ms without completing",
                "unexpected message: {}",
                result.message
            );
            Ok(())
        });
    });
}

fn explode() -> Result<()> {
    panic!("deep")
}

fn declare_hook_checks(s: &SuiteScope) {
    s.describe("lifecycle hooks", |it| {
        it.it("bracket every test of a nested suite", || async {
            let log = Arc::new(Mutex::new(String::new()));
            let recorded = log.clone();

            suite(quiet(), move |s| async move {
                let log = recorded;
                s.describe("thing under test", |it| {
                    let mark = log.clone();
                    it.before(move || {
                        let mark = mark.clone();
                        async move {
                            mark.lock().push('B');
                            Ok(())
                        }
                    });
                    for name in ["1", "2"] {
                        let mark = log.clone();
                        it.it(name, move || {
                            let mark = mark.clone();
                            async move {
                                mark.lock().push_str(name);
                                Ok(())
                            }
                        });
                    }
                });
                Ok(())
            })
            .await?;

            let log = log.lock().clone();
            ensure!(log == "B1B2", "hooks ran as {log}");
            Ok(())
        });
    });
}

fn declare_sanity_checks(s: &SuiteScope) {
    s.describe("suite", |it| {
        it.it("accepts tests that do nothing", || async {
            let results = suite(quiet(), |s| async move {
                s.describe("thing under test", |it| {
                    it.it("will succeed", || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(())
                    });
                    it.it("will succeed", || async { Ok(()) });
                });
                Ok(())
            })
            .await?
            .ok_or_else(|| anyhow::anyhow!("Received invalid results from suite()"))?;

            ensure!(results.passed(), "should recognize noop success");
            Ok(())
        });

        it.it("rejects a suite whose test fails", || async {
            let results = suite(quiet(), |s| async move {
                s.describe("thing under test", |it| {
                    it.it("will succeed", || async { Ok(()) });
                    it.it("will fail", || async { anyhow::bail!("This is an error") });
                    it.it("will also succeed", || async { Ok(()) });
                });
                Ok(())
            })
            .await?
            .ok_or_else(|| anyhow::anyhow!("Received invalid results from suite()"))?;

            ensure!(!results.passed(), "should not accept a suite with a failing test");
            ensure!(results.failed_count() == 1, "expected exactly one failure");
            Ok(())
        });
    });
}
