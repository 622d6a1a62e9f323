//! Test execution engine
//!
//! Tests, subjects and suites, the lifecycle hooks that bracket each test,
//! and the ordering policy.

mod lifecycle;
mod order;
mod subject;
mod suite;

pub use lifecycle::{hook, Hook, HookRegistry, LifecycleContainer, LifecycleEvent};
pub use order::{fresh_seed, run_order, Mt19937};
pub use subject::TestSubject;
pub use suite::{SuiteState, TestSuite};
pub use test::{Done, RunningTest, Test, TestFunction, TestOptions};

/// Context property holding the suite being declared or run (`TestSuite`)
pub const SUITE_KEY: &str = "settle.suite";
/// Context property holding the subject being declared (`TestSubject`)
pub const SUBJECT_KEY: &str = "settle.subject";
/// Context property present while a test body runs (`RunningTest`)
pub const TEST_KEY: &str = "settle.test";
