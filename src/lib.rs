//! settle - embeddable async test engine
//!
//! Tests are declared through the [`dsl`] surface, grouped into subjects and
//! suites, and run to quiescence: a test finishes once its body and all the
//! work it spawned or deferred have finished, or as soon as any of it fails.

pub mod config;
pub mod context;
pub mod dsl;
pub mod error;
pub mod executor;
pub mod models;
pub mod output;
pub mod selftest;
pub mod utils;

pub use config::{SuiteSettingsSpec, TestOrder};
pub use context::{defer, skip, spawn};
pub use dsl::{after, before, suite, SubjectScope, SuiteScope};
pub use error::{Result, SettleError};
pub use models::{TestResult, TestStatus, TestSuiteResults};
