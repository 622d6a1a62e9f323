//! Data models for test results
//!
//! Result objects produced by the engine and consumed by reporters.

mod test_result;

pub use test_result::{TestResult, TestStatus, TestSubjectResult, TestSuiteResults};
