//! Utility functions
//!
//! Logging, timing and text helpers.

pub mod logger;
mod text;
mod timer;

pub use text::description_concat;
pub use timer::Timer;
