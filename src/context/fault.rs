//! Faults raised inside an execution context
//!
//! A fault is anything that escapes tracked work: a returned error, a panic,
//! or the intentional skip signal.

use std::any::Any;
use std::fmt;
use thiserror::Error;

const INDENT: &str = "     ";

/// Sentinel raised by a test body to abort early and be recorded as skipped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Skipped: {reason}")]
pub struct SkipSignal {
    reason: String,
}

impl SkipSignal {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Build the skip signal as an error, for `return Err(skip("..."))` in test bodies
pub fn skip(reason: impl Into<String>) -> anyhow::Error {
    SkipSignal::new(reason).into()
}

/// A failure that escaped tracked work
#[derive(Debug)]
pub enum Fault {
    /// Work returned an error
    Error(anyhow::Error),
    /// Work panicked
    Panic { message: String },
    /// Work raised [`SkipSignal`], either returned or via `panic_any`
    Skip(SkipSignal),
}

impl Fault {
    pub fn from_error(error: anyhow::Error) -> Self {
        match error.downcast::<SkipSignal>() {
            Ok(signal) => Fault::Skip(signal),
            Err(error) => Fault::Error(error),
        }
    }

    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<SkipSignal>() {
            Ok(signal) => return Fault::Skip(*signal),
            Err(payload) => payload,
        };

        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else if let Some(e) = payload.downcast_ref::<anyhow::Error>() {
            e.to_string()
        } else {
            "panicked with a non-string payload".to_string()
        };

        Fault::Panic { message }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Fault::Skip(_))
    }

    /// Human-readable failure text: the message, then the first frame of
    /// the cause chain, then the remaining frames indented beneath it.
    pub fn describe(&self) -> String {
        match self {
            Fault::Error(error) => {
                let mut message = error.to_string();
                if message.trim().is_empty() {
                    message = format!("{error:?}");
                }
                if message.trim().is_empty() {
                    message = "error without a message".to_string();
                }
                let frames: Vec<String> = error
                    .chain()
                    .skip(1)
                    .map(|cause| cause.to_string())
                    .filter(|cause| !cause.trim().is_empty())
                    .collect();
                format_failure(&message, &frames)
            }
            Fault::Panic { message } => {
                let message = if message.trim().is_empty() {
                    "panicked without a message"
                } else {
                    message
                };
                format_failure(&format!("panicked: {message}"), &[])
            }
            Fault::Skip(signal) => signal.to_string(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Error(error) => write!(f, "{error}"),
            Fault::Panic { message } => write!(f, "panicked: {message}"),
            Fault::Skip(signal) => write!(f, "{signal}"),
        }
    }
}

fn format_failure(message: &str, frames: &[String]) -> String {
    let mut output = message.to_string();
    if let Some((first, rest)) = frames.split_first() {
        output.push_str(&format!("\n{INDENT}at {first}"));
        for frame in rest {
            for line in frame.lines() {
                output.push_str(&format!("\n{INDENT}     {line}"));
            }
        }
    }
    output
}
