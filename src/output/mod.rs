//! Reporting module
//!
//! The reporter capability, its fan-out, and the bundled reporters.

mod console;
mod junit;
mod karma;
mod reporter;

pub use console::{ConsoleReporter, ConsoleView, DotsReporter};
pub use junit::{JUnitXmlReporter, DEFAULT_JUNIT_PATH};
pub use karma::{JsonLinesSink, KarmaReporter, KarmaResult, KarmaSink};
pub use reporter::{Reporter, Reporters};

use parking_lot::Mutex;
use std::io::Write;
use tracing::warn;

/// Serialized text output shared by a reporter's hooks
pub struct Terminal {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl Terminal {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Discards everything
    pub fn sink() -> Self {
        Self::new(std::io::sink())
    }

    pub fn write(&self, text: &str) {
        let mut writer = self.writer.lock();
        if let Err(e) = writer.write_all(text.as_bytes()).and_then(|_| writer.flush()) {
            warn!("Failed to write report output: {}", e);
        }
    }
}

/// In-memory writer whose contents stay readable after it is handed out
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(std::sync::Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
