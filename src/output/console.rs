//! Console reporters
//!
//! `ConsoleReporter` prints the whole run (or only what failed) once the
//! suite finishes. `DotsReporter` prints one character per test as it
//! finishes and then the failures.

use async_trait::async_trait;
use std::fmt::Write as _;

use super::reporter::Reporter;
use super::Terminal;
use crate::config::ReportingSettings;
use crate::executor::{Test, TestSubject, TestSuite};
use crate::models::{TestResult, TestStatus, TestSuiteResults};
use crate::utils::description_concat;

const RED: &str = "31";
const GREEN: &str = "32";
const YELLOW: &str = "33";
const CYAN: &str = "36";
const BOLD_RED: &str = "1;31";
const BOLD_YELLOW: &str = "1;33";
const UNDERLINE_YELLOW: &str = "4;33";

const BLANK: &str = "     ";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConsoleView {
    /// Every subject and every visible result
    #[default]
    Full,
    /// Only subjects with a failing test, and only their failures
    FailuresOnly,
}

pub struct ConsoleReporter {
    view: ConsoleView,
    colorize: bool,
    terminal: Terminal,
}

impl ConsoleReporter {
    pub fn new(view: ConsoleView) -> Self {
        Self {
            view,
            colorize: true,
            terminal: Terminal::stdout(),
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    pub fn with_terminal(mut self, terminal: Terminal) -> Self {
        self.terminal = terminal;
        self
    }

    fn paint(&self, text: &str, style: &str) -> String {
        paint(self.colorize, text, style)
    }

    /// Render the final report
    pub fn render(&self, results: &TestSuiteResults) -> String {
        let reporting = &results.suite.settings().reporting;
        let mut out = String::new();

        for subject in &results.subject_results {
            if subject.results.is_empty() {
                continue;
            }
            if self.view == ConsoleView::FailuresOnly && subject.passed() {
                continue;
            }

            let heading = match self.view {
                ConsoleView::Full => YELLOW,
                ConsoleView::FailuresOnly => UNDERLINE_YELLOW,
            };
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", self.paint(&subject.description, heading));

            for result in &subject.results {
                if result.hidden {
                    continue;
                }
                if self.view == ConsoleView::FailuresOnly && !result.status.is_failure() {
                    continue;
                }
                self.render_result(&mut out, &subject.description, result, reporting);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "{}", self.summary_line(results));
        let _ = writeln!(out);
        if self.view == ConsoleView::Full {
            let verdict = if results.passed() {
                "All tests pass!"
            } else {
                "Some tests failed!"
            };
            let _ = writeln!(out, "{verdict}");
        }
        out
    }

    fn render_result(
        &self,
        out: &mut String,
        subject: &str,
        result: &TestResult,
        reporting: &ReportingSettings,
    ) {
        let (indicator, style) = match result.status {
            TestStatus::Skip => (" (S) ", YELLOW),
            TestStatus::Pass => ("  ✓  ", GREEN),
            TestStatus::Fail => ("  ✗  ", RED),
        };
        let line = format!(
            "{indicator}{}",
            description_concat(subject, &result.description)
        );
        let duration = duration_label(self.colorize, result.duration_ms, reporting);

        let _ = writeln!(out, "{}{}", self.paint(&line, style), duration);
        if result.status.is_failure() {
            for message_line in result.message.lines() {
                let _ = writeln!(out, "{BLANK}{message_line}");
            }
        }
    }

    fn summary_line(&self, results: &TestSuiteResults) -> String {
        let total = results.total();
        let passed = results.passed_count();
        let failed = results.failed_count();
        let skipped = results.skipped_count();

        if (failed > 0 && passed > 0) || skipped > 0 {
            format!(
                "ran {} test(s): {}, {}, {}",
                total,
                self.paint(&format!("{passed} passed"), GREEN),
                self.paint(&format!("{skipped} skipped"), YELLOW),
                self.paint(&format!("{failed} failed"), RED)
            )
        } else if failed > 0 {
            self.paint(&format!("{failed} / {total} test(s) failed"), RED)
        } else if total > 0 {
            self.paint(&format!("{passed} test(s) passed"), GREEN)
        } else {
            self.paint("0 test(s) defined", YELLOW)
        }
    }
}

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn on_suite_finished(&self, _suite: &TestSuite, results: &TestSuiteResults) {
        self.terminal.write(&self.render(results));
    }
}

/// One character per finished test, then the failures-only report
pub struct DotsReporter {
    colorize: bool,
    terminal: Terminal,
}

impl DotsReporter {
    pub fn new() -> Self {
        Self {
            colorize: true,
            terminal: Terminal::stdout(),
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    pub fn with_terminal(mut self, terminal: Terminal) -> Self {
        self.terminal = terminal;
        self
    }

    fn dot(&self, status: TestStatus) -> String {
        match status {
            TestStatus::Skip => paint(self.colorize, "S", YELLOW),
            TestStatus::Pass => paint(self.colorize, ".", GREEN),
            TestStatus::Fail => paint(self.colorize, "F", RED),
        }
    }
}

impl Default for DotsReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reporter for DotsReporter {
    async fn on_test_finished(
        &self,
        _suite: &TestSuite,
        _subject: &TestSubject,
        _test: &Test,
        result: &TestResult,
    ) {
        self.terminal.write(&self.dot(result.status));
    }

    async fn on_suite_finished(&self, _suite: &TestSuite, results: &TestSuiteResults) {
        let failures = ConsoleReporter {
            view: ConsoleView::FailuresOnly,
            colorize: self.colorize,
            terminal: Terminal::sink(),
        };
        self.terminal.write(&format!("\n{}", failures.render(results)));
    }
}

fn paint(colorize: bool, text: &str, style: &str) -> String {
    if colorize {
        format!("\x1b[{style}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

/// Duration suffix: red past the slow threshold, yellow past half of it,
/// cyan when at least the minimum reported duration, otherwise nothing
fn duration_label(colorize: bool, duration_ms: u64, reporting: &ReportingSettings) -> String {
    let text = format!("[{duration_ms}ms]");
    let slow = reporting.slow_threshold_ms;

    let style = if duration_ms > slow {
        BOLD_RED
    } else if duration_ms * 2 > slow {
        BOLD_YELLOW
    } else if duration_ms >= reporting.minimum_reported_duration_ms {
        CYAN
    } else {
        return String::new();
    };
    format!(" {}", paint(colorize, &text, style))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuiteSettings;
    use crate::models::TestSubjectResult;
    use std::sync::Arc;

    fn results(subjects: Vec<TestSubjectResult>) -> TestSuiteResults {
        TestSuiteResults::new(Arc::new(TestSuite::new(SuiteSettings::default())), subjects)
    }

    fn sample() -> TestSuiteResults {
        results(vec![
            TestSubjectResult::new(
                "Parser",
                vec![
                    TestResult::pass(".parse() reads numbers", 1),
                    TestResult::hidden_skip("invisible"),
                ],
            ),
            TestSubjectResult::new(
                "Lexer",
                vec![
                    TestResult::pass("splits words", 2),
                    TestResult::fail("handles quotes", 3, "expected 2 tokens\n     at lexer"),
                    TestResult::skip("unicode", 0, "later"),
                ],
            ),
            TestSubjectResult::new("Empty", vec![]),
        ])
    }

    #[test]
    fn test_full_view() {
        let output = ConsoleReporter::new(ConsoleView::Full).no_color().render(&sample());

        assert!(output.contains("Parser\n  ✓  Parser.parse() reads numbers\n"));
        assert!(!output.contains("invisible"));
        assert!(output.contains("  ✗  Lexer handles quotes\n     expected 2 tokens\n"));
        assert!(output.contains(" (S) Lexer unicode"));
        assert!(!output.contains("Empty"));
        assert!(output.contains("ran 5 test(s): 2 passed, 2 skipped, 1 failed"));
        assert!(output.ends_with("Some tests failed!\n"));
    }

    #[test]
    fn test_failures_only_view() {
        let output = ConsoleReporter::new(ConsoleView::FailuresOnly)
            .no_color()
            .render(&sample());

        assert!(!output.contains("Parser"));
        assert!(output.contains("Lexer\n  ✗  Lexer handles quotes\n"));
        assert!(!output.contains("splits words"));
        assert!(!output.contains("unicode"));
    }

    #[test]
    fn test_summary_variants() {
        let reporter = ConsoleReporter::new(ConsoleView::Full).no_color();

        let all_pass = results(vec![TestSubjectResult::new("a", vec![TestResult::pass("x", 1)])]);
        assert!(reporter.render(&all_pass).contains("1 test(s) passed"));
        assert!(reporter.render(&all_pass).ends_with("All tests pass!\n"));

        let all_fail = results(vec![TestSubjectResult::new("a", vec![TestResult::fail("x", 1, "no")])]);
        assert!(reporter.render(&all_fail).contains("1 / 1 test(s) failed"));

        assert!(reporter.render(&results(vec![])).contains("0 test(s) defined"));
    }

    #[test]
    fn test_duration_highlighting() {
        let reporting = ReportingSettings::default();

        assert_eq!(duration_label(false, 10, &reporting), "");
        assert_eq!(duration_label(false, 15, &reporting), " [15ms]");
        assert_eq!(duration_label(true, 20, &reporting), " \x1b[36m[20ms]\x1b[0m");
        assert_eq!(duration_label(true, 40, &reporting), " \x1b[1;33m[40ms]\x1b[0m");
        assert_eq!(duration_label(true, 76, &reporting), " \x1b[1;31m[76ms]\x1b[0m");
    }

    #[test]
    fn test_dots() {
        let reporter = DotsReporter::new().no_color();
        assert_eq!(reporter.dot(TestStatus::Pass), ".");
        assert_eq!(reporter.dot(TestStatus::Fail), "F");
        assert_eq!(reporter.dot(TestStatus::Skip), "S");
    }
}
