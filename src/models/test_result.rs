//! Test result models
//!
//! Defines result states, failure sites, and the result tree produced by
//! executing a test node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of executing a single node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultState {
    #[default]
    Inconclusive,
    Success,
    Failure,
    Error,
    Cancelled,
    Skipped,
}

impl ResultState {
    pub fn symbol(&self) -> &'static str {
        match self {
            ResultState::Inconclusive => "?",
            ResultState::Success => "✓",
            ResultState::Failure => "✗",
            ResultState::Error => "!",
            ResultState::Cancelled => "⊘",
            ResultState::Skipped => "○",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultState::Success)
    }

    /// Failure or Error
    pub fn is_failure(&self) -> bool {
        matches!(self, ResultState::Failure | ResultState::Error)
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultState::Inconclusive => write!(f, "INCONCLUSIVE"),
            ResultState::Success => write!(f, "PASS"),
            ResultState::Failure => write!(f, "FAIL"),
            ResultState::Error => write!(f, "ERROR"),
            ResultState::Cancelled => write!(f, "CANCELLED"),
            ResultState::Skipped => write!(f, "SKIP"),
        }
    }
}

/// Where in a node's lifecycle a failure was observed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureSite {
    /// The test body itself
    Test,
    /// Fixture construction or one-time setup
    SetUp,
    /// After setup completed, while running children or internal logic
    Fixture,
    /// A child reported a failure
    Child,
    /// One-time teardown or fixture disposal
    TearDown,
}

impl fmt::Display for FailureSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureSite::Test => "test",
            FailureSite::SetUp => "setup",
            FailureSite::Fixture => "fixture",
            FailureSite::Child => "child",
            FailureSite::TearDown => "teardown",
        };
        f.write_str(s)
    }
}

/// Result of executing one node, with the results of its children
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub full_name: String,
    pub state: ResultState,
    pub site: Option<FailureSite>,
    /// Secondary qualifier such as `Ignored` or `Explicit`
    pub label: Option<String>,
    pub message: Option<String>,
    pub trace: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub children: Vec<TestResult>,
}

impl TestResult {
    /// Create an empty, inconclusive result at the start of a node's execution
    pub fn new(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            state: ResultState::Inconclusive,
            site: None,
            label: None,
            message: None,
            trace: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: 0,
            children: Vec::new(),
        }
    }

    pub fn set_state(&mut self, state: ResultState) {
        self.state = state;
    }

    pub fn set_result(
        &mut self,
        state: ResultState,
        site: Option<FailureSite>,
        message: Option<String>,
        trace: Option<String>,
    ) {
        self.state = state;
        self.site = site;
        self.message = message;
        self.trace = trace;
    }

    /// Mark as skipped without running anything
    pub fn skip(&mut self, label: Option<&str>, reason: impl Into<String>) {
        self.state = ResultState::Skipped;
        self.label = label.map(str::to_string);
        self.message = Some(reason.into());
    }

    /// Append a completed child result in execution order
    pub fn add_child(&mut self, child: TestResult) {
        self.children.push(child);
    }

    /// Record a teardown failure.
    ///
    /// The teardown text is appended to whatever message and trace the
    /// result already carries. The state is forced to `Error`, except for a
    /// cancelled result which stays cancelled so that cancellation keeps
    /// propagating to the parent.
    pub fn record_teardown_failure(&mut self, message: &str, trace: Option<&str>) {
        let message = format!("TearDown : {message}");
        self.message = Some(match self.message.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{message}"),
            _ => message,
        });

        if let Some(trace) = trace {
            let trace = format!("--TearDown\n{trace}");
            self.trace = Some(match self.trace.take() {
                Some(existing) if !existing.is_empty() => format!("{existing}\n{trace}"),
                _ => trace,
            });
        }

        if self.state != ResultState::Cancelled {
            self.state = ResultState::Error;
        }
        self.site = Some(FailureSite::TearDown);
    }

    /// Stamp end time and duration
    pub fn finish(&mut self) {
        let ended = Utc::now();
        self.duration_ms = (ended - self.started_at).num_milliseconds().max(0) as u64;
        self.ended_at = Some(ended);
    }

    pub fn is_suite(&self) -> bool {
        !self.children.is_empty()
    }

    /// Count leaf results in the given state
    pub fn count_leaves(&self, state: ResultState) -> usize {
        if self.children.is_empty() {
            usize::from(self.state == state)
        } else {
            self.children.iter().map(|c| c.count_leaves(state)).sum()
        }
    }

    pub fn total_leaves(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            self.children.iter().map(TestResult::total_leaves).sum()
        }
    }

    pub fn passed(&self) -> usize {
        self.count_leaves(ResultState::Success)
    }

    pub fn failed(&self) -> usize {
        self.count_leaves(ResultState::Failure) + self.count_leaves(ResultState::Error)
    }

    pub fn skipped(&self) -> usize {
        self.count_leaves(ResultState::Skipped)
    }

    pub fn pass_rate(&self) -> f64 {
        let total = self.total_leaves();
        if total == 0 {
            0.0
        } else {
            (self.passed() as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.state.symbol(),
            self.full_name,
            self.duration_ms
        )?;
        if let Some(site) = self.site {
            write!(f, " ({site})")?;
        }
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, state: ResultState) -> TestResult {
        let mut result = TestResult::new(name, format!("Suite.{name}"));
        result.set_state(state);
        result
    }

    #[test]
    fn test_new_result_is_inconclusive() {
        let result = TestResult::new("A", "Suite.A");
        assert_eq!(result.state, ResultState::Inconclusive);
        assert!(result.children.is_empty());
        assert!(result.message.is_none());
    }

    #[test]
    fn test_teardown_appends_to_existing_message() {
        let mut result = TestResult::new("Suite", "Suite");
        result.set_result(
            ResultState::Failure,
            Some(FailureSite::Child),
            Some("One or more child tests had errors".to_string()),
            Some("child trace".to_string()),
        );

        result.record_teardown_failure("disk full", Some("at cleanup"));

        assert_eq!(result.state, ResultState::Error);
        assert_eq!(result.site, Some(FailureSite::TearDown));
        assert_eq!(
            result.message.as_deref(),
            Some("One or more child tests had errors\nTearDown : disk full")
        );
        assert_eq!(
            result.trace.as_deref(),
            Some("child trace\n--TearDown\nat cleanup")
        );
    }

    #[test]
    fn test_teardown_overrides_success() {
        let mut result = TestResult::new("Suite", "Suite");
        result.set_state(ResultState::Success);
        result.record_teardown_failure("boom", None);

        assert_eq!(result.state, ResultState::Error);
        assert_eq!(result.message.as_deref(), Some("TearDown : boom"));
        assert!(result.trace.is_none());
    }

    #[test]
    fn test_teardown_keeps_cancelled() {
        let mut result = TestResult::new("Suite", "Suite");
        result.set_state(ResultState::Cancelled);
        result.record_teardown_failure("boom", None);

        assert_eq!(result.state, ResultState::Cancelled);
        assert_eq!(result.site, Some(FailureSite::TearDown));
    }

    #[test]
    fn test_leaf_counts() {
        let mut suite = TestResult::new("Suite", "Suite");
        suite.add_child(leaf("A", ResultState::Success));
        suite.add_child(leaf("B", ResultState::Failure));
        suite.add_child(leaf("C", ResultState::Skipped));
        suite.add_child(leaf("D", ResultState::Error));

        assert_eq!(suite.total_leaves(), 4);
        assert_eq!(suite.passed(), 1);
        assert_eq!(suite.failed(), 2);
        assert_eq!(suite.skipped(), 1);
        assert!((suite.pass_rate() - 25.0).abs() < f64::EPSILON);
    }
}
