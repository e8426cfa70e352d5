//! Output formatters for test results
//!
//! Renders a result tree as an indented table, JSON, or a one-line summary.

use std::io::Write;

use crate::models::{ResultState, TestResult};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }

    pub fn all() -> &'static [&'static str] {
        &["table", "json", "json-pretty", "summary"]
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a result tree
    pub fn format_result(&self, result: &TestResult) -> anyhow::Result<String> {
        Ok(match self.format {
            OutputFormat::Table => self.format_table(result),
            OutputFormat::Json => serde_json::to_string(result)?,
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result)?,
            OutputFormat::Summary => self.format_summary(result),
        })
    }

    fn format_table(&self, result: &TestResult) -> String {
        let mut output = String::new();
        self.push_rows(result, 0, &mut output);

        output.push_str("────────────────────────────────────────────────────────────\n");
        output.push_str(&self.format_summary(result));
        output.push('\n');
        output
    }

    fn push_rows(&self, result: &TestResult, depth: usize, output: &mut String) {
        let indent = "  ".repeat(depth);
        output.push_str(&format!(
            "{}{} {:<width$} [{:>6}ms]",
            indent,
            self.state_label(result.state),
            result.name,
            result.duration_ms,
            width = 40usize.saturating_sub(indent.len()),
        ));
        if let Some(label) = &result.label {
            output.push_str(&format!(" ({label})"));
        }
        output.push('\n');

        if !result.state.is_success() {
            if let Some(message) = &result.message {
                for line in message.lines() {
                    output.push_str(&format!("{indent}    {line}\n"));
                }
            }
        }

        for child in &result.children {
            self.push_rows(child, depth + 1, output);
        }
    }

    fn state_label(&self, state: ResultState) -> String {
        let plain = format!("{} {:<12}", state.symbol(), state.to_string());
        if !self.colorize {
            return plain;
        }

        let color = match state {
            ResultState::Success => "32",
            ResultState::Failure | ResultState::Error => "31",
            ResultState::Skipped | ResultState::Cancelled => "33",
            ResultState::Inconclusive => "36",
        };
        format!("\x1b[{color}m{plain}\x1b[0m")
    }

    fn format_summary(&self, result: &TestResult) -> String {
        format!(
            "{} {}: {}/{} passed, {} failed, {} skipped ({:.1}%) in {}ms",
            result.state.symbol(),
            result.full_name,
            result.passed(),
            result.total_leaves(),
            result.failed(),
            result.skipped(),
            result.pass_rate(),
            result.duration_ms
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a result tree to a file without colors
pub fn write_result_to_file(
    path: &str,
    result: &TestResult,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let content = ResultFormatter::new(format).no_color().format_result(result)?;

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureSite;

    fn sample() -> TestResult {
        let mut ok = TestResult::new("Adds", "Math.Adds");
        ok.set_state(ResultState::Success);

        let mut bad = TestResult::new("Divides", "Math.Divides");
        bad.set_result(
            ResultState::Failure,
            Some(FailureSite::Test),
            Some("expected 2 but was 3".to_string()),
            None,
        );

        let mut ignored = TestResult::new("Slow", "Math.Slow");
        ignored.skip(Some("Ignored"), "too slow");

        let mut suite = TestResult::new("Math", "Math");
        suite.add_child(ok);
        suite.add_child(bad);
        suite.add_child(ignored);
        suite.set_result(
            ResultState::Failure,
            Some(FailureSite::Child),
            Some("One or more child tests had errors".to_string()),
            None,
        );
        suite
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("TABLE"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_str("csv"), None);
    }

    #[test]
    fn test_table_is_indented_tree() {
        let output = ResultFormatter::default()
            .no_color()
            .format_result(&sample())
            .unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert!(lines[0].starts_with("✗ FAIL"));
        assert!(lines[0].contains("Math"));
        assert!(lines.iter().any(|l| l.starts_with("  ✓ PASS") && l.contains("Adds")));
        assert!(lines.iter().any(|l| l.contains("expected 2 but was 3")));
        assert!(lines.iter().any(|l| l.contains("Slow") && l.contains("(Ignored)")));
        assert!(!output.contains("\x1b["));
    }

    #[test]
    fn test_summary_counts_leaves() {
        let output = ResultFormatter::new(OutputFormat::Summary)
            .format_result(&sample())
            .unwrap();
        assert!(output.contains("Math: 1/3 passed, 1 failed, 1 skipped"));
    }

    #[test]
    fn test_json_round_trips_tree() {
        let output = ResultFormatter::new(OutputFormat::Json)
            .format_result(&sample())
            .unwrap();
        let parsed: TestResult = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.children.len(), 3);
        assert_eq!(parsed.state, ResultState::Failure);
    }

    #[test]
    fn test_write_result_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.txt");
        write_result_to_file(path.to_str().unwrap(), &sample(), OutputFormat::Summary).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("1/3 passed"));
    }
}
