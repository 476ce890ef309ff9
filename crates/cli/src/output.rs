//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use vibrissa_runner::diff::DEFAULT_MAX_CHANGED_LINES;
use vibrissa_runner::report::{failure_line, render_failure, Reporter, RunSummary};

/// Failures listed in full by the pretty reporter
const MAX_LISTED_FAILURES: usize = 10;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Colored progress, summary table and diffs
    #[default]
    Pretty,
    /// One stderr line per failed case
    Plain,
    /// The run summary as JSON on stdout
    Json,
}

/// Human-oriented reporter
#[derive(Debug, Default)]
pub struct PrettyReporter {
    failures: Vec<(String, Option<String>)>,
}

impl Reporter for PrettyReporter {
    fn on_start(&mut self, total: usize) {
        println!("{} {} case(s)", "Running".bold(), total);
    }

    fn on_case_pass(&mut self, name: &str) {
        println!("  {} {}", "✓".green(), name);
    }

    fn on_case_fail(&mut self, name: &str, error: Option<&str>) {
        println!("  {} {}", "✗".red(), name);
        eprintln!("{}", failure_line(name, error));
        self.failures
            .push((name.to_string(), error.map(str::to_string)));
    }

    fn on_complete(&mut self, summary: &RunSummary) {
        println!();
        println!("{}", summary_table(summary));

        if self.failures.is_empty() {
            if summary.total > 0 {
                print_success("All cases passed");
            }
            return;
        }

        println!();
        println!("{}", "Failures:".red().bold());
        for (name, error) in self.failures.iter().take(MAX_LISTED_FAILURES) {
            println!("  {} {}", "✗".red(), name.bold());
            if let Some(error) = error {
                for line in render_failure(error, DEFAULT_MAX_CHANGED_LINES).lines() {
                    println!("    {}", colorize_diff_line(line));
                }
            }
        }
        if self.failures.len() > MAX_LISTED_FAILURES {
            println!(
                "  ...and {} more",
                self.failures.len() - MAX_LISTED_FAILURES
            );
        }
    }
}

fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec!["Total", "Passed", "Failed", "Skipped", "Duration"]);
    let failed = if summary.failed > 0 {
        Cell::new(summary.failed).fg(Color::Red)
    } else {
        Cell::new(summary.failed)
    };
    table.add_row(vec![
        Cell::new(summary.total),
        Cell::new(summary.passed).fg(Color::Green),
        failed,
        Cell::new(summary.skipped),
        Cell::new(format!("{} ms", summary.duration_ms)),
    ]);
    table
}

fn colorize_diff_line(line: &str) -> String {
    if line.starts_with("--- ") || line.starts_with("+++ ") {
        line.bold().to_string()
    } else if line.starts_with("- ") {
        line.red().to_string()
    } else if line.starts_with("+ ") {
        line.green().to_string()
    } else {
        line.to_string()
    }
}

/// Prints only the final summary, as JSON on stdout
#[derive(Debug, Default)]
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn on_start(&mut self, _total: usize) {}

    fn on_case_pass(&mut self, _name: &str) {}

    fn on_case_fail(&mut self, _name: &str, _error: Option<&str>) {}

    fn on_complete(&mut self, summary: &RunSummary) {
        println!("{}", serde_json::to_string_pretty(summary).unwrap_or_default());
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_table_lists_counts() {
        let mut summary = RunSummary::new(2);
        summary.duration_ms = 42;
        let rendered = summary_table(&summary).to_string();
        assert!(rendered.contains("Skipped"));
        assert!(rendered.contains("42 ms"));
    }

    #[test]
    fn test_pretty_reporter_keeps_failures() {
        let mut reporter = PrettyReporter::default();
        reporter.on_case_fail("a", Some("boom"));
        reporter.on_case_fail("b", None);
        assert_eq!(
            reporter.failures,
            vec![
                ("a".to_string(), Some("boom".to_string())),
                ("b".to_string(), None)
            ]
        );
    }

    #[test]
    fn test_context_lines_are_untouched() {
        colored::control::set_override(false);
        assert_eq!(colorize_diff_line("  {"), "  {");
        assert_eq!(colorize_diff_line("- x"), "- x");
    }
}
