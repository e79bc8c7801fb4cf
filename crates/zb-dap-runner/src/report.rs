use std::fmt::Write;
use std::process::ExitCode;
use std::time::Duration;

use colored::Colorize;

use crate::orchestrator::{Outcome, ScenarioResult};

/// The summary printed after a run.
#[derive(Debug)]
pub struct Report {
    results: Vec<ScenarioResult>,
    elapsed: Duration,
}

impl Report {
    pub fn new(results: Vec<ScenarioResult>, elapsed: Duration) -> Self {
        Self { results, elapsed }
    }

    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        for result in &self.results {
            let status = match &result.outcome {
                Outcome::Passed => "PASS".green().bold(),
                Outcome::Failed(_) => "FAIL".red().bold(),
                Outcome::Panicked(_) => "PANIC".red().bold(),
                Outcome::TimedOut => "TIMEOUT".yellow().bold(),
            };
            let _ = write!(
                out,
                "{:>7}  {} ({:.2}s)",
                status,
                result.name,
                result.duration.as_secs_f64()
            );
            match &result.outcome {
                Outcome::Failed(reason) | Outcome::Panicked(reason) => {
                    let _ = writeln!(out, ": {}", reason);
                }
                _ => out.push('\n'),
            }
        }

        for result in self.results.iter().filter(|r| !r.outcome.is_success()) {
            let _ = writeln!(out, "\n{}", format!("--- {} ---", result.name).bold().cyan());
            if let Some(exit) = &result.exit {
                let _ = writeln!(out, "adapter {}", exit);
            }
            if result.output.is_empty() {
                out.push_str("(no output captured)\n");
            } else {
                out.push_str(&result.output);
                if !result.output.ends_with('\n') {
                    out.push('\n');
                }
            }
        }

        let summary = format!(
            "{} passed, {} failed, {} total in {:.2}s",
            self.passed(),
            self.failed(),
            self.results.len(),
            self.elapsed.as_secs_f64()
        );
        let _ = writeln!(
            out,
            "\n{}",
            if self.is_success() {
                summary.green().bold()
            } else {
                summary.red().bold()
            }
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &'static str, outcome: Outcome, output: &str) -> ScenarioResult {
        ScenarioResult {
            name,
            outcome,
            duration: Duration::from_millis(250),
            output: output.to_string(),
            exit: None,
        }
    }

    #[test]
    fn test_render_shows_output_of_failures_only() {
        colored::control::set_override(false);
        let report = Report::new(
            vec![
                result("initialization", Outcome::Passed, "[initialization] adapter ready\n"),
                result(
                    "call_stack",
                    Outcome::Failed("Expected a nested call stack, got 1 frame(s)".to_string()),
                    "[call_stack] loading artifact\n",
                ),
                result("pause_command", Outcome::TimedOut, ""),
            ],
            Duration::from_secs(3),
        );

        let rendered = report.render();
        assert!(rendered.contains("   PASS  initialization (0.25s)\n"));
        assert!(rendered.contains("   FAIL  call_stack (0.25s): Expected a nested call stack, got 1 frame(s)\n"));
        assert!(rendered.contains("TIMEOUT  pause_command (0.25s)\n"));
        assert!(rendered.contains("--- call_stack ---\n[call_stack] loading artifact\n"));
        assert!(rendered.contains("--- pause_command ---\n(no output captured)\n"));
        assert!(!rendered.contains("adapter ready"));
        assert!(rendered.ends_with("1 passed, 2 failed, 3 total in 3.00s\n"));
        assert!(!report.is_success());
    }

    #[test]
    fn test_all_passed() {
        let report = Report::new(vec![result("step_in", Outcome::Passed, "")], Duration::ZERO);
        assert!(report.is_success());
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 0);
    }
}
