//! CLI output formatting utilities.
//!
//! Colored status lines, diagnostics, node states, and JSON output.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use kiln_lib::error::{Diagnostic, Severity};
use kiln_lib::evaluate::{FailureReason, NodeState};
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const SKIPPED: &str = "-";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_diagnostic(diagnostic: &Diagnostic) {
  match diagnostic.severity {
    Severity::Error => print_error(&diagnostic.message),
    Severity::Warning => print_warning(&diagnostic.message),
  }
}

pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
  for diagnostic in diagnostics {
    print_diagnostic(diagnostic);
  }
}

/// One line per datasource: state symbol, reference, state name.
pub fn print_state(reference: &str, state: &NodeState) {
  let name = state.as_str();
  match state {
    NodeState::Resolved => println!(
      "  {} {}",
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
      reference
    ),
    NodeState::Failed(FailureReason::Error) => println!(
      "  {} {} {}",
      symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
      reference,
      format!("({})", name).if_supports_color(Stream::Stdout, |s| s.dimmed())
    ),
    _ => println!(
      "  {} {} {}",
      symbols::SKIPPED.if_supports_color(Stream::Stdout, |s| s.yellow()),
      reference,
      format!("({})", name).if_supports_color(Stream::Stdout, |s| s.dimmed())
    ),
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
