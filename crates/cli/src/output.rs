//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, diagnostics and JSON.

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use kiln_lib::diagnostics::{Diagnostic, Severity};

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
}

pub fn print_success(message: &str) {
  eprintln!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stderr, |s| s.green()),
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

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Print diagnostics to stderr and return how many are errors.
pub fn print_diagnostics<'a>(diagnostics: impl IntoIterator<Item = &'a Diagnostic>) -> usize {
  let mut errors = 0;
  for diagnostic in diagnostics {
    match diagnostic.severity() {
      Severity::Error => {
        errors += 1;
        print_error(&diagnostic.to_string());
      }
      Severity::Warning => print_warning(&diagnostic.to_string()),
    }
  }
  errors
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counts_only_errors() {
    let diagnostics = vec![
      Diagnostic::MissingOptionalDependencies {
        names: vec!["opt".to_string()],
        trace: vec!["app".to_string()],
      },
      Diagnostic::MissingDependencies {
        names: vec!["dep".to_string()],
        trace: vec!["app".to_string()],
      },
    ];
    assert_eq!(print_diagnostics(&diagnostics), 1);
  }

  #[test]
  fn json_format_flag() {
    assert!(OutputFormat::Json.is_json());
    assert!(!OutputFormat::default().is_json());
  }
}
