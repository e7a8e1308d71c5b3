//! Non-fatal problems found while planning.
//!
//! Resolution and environment computation never stop at the first problem. Each
//! stage records [`Diagnostic`]s on the package they concern, and the full list
//! is reported at the end so that one missing package does not hide the rest.

use serde::Serialize;
use thiserror::Error;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Warning,
  Error,
}

/// Number of missing package names listed before the remainder is summarised.
const MISSING_REPORT_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
  /// A dependency's manifest could not be read or parsed. Its subtree is dropped.
  #[error("{message}")]
  ManifestParse { path: String, message: String },

  /// Required dependencies that could not be located, batched per package.
  #[error(
    "cannot resolve {} packages\n  at {}\n  did you forget to install dependencies?",
    format_names(names),
    trace.join(" -> ")
  )]
  MissingDependencies { names: Vec<String>, trace: Vec<String> },

  /// Optional dependencies that could not be located.
  #[error("optional packages {} not found\n  at {}", format_names(names), trace.join(" -> "))]
  MissingOptionalDependencies { names: Vec<String>, trace: Vec<String> },

  /// A dependency that is already on the active resolution path.
  #[error("circular dependency \"{name}\" detected\n  at {}", trace.join(" -> "))]
  CircularDependency { name: String, trace: Vec<String> },

  /// An exported variable that breaks the naming conventions.
  #[error("{message}")]
  EnvironmentScope {
    package: String,
    variable: String,
    message: String,
  },

  /// Two packages declare the same variable and at least one wants to own it.
  #[error("{}", format_conflict(variable, existing_owner, *existing_exclusive, *existing_builtin, package))]
  ExclusivityConflict {
    variable: String,
    existing_owner: String,
    existing_exclusive: bool,
    existing_builtin: bool,
    package: String,
  },
}

impl Diagnostic {
  pub fn severity(&self) -> Severity {
    match self {
      Diagnostic::EnvironmentScope { .. } | Diagnostic::MissingOptionalDependencies { .. } => Severity::Warning,
      Diagnostic::ManifestParse { .. }
      | Diagnostic::MissingDependencies { .. }
      | Diagnostic::CircularDependency { .. }
      | Diagnostic::ExclusivityConflict { .. } => Severity::Error,
    }
  }

  pub fn is_error(&self) -> bool {
    self.severity() == Severity::Error
  }
}

fn format_names(names: &[String]) -> String {
  let listed: Vec<String> = names
    .iter()
    .take(MISSING_REPORT_LIMIT)
    .map(|n| format!("\"{}\"", n))
    .collect();
  let mut message = listed.join(", ");
  if names.len() > MISSING_REPORT_LIMIT {
    message.push_str(&format!(" (and {} more)", names.len() - MISSING_REPORT_LIMIT));
  }
  message
}

fn format_conflict(
  variable: &str,
  existing_owner: &str,
  existing_exclusive: bool,
  existing_builtin: bool,
  package: &str,
) -> String {
  if existing_exclusive {
    let kind = if existing_builtin { "built-in variable " } else { "" };
    format!(
      "{}{} has already been set by {} which configured it with exclusive:true, yet {} is trying to override it",
      kind, variable, existing_owner, package
    )
  } else {
    format!(
      "{} has already been set by {} and {} has configured it with exclusive:true",
      variable, existing_owner, package
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn missing_dependencies_lists_first_three() {
    let diag = Diagnostic::MissingDependencies {
      names: names(&["a", "b", "c", "d", "e"]),
      trace: names(&["app", "lib"]),
    };
    let message = diag.to_string();
    assert!(message.starts_with("cannot resolve \"a\", \"b\", \"c\" (and 2 more) packages"));
    assert!(message.contains("at app -> lib"));
    assert_eq!(diag.severity(), Severity::Error);
  }

  #[test]
  fn missing_dependencies_without_remainder() {
    let diag = Diagnostic::MissingDependencies {
      names: names(&["a"]),
      trace: names(&["app"]),
    };
    assert!(!diag.to_string().contains("more"));
  }

  #[test]
  fn circular_dependency_names_path() {
    let diag = Diagnostic::CircularDependency {
      name: "a".to_string(),
      trace: names(&["a", "b"]),
    };
    assert!(diag.to_string().contains("at a -> b"));
  }

  #[test]
  fn scope_warnings_are_not_errors() {
    let diag = Diagnostic::EnvironmentScope {
      package: "lib".to_string(),
      variable: "FOO".to_string(),
      message: "FOO is not prefixed".to_string(),
    };
    assert!(!diag.is_error());
  }

  #[test]
  fn conflict_mentions_both_packages() {
    let diag = Diagnostic::ExclusivityConflict {
      variable: "FOO".to_string(),
      existing_owner: "a".to_string(),
      existing_exclusive: false,
      existing_builtin: false,
      package: "b".to_string(),
    };
    let message = diag.to_string();
    assert!(message.contains("set by a"));
    assert!(message.contains("b has configured it"));
  }
}
