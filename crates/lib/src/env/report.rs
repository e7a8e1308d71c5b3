//! Human-readable and JSON environment reports.
//!
//! The text form is a shell script: every line is either a comment or an
//! `export`, so it can be sourced to inspect what a build would see.

use std::fmt;

use serde::Serialize;

use super::{PackageEnvironment, SandboxEnvironment};
use crate::diagnostics::Severity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportMessage {
  pub severity: Severity,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportAssignment {
  pub name: String,
  pub value: String,
}

/// One package's section of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
  pub name: String,
  pub version: Option<String>,
  pub path: String,
  pub messages: Vec<ReportMessage>,
  pub builtins: Vec<ReportAssignment>,
  pub variables: Vec<ReportAssignment>,
}

impl ReportSection {
  fn from_package(package: &PackageEnvironment) -> Self {
    let assignment = |var: &super::EnvironmentVariable| ReportAssignment {
      name: var.name.clone(),
      value: var.value.clone(),
    };

    Self {
      name: package.name.clone(),
      version: package.version.clone(),
      path: package.manifest_path.clone(),
      messages: package
        .errors
        .iter()
        .map(|d| ReportMessage {
          severity: d.severity(),
          message: d.to_string(),
        })
        .collect(),
      builtins: package.declared.iter().filter(|v| v.builtin).map(assignment).collect(),
      variables: package.declared.iter().filter(|v| !v.builtin).map(assignment).collect(),
    }
  }
}

/// Per-package report of declared variables and their problems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EnvironmentReport {
  pub sections: Vec<ReportSection>,
}

impl EnvironmentReport {
  pub fn new(env: &SandboxEnvironment) -> Self {
    Self {
      sections: env.packages.iter().map(ReportSection::from_package).collect(),
    }
  }
}

impl fmt::Display for ReportSection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.version {
      Some(version) => writeln!(f, "# {}@{} {}", self.name, version, self.path)?,
      None => writeln!(f, "# {} {}", self.name, self.path)?,
    }

    for message in &self.messages {
      let tag = match message.severity {
        Severity::Error => "ERROR",
        Severity::Warning => "WARNING",
      };
      let mut lines = message.message.lines();
      if let Some(first) = lines.next() {
        writeln!(f, "# [{}] {}", tag, first)?;
      }
      for line in lines {
        writeln!(f, "#   {}", line.trim_start())?;
      }
    }

    if !self.builtins.is_empty() {
      writeln!(f, "# [BuiltIns]")?;
      for var in &self.builtins {
        writeln!(f, "export {}={}", var.name, var.value)?;
      }
    }
    if !self.variables.is_empty() {
      writeln!(f, "# [Custom Variables]")?;
      for var in &self.variables {
        writeln!(f, "export {}={}", var.name, var.value)?;
      }
    }
    Ok(())
  }
}

impl fmt::Display for EnvironmentReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, section) in self.sections.iter().enumerate() {
      if i > 0 {
        writeln!(f)?;
      }
      write!(f, "{}", section)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diagnostics::Diagnostic;
  use crate::env::EnvironmentVariable;
  use crate::manifest::ScopeSet;

  fn var(name: &str, value: &str, builtin: bool) -> EnvironmentVariable {
    EnvironmentVariable {
      name: name.to_string(),
      value: value.to_string(),
      scope: ScopeSet::local(),
      exclusive: builtin,
      builtin,
      package: "lib".to_string(),
    }
  }

  fn sample() -> SandboxEnvironment {
    SandboxEnvironment {
      packages: vec![PackageEnvironment {
        name: "lib".to_string(),
        version: Some("1.0.0".to_string()),
        manifest_path: "$KILN__SANDBOX/node_modules/lib/package.json".to_string(),
        declared: vec![
          var("LIB__ROOT", "$KILN__SANDBOX/node_modules/lib", true),
          var("FLAGS", "-O2", false),
        ],
        errors: vec![Diagnostic::EnvironmentScope {
          package: "lib".to_string(),
          variable: "FLAGS".to_string(),
          message: "FLAGS is not prefixed".to_string(),
        }],
      }],
      groups: Default::default(),
    }
  }

  #[test]
  fn text_report_layout() {
    let text = EnvironmentReport::new(&sample()).to_string();
    let expected = "\
# lib@1.0.0 $KILN__SANDBOX/node_modules/lib/package.json
# [WARNING] FLAGS is not prefixed
# [BuiltIns]
export LIB__ROOT=$KILN__SANDBOX/node_modules/lib
# [Custom Variables]
export FLAGS=-O2
";
    assert_eq!(text, expected);
  }

  #[test]
  fn multiline_messages_stay_commented() {
    let mut env = sample();
    env.packages[0].errors = vec![Diagnostic::CircularDependency {
      name: "a".to_string(),
      trace: vec!["a".to_string(), "b".to_string(), "a".to_string()],
    }];
    let text = EnvironmentReport::new(&env).to_string();
    assert!(text.lines().all(|l| l.starts_with('#') || l.starts_with("export ")));
    assert!(text.contains("# [ERROR] circular dependency \"a\" detected"));
  }

  #[test]
  fn json_report_is_a_list_of_sections() {
    let json = serde_json::to_value(EnvironmentReport::new(&sample())).unwrap();
    assert_eq!(json[0]["name"], "lib");
    assert_eq!(json[0]["messages"][0]["severity"], "warning");
    assert_eq!(json[0]["builtins"][0]["name"], "LIB__ROOT");
  }
}
