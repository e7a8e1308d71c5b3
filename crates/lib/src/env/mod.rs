//! Scoped build environments.
//!
//! Every package may export environment variables to builds. A declaration's
//! scope decides who sees it:
//!
//! - `local`: only the declaring package's own build
//! - `export`: packages that depend on the declaring package directly
//! - `global`: every package in the sandbox
//!
//! [`EnvironmentComputer`] walks the sandbox once, in dependency order, with a
//! single table of variables seen so far. That table is what detects two
//! packages fighting over an `exclusive` variable anywhere in the graph.

pub mod path;
pub mod report;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::consts::{MANIFEST_FILENAME, NAMESPACE_SEPARATOR};
use crate::diagnostics::Diagnostic;
use crate::manifest::{EnvVarDecl, Scope, ScopeSet};
use crate::sandbox::{PackageInfo, Sandbox};
use path::{normalize_value, relative_to_sandbox};

pub use report::EnvironmentReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvOptions {
  /// Rewrite absolute paths inside the sandbox relative to `$KILN__SANDBOX`.
  pub relocatable: bool,
}

impl Default for EnvOptions {
  fn default() -> Self {
    Self { relocatable: true }
  }
}

/// One variable as seen by a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentVariable {
  pub name: String,
  pub value: String,
  pub scope: ScopeSet,
  pub exclusive: bool,
  pub builtin: bool,
  /// Name of the declaring package.
  pub package: String,
}

/// The variables visible to one package's build.
///
/// Variables are ordered own-local, then exports of direct dependencies, then
/// globals. A name may appear more than once; the first occurrence shadows
/// the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentGroup {
  pub package: String,
  pub variables: Vec<EnvironmentVariable>,
}

impl EnvironmentGroup {
  /// Visible variables with shadowed duplicates removed.
  pub fn resolved(&self) -> Vec<&EnvironmentVariable> {
    let mut seen = HashSet::new();
    self
      .variables
      .iter()
      .filter(|var| seen.insert(var.name.as_str()))
      .collect()
  }

  /// The value `name` resolves to in this group.
  pub fn get(&self, name: &str) -> Option<&EnvironmentVariable> {
    self.variables.iter().find(|var| var.name == name)
  }
}

/// Everything one package declares, built-ins first, plus what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageEnvironment {
  pub name: String,
  pub version: Option<String>,
  /// Manifest location, sandbox-relative when relocatable.
  pub manifest_path: String,
  pub declared: Vec<EnvironmentVariable>,
  pub errors: Vec<Diagnostic>,
}

/// Environments of every package in a sandbox.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SandboxEnvironment {
  /// Per-package declarations in dependency order.
  pub packages: Vec<PackageEnvironment>,
  pub groups: BTreeMap<String, EnvironmentGroup>,
}

impl SandboxEnvironment {
  pub fn group(&self, package: &str) -> Option<&EnvironmentGroup> {
    self.groups.get(package)
  }

  pub fn package(&self, name: &str) -> Option<&PackageEnvironment> {
    self.packages.iter().find(|p| p.name == name)
  }

  /// Built-in variables declared by `package`.
  pub fn builtins(&self, package: &str) -> impl Iterator<Item = &EnvironmentVariable> {
    self
      .package(package)
      .into_iter()
      .flat_map(|p| p.declared.iter().filter(|var| var.builtin))
  }

  pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
    self.packages.iter().flat_map(|p| p.errors.iter())
  }
}

struct SeenVariable {
  package: String,
  exclusive: bool,
  builtin: bool,
}

/// Computes [`SandboxEnvironment`]s.
pub struct EnvironmentComputer<'a> {
  sandbox: &'a Sandbox,
  options: EnvOptions,
}

impl<'a> EnvironmentComputer<'a> {
  pub fn new(sandbox: &'a Sandbox, options: EnvOptions) -> Self {
    Self { sandbox, options }
  }

  pub fn compute(&self) -> SandboxEnvironment {
    let order = self.sandbox.packages_postorder();
    let mut seen: HashMap<String, SeenVariable> = HashMap::new();

    // The root's built-ins are claimed before any dependency declares anything.
    let root = self.sandbox.root.as_ref();
    for (name, decl) in self.builtins(root, &root.descriptor.env_prefix()) {
      seen.insert(
        name,
        SeenVariable {
          package: root.name().to_string(),
          exclusive: decl.exclusive,
          builtin: decl.builtin,
        },
      );
    }

    let packages: Vec<PackageEnvironment> = order.iter().map(|info| self.declare(info, &mut seen)).collect();

    let by_name: HashMap<&str, &PackageEnvironment> = packages.iter().map(|p| (p.name.as_str(), p)).collect();
    let globals: Vec<&EnvironmentVariable> = packages
      .iter()
      .flat_map(|p| p.declared.iter())
      .filter(|var| var.scope.contains(Scope::Global))
      .collect();

    let mut groups = BTreeMap::new();
    for info in &order {
      let mut variables: Vec<EnvironmentVariable> = Vec::new();
      if let Some(own) = by_name.get(info.name()) {
        variables.extend(own.declared.iter().filter(|var| var.scope.contains(Scope::Local)).cloned());
      }
      for dep in info.dependency_tree.keys() {
        if let Some(dep_env) = by_name.get(dep.as_str()) {
          variables.extend(
            dep_env
              .declared
              .iter()
              .filter(|var| var.scope.contains(Scope::Export))
              .cloned(),
          );
        }
      }
      variables.extend(globals.iter().map(|var| (*var).clone()));

      groups.insert(
        info.name().to_string(),
        EnvironmentGroup {
          package: info.name().to_string(),
          variables,
        },
      );
    }

    let errors = packages.iter().map(|p| p.errors.len()).sum::<usize>();
    debug!(packages = packages.len(), errors, "computed sandbox environment");

    SandboxEnvironment { packages, groups }
  }

  fn declare(&self, info: &PackageInfo, seen: &mut HashMap<String, SeenVariable>) -> PackageEnvironment {
    let prefix = info.descriptor.env_prefix();
    let mut errors = Vec::new();
    let mut declared = Vec::new();

    let seeded = std::ptr::eq(info, self.sandbox.root.as_ref());
    for (name, decl) in self.builtins(info, &prefix) {
      if seeded {
        declared.push(variable(info, name, decl));
      } else {
        register(&mut declared, &mut errors, seen, info, name, decl);
      }
    }

    let exported = &info.descriptor.config.exported_env;
    for (name, decl) in exported {
      errors.extend(validate(info.name(), name, decl, &prefix));
    }
    for (name, decl) in exported {
      let mut decl = decl.clone();
      if self.options.relocatable {
        decl.value = normalize_value(&decl.value, self.sandbox.root_dir());
      }
      register(&mut declared, &mut errors, seen, info, name.clone(), decl);
    }

    PackageEnvironment {
      name: info.name().to_string(),
      version: info.version().map(str::to_string),
      manifest_path: self.display_path(&info.root_directory.join(MANIFEST_FILENAME)),
      declared,
      errors,
    }
  }

  fn builtins(&self, info: &PackageInfo, prefix: &str) -> Vec<(String, EnvVarDecl)> {
    let mut root = EnvVarDecl::new(self.display_path(&info.root_directory), ScopeSet::local()).exclusive();
    root.builtin = true;
    vec![(format!("{}ROOT", prefix), root)]
  }

  fn display_path(&self, path: &std::path::Path) -> String {
    if self.options.relocatable {
      relative_to_sandbox(path, self.sandbox.root_dir())
    } else {
      path.display().to_string()
    }
  }
}

fn register(
  declared: &mut Vec<EnvironmentVariable>,
  errors: &mut Vec<Diagnostic>,
  seen: &mut HashMap<String, SeenVariable>,
  info: &PackageInfo,
  name: String,
  decl: EnvVarDecl,
) {
  if let Some(existing) = seen.get(&name) {
    if existing.exclusive || decl.exclusive {
      warn!(variable = %name, owner = %existing.package, package = %info.name(), "exclusive variable conflict");
    }
    if existing.exclusive {
      errors.push(Diagnostic::ExclusivityConflict {
        variable: name.clone(),
        existing_owner: existing.package.clone(),
        existing_exclusive: true,
        existing_builtin: existing.builtin,
        package: info.name().to_string(),
      });
    }
    if decl.exclusive {
      errors.push(Diagnostic::ExclusivityConflict {
        variable: name.clone(),
        existing_owner: existing.package.clone(),
        existing_exclusive: false,
        existing_builtin: existing.builtin,
        package: info.name().to_string(),
      });
    }
  }

  seen.insert(
    name.clone(),
    SeenVariable {
      package: info.name().to_string(),
      exclusive: decl.exclusive,
      builtin: decl.builtin,
    },
  );

  declared.push(variable(info, name, decl));
}

fn variable(info: &PackageInfo, name: String, decl: EnvVarDecl) -> EnvironmentVariable {
  EnvironmentVariable {
    name,
    value: decl.value,
    scope: decl.scope,
    exclusive: decl.exclusive,
    builtin: decl.builtin,
    package: info.name().to_string(),
  }
}

/// Naming-convention warnings for a user declaration.
fn validate(package: &str, name: &str, decl: &EnvVarDecl, prefix: &str) -> Vec<Diagnostic> {
  let mut messages = Vec::new();
  let prefixed = name.starts_with(prefix);

  if decl.scopes.is_some() {
    messages.push(format!(
      "{} has a field 'scopes' (plural). You probably meant 'scope'. The owner of {} likely made a mistake",
      name, package
    ));
  }

  if !decl.scope.contains(Scope::Global) {
    if !prefixed {
      if name.to_uppercase().starts_with(prefix) {
        messages.push(format!(
          "It looks like {} is trying to be configured as a package scoped variable, but it has the wrong \
           capitalization. It should begin with {}. The owner of {} likely made a mistake",
          name, prefix, package
        ));
      } else {
        messages.push(format!(
          "Environment variable {} doesn't begin with {} but it is not marked as 'global'. You should either \
           prefix variables with {} or make them global. The author of {} likely made a mistake",
          name, prefix, prefix, package
        ));
      }
    }
  } else if !prefixed && name.contains(NAMESPACE_SEPARATOR) {
    messages.push(format!(
      "{} looks like it's trying to step on another package because it has a double underscore - which is how \
       we express namespaced env vars. The package owner for {} likely made a mistake",
      name, package
    ));
  }

  messages
    .into_iter()
    .map(|message| Diagnostic::EnvironmentScope {
      package: package.to_string(),
      variable: name.to_string(),
      message,
    })
    .collect()
}
