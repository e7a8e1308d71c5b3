//! Resolved package types.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::manifest::PackageDescriptor;
use crate::util::hash::ObjectHash;

/// Dependencies of a package, keyed by the name they were requested under.
///
/// Nodes are shared behind [`Arc`] when the same real path is reached through
/// several parents, so a diamond dependency is resolved once.
pub type DependencyTree = BTreeMap<String, Arc<PackageInfo>>;

/// Where a package's sources come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
  /// A directory on this host.
  Local,
  /// A package fetched from a registry or repository by the installer.
  Remote,
}

/// A resolved package and its dependency subtree.
#[derive(Debug)]
pub struct PackageInfo {
  /// Source identity: `local:<real path>` or the remote locator.
  pub source: String,
  pub source_kind: SourceKind,
  /// Identifier-safe package name.
  pub normalized_name: String,
  /// Real path of the directory holding the manifest.
  pub root_directory: PathBuf,
  pub descriptor: PackageDescriptor,
  pub dependency_tree: DependencyTree,
  /// Problems found while resolving this package's direct dependencies.
  pub errors: Vec<Diagnostic>,
  /// Content hash, computed on first request and kept for the run.
  pub(crate) cached_hash: OnceLock<ObjectHash>,
}

impl PackageInfo {
  pub fn new(
    descriptor: PackageDescriptor,
    root_directory: PathBuf,
    dependency_tree: DependencyTree,
    errors: Vec<Diagnostic>,
  ) -> Self {
    let (source, source_kind) = match &descriptor.resolved {
      Some(locator) => (locator.clone(), SourceKind::Remote),
      None => (format!("local:{}", root_directory.display()), SourceKind::Local),
    };

    Self {
      source,
      source_kind,
      normalized_name: descriptor.normalized_name(),
      root_directory,
      descriptor,
      dependency_tree,
      errors,
      cached_hash: OnceLock::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.descriptor.name
  }

  pub fn version(&self) -> Option<&str> {
    self.descriptor.version.as_deref()
  }

  /// Dependencies of this package in tree order.
  pub fn dependencies(&self) -> impl Iterator<Item = &PackageInfo> {
    self.dependency_tree.values().map(|dep| dep.as_ref())
  }

  /// All packages below this one, each name listed once, nearest first.
  pub fn transitive_dependencies(&self) -> Vec<&PackageInfo> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    collect_transitive(self, &mut seen, &mut result);
    result
  }
}

fn collect_transitive<'a>(
  info: &'a PackageInfo,
  seen: &mut std::collections::HashSet<&'a str>,
  result: &mut Vec<&'a PackageInfo>,
) {
  for (name, dep) in &info.dependency_tree {
    if !seen.insert(name.as_str()) {
      continue;
    }
    result.push(dep.as_ref());
    collect_transitive(dep, seen, result);
  }
}
