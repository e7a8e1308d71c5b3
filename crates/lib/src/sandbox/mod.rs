//! Sandboxes: one resolution run rooted at a project directory.
//!
//! A [`Sandbox`] owns the resolved dependency tree of its root package and the
//! base environment every build in it starts from.

mod locate;
mod memo;
mod resolve;
mod types;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

pub use locate::{FsManifestLoader, LocationResolver, ManifestLoader, NodeModulesLocator};
pub use memo::InflightCache;
pub use resolve::{DependencyResolver, ResolveError};
pub use types::{DependencyTree, PackageInfo, SourceKind};

use crate::consts::APP_NAME;
use crate::diagnostics::Diagnostic;
use crate::platform::host_names;

/// Variable/value pairs, ordered by name.
pub type Environment = BTreeMap<String, String>;

/// `PATH` seen by every build before dependency `bin` directories are added.
pub const BASE_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Shell every build command runs under.
pub const BASE_SHELL: &str = "env -i /bin/bash --norc --noprofile";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
  /// Pin host-dependent values so plans are identical across machines.
  pub deterministic: bool,
}

/// A resolved sandbox.
#[derive(Debug)]
pub struct Sandbox {
  /// Base environment including `PATH` and `SHELL`.
  pub env: Environment,
  /// Base environment without the process-level variables.
  pub loose_env: Environment,
  pub root: Arc<PackageInfo>,
  pub options: ResolveOptions,
}

impl Sandbox {
  /// Resolve the sandbox rooted at `directory` using `node_modules` lookup.
  pub async fn from_directory(directory: &Path, options: ResolveOptions) -> Result<Self, ResolveError> {
    let resolver = DependencyResolver::new(NodeModulesLocator, FsManifestLoader);
    Self::resolve_with(&resolver, directory, options).await
  }

  /// Resolve the sandbox rooted at `directory` with custom collaborators.
  pub async fn resolve_with<R, L>(
    resolver: &DependencyResolver<R, L>,
    directory: &Path,
    options: ResolveOptions,
  ) -> Result<Self, ResolveError>
  where
    R: LocationResolver,
    L: ManifestLoader,
  {
    let root = resolver.resolve(directory).await?;
    let loose_env = loose_environment(options.deterministic);
    let mut env = loose_env.clone();
    env.insert("PATH".to_string(), BASE_PATH.to_string());
    env.insert("SHELL".to_string(), BASE_SHELL.to_string());

    Ok(Self {
      env,
      loose_env,
      root: Arc::new(root),
      options,
    })
  }

  /// Real path of the sandbox directory.
  pub fn root_dir(&self) -> &Path {
    &self.root.root_directory
  }

  /// Every package once by name, dependencies before dependents, root last.
  pub fn packages_postorder(&self) -> Vec<&PackageInfo> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    postorder(&self.root, &mut seen, &mut order);
    debug!(packages = order.len(), "ordered sandbox packages");
    order
  }

  /// Look up a resolved package by name.
  pub fn package(&self, name: &str) -> Option<&PackageInfo> {
    self.packages_postorder().into_iter().find(|p| p.name() == name)
  }

  /// All resolution diagnostics in the tree, each node's reported once.
  pub fn diagnostics(&self) -> Vec<&Diagnostic> {
    let mut visited = HashSet::new();
    let mut result = Vec::new();
    collect_diagnostics(&self.root, &mut visited, &mut result);
    result
  }

  pub fn has_errors(&self) -> bool {
    self.diagnostics().iter().any(|d| d.is_error())
  }
}

/// Host description exported to every build, without `PATH`/`SHELL`.
pub fn loose_environment(deterministic: bool) -> Environment {
  let (platform, arch) = host_names(deterministic);
  let mut env = Environment::new();
  env.insert(format!("{}__platform", APP_NAME), platform.clone());
  env.insert(format!("{}__architecture", APP_NAME), arch.clone());
  env.insert(format!("{}__target_platform", APP_NAME), platform);
  env.insert(format!("{}__target_architecture", APP_NAME), arch);
  env
}

fn postorder<'a>(info: &'a PackageInfo, seen: &mut HashSet<&'a str>, order: &mut Vec<&'a PackageInfo>) {
  if !seen.insert(info.name()) {
    return;
  }
  for dep in info.dependencies() {
    postorder(dep, seen, order);
  }
  order.push(info);
}

fn collect_diagnostics<'a>(
  info: &'a PackageInfo,
  visited: &mut HashSet<*const PackageInfo>,
  result: &mut Vec<&'a Diagnostic>,
) {
  if !visited.insert(info as *const PackageInfo) {
    return;
  }
  result.extend(info.errors.iter());
  for dep in info.dependencies() {
    collect_diagnostics(dep, visited, result);
  }
}
