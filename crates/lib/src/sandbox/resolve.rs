//! Dependency tree resolution.
//!
//! Starting from the sandbox's root manifest, the resolver walks dependencies
//! depth-first and builds a [`DependencyTree`] for every package.
//!
//! # Algorithm
//!
//! For each package, its requirements are merged (regular, peer, conditional,
//! optional; first occurrence of a name wins) and then, per dependency:
//!
//! 1. A name already on the active resolution path is a cycle. The edge is
//!    recorded as [`Diagnostic::CircularDependency`] and not followed.
//! 2. The dependency is located relative to the requesting package. Missing
//!    conditional dependencies are dropped silently; other misses are batched
//!    into one diagnostic per package.
//! 3. Found dependencies are loaded and resolved recursively.
//!
//! Location lookups for the siblings of one package run concurrently; their
//! subtrees are then loaded one after another in tree order. Both lookups and
//! package loads are memoized by real path for the lifetime of the resolver.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, join_all};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::locate::{LocationResolver, ManifestLoader};
use super::memo::InflightCache;
use super::types::{DependencyTree, PackageInfo};
use crate::consts::MANIFEST_FILENAME;
use crate::diagnostics::Diagnostic;
use crate::manifest::{Dependency, DependencyKind, ManifestError};

/// Errors that abort resolution entirely.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// The sandbox directory does not exist or cannot be canonicalized.
  #[error("invalid sandbox directory {path}: {source}")]
  SandboxDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The root manifest is missing or malformed.
  #[error("invalid sandbox: {0}")]
  RootManifest(#[source] ManifestError),
}

/// A package on the active resolution path.
#[derive(Debug, Clone)]
struct TraceEntry {
  name: String,
  directory: PathBuf,
}

type LoadResult = Result<Arc<PackageInfo>, Diagnostic>;

/// Resolves a sandbox's dependency tree.
///
/// A resolver holds the memo caches for one run; create a new one per run.
pub struct DependencyResolver<R, L> {
  locator: R,
  loader: L,
  locations: InflightCache<(PathBuf, String), Option<PathBuf>>,
  packages: InflightCache<PathBuf, LoadResult>,
}

impl<R: LocationResolver, L: ManifestLoader> DependencyResolver<R, L> {
  pub fn new(locator: R, loader: L) -> Self {
    Self {
      locator,
      loader,
      locations: InflightCache::new(),
      packages: InflightCache::new(),
    }
  }

  /// Resolve the package rooted at `root_dir` and all of its dependencies.
  ///
  /// # Errors
  ///
  /// Only a missing sandbox directory or an unreadable root manifest fail the
  /// call. Every other problem is recorded on the affected [`PackageInfo`].
  pub async fn resolve(&self, root_dir: &Path) -> Result<PackageInfo, ResolveError> {
    let root_dir = dunce::canonicalize(root_dir).map_err(|e| ResolveError::SandboxDir {
      path: root_dir.to_path_buf(),
      source: e,
    })?;

    let descriptor = self
      .loader
      .load(&root_dir.join(MANIFEST_FILENAME))
      .await
      .map_err(ResolveError::RootManifest)?;

    info!(package = %descriptor.name, path = %root_dir.display(), "resolving sandbox");

    let trace = vec![TraceEntry {
      name: descriptor.name.clone(),
      directory: root_dir.clone(),
    }];
    let (tree, errors) = self.build_tree(&root_dir, descriptor.dependencies(), &trace).await;

    let packages = self.packages.len().await;
    info!(packages, errors = errors.len(), "resolved sandbox");

    Ok(PackageInfo::new(descriptor, root_dir, tree, errors))
  }

  fn build_tree<'a>(
    &'a self,
    base_dir: &'a Path,
    dependencies: Vec<Dependency>,
    trace: &'a [TraceEntry],
  ) -> BoxFuture<'a, (DependencyTree, Vec<Diagnostic>)> {
    Box::pin(async move {
      let mut tree = DependencyTree::new();
      let mut errors = Vec::new();
      let mut missing = Vec::new();
      let mut missing_optional = Vec::new();

      let mut candidates = Vec::new();
      for dep in dependencies {
        if trace.iter().any(|entry| entry.name == dep.name) {
          warn!(dependency = %dep.name, "circular dependency");
          errors.push(circular(&dep.name, trace));
          continue;
        }
        candidates.push(dep);
      }

      let locations = join_all(candidates.iter().map(|dep| self.locate(&dep.name, base_dir))).await;

      for (dep, location) in candidates.into_iter().zip(locations) {
        let Some(location) = location else {
          match dep.kind {
            DependencyKind::Conditional => debug!(dependency = %dep.name, "skipping missing conditional dependency"),
            DependencyKind::Optional => missing_optional.push(dep.name),
            DependencyKind::Regular | DependencyKind::Peer => missing.push(dep.name),
          }
          continue;
        };

        if trace.iter().any(|entry| entry.directory == location) {
          warn!(dependency = %dep.name, path = %location.display(), "circular dependency through path");
          errors.push(circular(&dep.name, trace));
          continue;
        }

        match self.load_package(location, trace).await {
          Ok(info) => {
            tree.insert(dep.name, info);
          }
          Err(diagnostic) => errors.push(diagnostic),
        }
      }

      if !missing.is_empty() {
        errors.push(Diagnostic::MissingDependencies {
          names: missing,
          trace: trace_names(trace),
        });
      }
      if !missing_optional.is_empty() {
        errors.push(Diagnostic::MissingOptionalDependencies {
          names: missing_optional,
          trace: trace_names(trace),
        });
      }

      (tree, errors)
    })
  }

  async fn locate(&self, name: &str, base_dir: &Path) -> Option<PathBuf> {
    let key = (base_dir.to_path_buf(), name.to_string());
    self
      .locations
      .get_or_init(key, || self.locator.resolve(name, base_dir))
      .await
  }

  async fn load_package(&self, location: PathBuf, trace: &[TraceEntry]) -> LoadResult {
    let owned = trace.to_vec();
    let cached = self
      .packages
      .get_or_init(location.clone(), || self.build_package_info(location.clone(), owned))
      .await?;

    // A subtree built under another parent may contain a package that is an
    // ancestor here. Such a node is resolved again for this path.
    match revisited_ancestor(&cached, trace) {
      None => Ok(cached),
      Some(name) => {
        debug!(package = %cached.name(), ancestor = %name, "cached subtree revisits an ancestor");
        self.build_package_info(location, trace.to_vec()).await
      }
    }
  }

  fn build_package_info(&self, location: PathBuf, trace: Vec<TraceEntry>) -> BoxFuture<'_, LoadResult> {
    Box::pin(async move {
      let manifest_path = location.join(MANIFEST_FILENAME);
      let descriptor = self.loader.load(&manifest_path).await.map_err(|e| {
        warn!(path = %manifest_path.display(), error = %e, "failed to load dependency manifest");
        Diagnostic::ManifestParse {
          path: manifest_path.display().to_string(),
          message: e.to_string(),
        }
      })?;

      trace!(package = %descriptor.name, path = %location.display(), "loading package");

      let mut trace = trace;
      trace.push(TraceEntry {
        name: descriptor.name.clone(),
        directory: location.clone(),
      });

      let (tree, errors) = self.build_tree(&location, descriptor.dependencies(), &trace).await;
      Ok(Arc::new(PackageInfo::new(descriptor, location, tree, errors)))
    })
  }
}

/// First package in `info`'s subtree whose name is already on `trace`.
fn revisited_ancestor<'a>(info: &'a PackageInfo, trace: &[TraceEntry]) -> Option<&'a str> {
  let mut visited = HashSet::new();
  let mut stack = vec![info];
  while let Some(node) = stack.pop() {
    if !visited.insert(node as *const PackageInfo) {
      continue;
    }
    if trace.iter().any(|entry| entry.name == node.name()) {
      return Some(node.name());
    }
    stack.extend(node.dependencies());
  }
  None
}

fn trace_names(trace: &[TraceEntry]) -> Vec<String> {
  trace.iter().map(|entry| entry.name.clone()).collect()
}

fn circular(name: &str, trace: &[TraceEntry]) -> Diagnostic {
  let mut path = trace_names(trace);
  path.push(name.to_string());
  Diagnostic::CircularDependency {
    name: name.to_string(),
    trace: path,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::{PackageDescriptor, parse_manifest};
  use crate::sandbox::locate::{FsManifestLoader, NodeModulesLocator};
  use crate::util::testutil::SandboxFixture;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn resolver() -> DependencyResolver<NodeModulesLocator, FsManifestLoader> {
    DependencyResolver::new(NodeModulesLocator, FsManifestLoader)
  }

  /// Loader that counts how often each manifest is read.
  #[derive(Default)]
  struct CountingLoader {
    loads: std::sync::Mutex<HashMap<PathBuf, usize>>,
    total: AtomicUsize,
  }

  impl ManifestLoader for CountingLoader {
    fn load(&self, manifest_path: &Path) -> impl Future<Output = Result<PackageDescriptor, ManifestError>> + Send {
      self.total.fetch_add(1, Ordering::SeqCst);
      *self
        .loads
        .lock()
        .unwrap()
        .entry(manifest_path.to_path_buf())
        .or_default() += 1;
      let contents = std::fs::read_to_string(manifest_path);
      let path = manifest_path.to_path_buf();
      async move {
        let contents = contents.map_err(|e| ManifestError::Read {
          path: path.clone(),
          source: e,
        })?;
        parse_manifest(&contents, &path)
      }
    }
  }

  mod tree_shape {
    use super::*;

    #[tokio::test]
    async fn resolves_nested_dependencies() {
      let fixture = SandboxFixture::new(r#"{ "name": "app", "dependencies": { "lib": "*" } }"#);
      fixture.install("lib", r#"{ "name": "lib", "dependencies": { "base": "*" } }"#);
      fixture.install("base", r#"{ "name": "base" }"#);

      let root = resolver().resolve(fixture.path()).await.unwrap();

      assert_eq!(root.name(), "app");
      let lib = &root.dependency_tree["lib"];
      assert!(lib.dependency_tree.contains_key("base"));
      assert!(root.errors.is_empty());
      assert!(lib.errors.is_empty());
    }

    #[tokio::test]
    async fn diamond_dependency_shares_one_node() {
      let fixture = SandboxFixture::new(r#"{ "name": "app", "dependencies": { "left": "*", "right": "*" } }"#);
      fixture.install("left", r#"{ "name": "left", "dependencies": { "shared": "*" } }"#);
      fixture.install("right", r#"{ "name": "right", "dependencies": { "shared": "*" } }"#);
      fixture.install("shared", r#"{ "name": "shared" }"#);

      let root = resolver().resolve(fixture.path()).await.unwrap();

      let left_shared = &root.dependency_tree["left"].dependency_tree["shared"];
      let right_shared = &root.dependency_tree["right"].dependency_tree["shared"];
      assert!(Arc::ptr_eq(left_shared, right_shared));
    }

    #[tokio::test]
    async fn each_real_path_is_loaded_once() {
      let fixture = SandboxFixture::new(r#"{ "name": "app", "dependencies": { "left": "*", "right": "*" } }"#);
      fixture.install("left", r#"{ "name": "left", "dependencies": { "shared": "*" } }"#);
      fixture.install("right", r#"{ "name": "right", "dependencies": { "shared": "*" } }"#);
      fixture.install("shared", r#"{ "name": "shared" }"#);

      let resolver = DependencyResolver::new(NodeModulesLocator, CountingLoader::default());
      resolver.resolve(fixture.path()).await.unwrap();

      let loads = resolver.loader.loads.lock().unwrap();
      assert!(loads.values().all(|count| *count == 1));
      assert_eq!(resolver.loader.total.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn peer_dependencies_are_traversed() {
      let fixture = SandboxFixture::new(r#"{ "name": "app", "peerDependencies": { "peer": "*" } }"#);
      fixture.install("peer", r#"{ "name": "peer" }"#);

      let root = resolver().resolve(fixture.path()).await.unwrap();
      assert!(root.dependency_tree.contains_key("peer"));
    }

    #[tokio::test]
    async fn no_node_has_itself_as_ancestor() {
      let fixture = SandboxFixture::new(r#"{ "name": "a", "dependencies": { "b": "*" } }"#);
      fixture.install("b", r#"{ "name": "b", "dependencies": { "c": "*" } }"#);
      fixture.install("c", r#"{ "name": "c", "dependencies": { "a": "*", "b": "*" } }"#);
      fixture.install("a", r#"{ "name": "a" }"#);

      let root = resolver().resolve(fixture.path()).await.unwrap();

      fn check(info: &PackageInfo, ancestors: &mut Vec<String>) {
        assert!(!ancestors.contains(&info.name().to_string()), "{} repeats", info.name());
        ancestors.push(info.name().to_string());
        for dep in info.dependencies() {
          check(dep, ancestors);
        }
        ancestors.pop();
      }
      check(&root, &mut Vec::new());
    }
  }

  mod shared_nodes {
    use super::*;

    fn ancestor_repeats(info: &PackageInfo, ancestors: &mut Vec<String>, found: &mut Vec<String>) {
      if ancestors.iter().any(|name| name == info.name()) {
        found.push(format!("{} -> {}", ancestors.join(" -> "), info.name()));
        return;
      }
      ancestors.push(info.name().to_string());
      for dep in info.dependencies() {
        ancestor_repeats(dep, ancestors, found);
      }
      ancestors.pop();
    }

    /// `m` is first reached from `app` and picks up its own nested `z`. When
    /// the top-level `z` later requires `m`, that cached subtree would put `z`
    /// below itself.
    fn nested_duplicate_name() -> SandboxFixture {
      let fixture = SandboxFixture::new(r#"{ "name": "app", "dependencies": { "m": "*", "z": "*" } }"#);
      let m = fixture.install("m", r#"{ "name": "m", "dependencies": { "z": "*" } }"#);
      fixture.install_at(&m, "z", r#"{ "name": "z", "version": "2.0.0" }"#);
      fixture.install("z", r#"{ "name": "z", "version": "1.0.0", "dependencies": { "m": "*" } }"#);
      fixture
    }

    #[tokio::test]
    async fn reused_node_never_contains_an_ancestor() {
      let fixture = nested_duplicate_name();

      let root = resolver().resolve(fixture.path()).await.unwrap();

      let mut found = Vec::new();
      ancestor_repeats(&root, &mut Vec::new(), &mut found);
      assert!(found.is_empty(), "ancestors repeated: {:?}", found);
    }

    #[tokio::test]
    async fn conflicting_subtree_is_resolved_for_its_own_path() {
      let fixture = nested_duplicate_name();

      let root = resolver().resolve(fixture.path()).await.unwrap();

      let direct_m = &root.dependency_tree["m"];
      assert_eq!(direct_m.dependency_tree["z"].version(), Some("2.0.0"));
      assert!(direct_m.errors.is_empty());

      let m_below_z = &root.dependency_tree["z"].dependency_tree["m"];
      assert!(!Arc::ptr_eq(direct_m, m_below_z));
      assert!(m_below_z.dependency_tree.is_empty());
      assert!(matches!(
        m_below_z.errors.as_slice(),
        [Diagnostic::CircularDependency { name, .. }] if name == "z"
      ));
    }
  }

  mod failures {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn circular_dependency_is_recorded_and_pruned() {
      let fixture = SandboxFixture::new(r#"{ "name": "a", "dependencies": { "b": "*" } }"#);
      fixture.install("b", r#"{ "name": "b", "dependencies": { "a": "*" } }"#);

      let root = resolver().resolve(fixture.path()).await.unwrap();

      let b = &root.dependency_tree["b"];
      assert!(!b.dependency_tree.contains_key("a"));
      assert_eq!(
        b.errors,
        vec![Diagnostic::CircularDependency {
          name: "a".to_string(),
          trace: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        }]
      );
      assert!(b.errors[0].to_string().contains("a -> b -> a"));
    }

    #[tokio::test]
    #[traced_test]
    async fn circular_dependency_is_logged() {
      let fixture = SandboxFixture::new(r#"{ "name": "a", "dependencies": { "b": "*" } }"#);
      fixture.install("b", r#"{ "name": "b", "dependencies": { "a": "*" } }"#);

      resolver().resolve(fixture.path()).await.unwrap();
      assert!(logs_contain("circular dependency"));
    }

    #[tokio::test]
    async fn missing_dependencies_are_batched() {
      let fixture = SandboxFixture::new(
        r#"{ "name": "app", "dependencies": { "m1": "*", "m2": "*", "m3": "*", "m4": "*", "ok": "*" } }"#,
      );
      fixture.install("ok", r#"{ "name": "ok" }"#);

      let root = resolver().resolve(fixture.path()).await.unwrap();

      assert!(root.dependency_tree.contains_key("ok"));
      assert_eq!(root.errors.len(), 1);
      let message = root.errors[0].to_string();
      assert!(message.contains("\"m1\", \"m2\", \"m3\" (and 1 more)"));
      assert!(message.contains("at app"));
    }

    #[tokio::test]
    async fn missing_conditional_dependency_is_silent() {
      let fixture = SandboxFixture::new(r#"{ "name": "app", "conditionalDependencies": { "maybe": "*" } }"#);

      let root = resolver().resolve(fixture.path()).await.unwrap();
      assert!(root.errors.is_empty());
      assert!(root.dependency_tree.is_empty());
    }

    #[tokio::test]
    async fn missing_optional_dependency_is_a_warning() {
      let fixture = SandboxFixture::new(r#"{ "name": "app", "optionalDependencies": { "maybe": "*" } }"#);

      let root = resolver().resolve(fixture.path()).await.unwrap();
      assert_eq!(root.errors.len(), 1);
      assert!(!root.errors[0].is_error());
    }

    #[tokio::test]
    async fn broken_dependency_manifest_is_attached_to_parent() {
      let fixture = SandboxFixture::new(r#"{ "name": "app", "dependencies": { "bad": "*", "good": "*" } }"#);
      fixture.install("bad", r#"{ "version": "1.0.0" }"#);
      fixture.install("good", r#"{ "name": "good" }"#);

      let root = resolver().resolve(fixture.path()).await.unwrap();

      assert!(!root.dependency_tree.contains_key("bad"));
      assert!(root.dependency_tree.contains_key("good"));
      assert!(matches!(root.errors[0], Diagnostic::ManifestParse { .. }));
    }

    #[tokio::test]
    async fn broken_root_manifest_aborts() {
      let fixture = SandboxFixture::new(r#"{ "dependencies": {} }"#);
      let result = resolver().resolve(fixture.path()).await;
      assert!(matches!(result, Err(ResolveError::RootManifest(ManifestError::MissingName { .. }))));
    }

    #[tokio::test]
    async fn missing_sandbox_directory_aborts() {
      let fixture = SandboxFixture::new(r#"{ "name": "app" }"#);
      let result = resolver().resolve(&fixture.path().join("missing")).await;
      assert!(matches!(result, Err(ResolveError::SandboxDir { .. })));
    }
  }
}
