//! Filesystem collaborators used by the resolver.
//!
//! The resolver only needs two capabilities: finding where a named dependency
//! is installed relative to a package, and loading the manifest found there.
//! Both are traits so callers can plug in other installers' layouts.

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::consts::{MANIFEST_FILENAME, MODULES_DIRNAME};
use crate::manifest::{ManifestError, PackageDescriptor, read_manifest};

/// Finds the installed location of a dependency.
pub trait LocationResolver: Send + Sync {
  /// Real path of the directory containing `name`'s manifest, looked up from
  /// `base_dir`, or `None` if it is not installed.
  fn resolve(&self, name: &str, base_dir: &Path) -> impl Future<Output = Option<PathBuf>> + Send;
}

/// Reads package manifests.
pub trait ManifestLoader: Send + Sync {
  fn load(&self, manifest_path: &Path) -> impl Future<Output = Result<PackageDescriptor, ManifestError>> + Send;
}

/// Looks dependencies up in `node_modules` directories, walking from the
/// requesting package towards the filesystem root.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeModulesLocator;

impl LocationResolver for NodeModulesLocator {
  fn resolve(&self, name: &str, base_dir: &Path) -> impl Future<Output = Option<PathBuf>> + Send {
    let name = name.to_string();
    let base_dir = base_dir.to_path_buf();
    async move { find_installed(&name, &base_dir).await }
  }
}

async fn find_installed(name: &str, base_dir: &Path) -> Option<PathBuf> {
  for dir in base_dir.ancestors() {
    if dir.file_name().is_some_and(|n| n == MODULES_DIRNAME) {
      continue;
    }

    let candidate = dir.join(MODULES_DIRNAME).join(name);
    let exists = tokio::fs::try_exists(candidate.join(MANIFEST_FILENAME))
      .await
      .unwrap_or(false);
    if exists {
      trace!(name, path = %candidate.display(), "found installed package");
      return dunce::canonicalize(&candidate).ok();
    }
  }
  None
}

/// Reads manifests from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsManifestLoader;

impl ManifestLoader for FsManifestLoader {
  fn load(&self, manifest_path: &Path) -> impl Future<Output = Result<PackageDescriptor, ManifestError>> + Send {
    let manifest_path = manifest_path.to_path_buf();
    async move { read_manifest(&manifest_path).await }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn install(root: &Path, relative: &str, name: &str) -> PathBuf {
    let dir = root.join(relative);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(MANIFEST_FILENAME), format!(r#"{{ "name": "{}" }}"#, name)).unwrap();
    dunce::canonicalize(&dir).unwrap()
  }

  #[tokio::test]
  async fn finds_package_in_own_node_modules() {
    let temp = TempDir::new().unwrap();
    let expected = install(temp.path(), "node_modules/lib", "lib");

    let found = NodeModulesLocator.resolve("lib", temp.path()).await;
    assert_eq!(found, Some(expected));
  }

  #[tokio::test]
  async fn walks_up_to_parent_node_modules() {
    let temp = TempDir::new().unwrap();
    let expected = install(temp.path(), "node_modules/shared", "shared");
    let lib = install(temp.path(), "node_modules/lib", "lib");

    let found = NodeModulesLocator.resolve("shared", &lib).await;
    assert_eq!(found, Some(expected));
  }

  #[tokio::test]
  async fn nearest_installation_wins() {
    let temp = TempDir::new().unwrap();
    install(temp.path(), "node_modules/shared", "shared");
    let lib = install(temp.path(), "node_modules/lib", "lib");
    let nested = install(temp.path(), "node_modules/lib/node_modules/shared", "shared");

    let found = NodeModulesLocator.resolve("shared", &lib).await;
    assert_eq!(found, Some(nested));
  }

  #[tokio::test]
  async fn resolves_scoped_names() {
    let temp = TempDir::new().unwrap();
    let expected = install(temp.path(), "node_modules/@scope/lib", "@scope/lib");

    let found = NodeModulesLocator.resolve("@scope/lib", temp.path()).await;
    assert_eq!(found, Some(expected));
  }

  #[tokio::test]
  async fn missing_package_is_none() {
    let temp = TempDir::new().unwrap();
    assert_eq!(NodeModulesLocator.resolve("nope", temp.path()).await, None);
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn symlinked_package_resolves_to_real_path() {
    let temp = TempDir::new().unwrap();
    let real = install(temp.path(), "packages/lib", "lib");
    fs::create_dir_all(temp.path().join("node_modules")).unwrap();
    std::os::unix::fs::symlink(&real, temp.path().join("node_modules/lib")).unwrap();

    let found = NodeModulesLocator.resolve("lib", temp.path()).await;
    assert_eq!(found, Some(real));
  }
}
