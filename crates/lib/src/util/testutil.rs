//! Test utilities for kiln-lib.
//!
//! Helpers for laying out sandboxes on disk: a root manifest plus installed
//! packages under `node_modules`.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::consts::{MANIFEST_FILENAME, MODULES_DIRNAME};

/// A sandbox in a temporary directory, removed on drop.
pub struct SandboxFixture {
  _dir: TempDir,
  root: PathBuf,
}

impl SandboxFixture {
  /// Create a sandbox whose root manifest is `manifest`.
  pub fn new(manifest: &str) -> Self {
    let dir = TempDir::new().unwrap();
    let root = dunce::canonicalize(dir.path()).unwrap();
    fs::write(root.join(MANIFEST_FILENAME), manifest).unwrap();
    Self { _dir: dir, root }
  }

  /// Real path of the sandbox root.
  pub fn path(&self) -> &Path {
    &self.root
  }

  /// Install a package at the top level of the sandbox's `node_modules`.
  pub fn install(&self, name: &str, manifest: &str) -> PathBuf {
    self.install_at(&self.root, name, manifest)
  }

  /// Install a package into `parent`'s own `node_modules`.
  pub fn install_at(&self, parent: &Path, name: &str, manifest: &str) -> PathBuf {
    let dir = parent.join(MODULES_DIRNAME).join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(MANIFEST_FILENAME), manifest).unwrap();
    dunce::canonicalize(&dir).unwrap()
  }
}
