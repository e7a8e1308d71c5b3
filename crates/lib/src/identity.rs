//! Content-addressed package keys.
//!
//! A package key names a package's install location in the store. It is a pure
//! function of the sandbox base environment, the package's source identity and
//! build-relevant manifest fields, and the keys of its direct dependencies.
//! Since each dependency key already folds in that dependency's own subtree, a
//! change anywhere below a package changes its key.
//!
//! # Format
//!
//! `<normalized-name>-<version or 0.0.0>-<hash>`, e.g. `scope_lib-1.2.0-a1b2c3d4e5f6789012ab`.
//! In [`KeyMode::Deterministic`] the hash suffix is omitted.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::env::path::{normalize_value, relative_to_sandbox};
use crate::manifest::EnvVarDecl;
use crate::sandbox::{Environment, PackageInfo, Sandbox, SourceKind};
use crate::util::hash::{HashError, Hashable, ObjectHash};

#[derive(Debug, Error)]
pub enum KeyError {
  /// A key was requested for a package that is not part of the sandbox.
  #[error("unknown package: {name}")]
  UnknownPackage { name: String },

  #[error("failed to hash package inputs: {0}")]
  Hash(#[from] HashError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyMode {
  #[default]
  Hashed,
  /// Omit the hash suffix; used for reproducible test output.
  Deterministic,
}

impl KeyMode {
  pub fn for_sandbox(sandbox: &Sandbox) -> Self {
    if sandbox.options.deterministic {
      KeyMode::Deterministic
    } else {
      KeyMode::Hashed
    }
  }
}

/// A package's content key, usable as a path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageKey(pub String);

impl PackageKey {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for PackageKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Hashable for Environment {}

#[derive(Serialize)]
struct KeyInput<'a> {
  environment: &'a ObjectHash,
  source: String,
  name: &'a str,
  version: &'a str,
  build: Option<&'a str>,
  builds_in_source: bool,
  exported_env: BTreeMap<&'a str, EnvVarDecl>,
  dependencies: Vec<(&'a str, ObjectHash)>,
}

impl Hashable for KeyInput<'_> {}

#[derive(Serialize)]
struct SandboxKeyInput<'a> {
  environment: &'a ObjectHash,
  root: &'a ObjectHash,
}

impl Hashable for SandboxKeyInput<'_> {}

/// Derives package keys for one sandbox.
pub struct IdentityHasher<'a> {
  sandbox: &'a Sandbox,
  env_hash: ObjectHash,
  mode: KeyMode,
}

impl<'a> IdentityHasher<'a> {
  pub fn new(sandbox: &'a Sandbox, mode: KeyMode) -> Result<Self, KeyError> {
    Ok(Self {
      sandbox,
      env_hash: sandbox.env.compute_hash()?,
      mode,
    })
  }

  /// Key of `info`.
  pub fn key(&self, info: &PackageInfo) -> Result<PackageKey, KeyError> {
    let prefix = format!("{}-{}", info.normalized_name, info.descriptor.version_or_default());
    match self.mode {
      KeyMode::Deterministic => Ok(PackageKey(prefix)),
      KeyMode::Hashed => Ok(PackageKey(format!("{}-{}", prefix, self.hash(info)?))),
    }
  }

  /// Key of the sandbox package named `name`.
  pub fn key_for(&self, name: &str) -> Result<PackageKey, KeyError> {
    let info = self.sandbox.package(name).ok_or_else(|| KeyError::UnknownPackage {
      name: name.to_string(),
    })?;
    self.key(info)
  }

  /// Keys of every package in the sandbox, by name.
  pub fn keys(&self) -> Result<BTreeMap<String, PackageKey>, KeyError> {
    self
      .sandbox
      .packages_postorder()
      .into_iter()
      .map(|info| Ok((info.name().to_string(), self.key(info)?)))
      .collect()
  }

  /// Key identifying the whole sandbox: its environment and root package.
  pub fn sandbox_key(&self) -> Result<ObjectHash, KeyError> {
    let root = self.hash(&self.sandbox.root)?;
    Ok(
      SandboxKeyInput {
        environment: &self.env_hash,
        root: &root,
      }
      .compute_hash()?,
    )
  }

  fn hash(&self, info: &PackageInfo) -> Result<ObjectHash, KeyError> {
    if let Some(hash) = info.cached_hash.get() {
      return Ok(hash.clone());
    }

    let dependencies = info
      .dependency_tree
      .iter()
      .map(|(name, dep)| Ok((name.as_str(), self.hash(dep)?)))
      .collect::<Result<Vec<_>, KeyError>>()?;

    let config = &info.descriptor.config;
    let input = KeyInput {
      environment: &self.env_hash,
      source: self.source_identity(info),
      name: info.name(),
      version: info.descriptor.version_or_default(),
      build: info.descriptor.build_command(),
      builds_in_source: config.builds_in_source,
      exported_env: self.exported_env(info),
      dependencies,
    };
    let hash = input.compute_hash()?;
    trace!(package = %info.name(), hash = %hash, "computed package hash");

    let _ = info.cached_hash.set(hash.clone());
    Ok(hash)
  }

  /// Declared variables with absolute sandbox paths made relative.
  fn exported_env<'i>(&self, info: &'i PackageInfo) -> BTreeMap<&'i str, EnvVarDecl> {
    info
      .descriptor
      .config
      .exported_env
      .iter()
      .map(|(name, decl)| {
        let mut decl = decl.clone();
        decl.value = normalize_value(&decl.value, self.root_dir());
        (name.as_str(), decl)
      })
      .collect()
  }

  /// Local sources are identified relative to the sandbox so keys do not
  /// depend on where the sandbox is checked out.
  fn source_identity(&self, info: &PackageInfo) -> String {
    match info.source_kind {
      SourceKind::Remote => info.source.clone(),
      SourceKind::Local => format!("local:{}", relative_to_sandbox(&info.root_directory, self.root_dir())),
    }
  }

  fn root_dir(&self) -> &Path {
    self.sandbox.root_dir()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sandbox::ResolveOptions;
  use crate::util::testutil::SandboxFixture;

  async fn sandbox(fixture: &SandboxFixture) -> Sandbox {
    Sandbox::from_directory(fixture.path(), ResolveOptions::default())
      .await
      .unwrap()
  }

  fn diamond() -> SandboxFixture {
    let fixture = SandboxFixture::new(r#"{ "name": "app", "dependencies": { "left": "*", "right": "*" } }"#);
    fixture.install("left", r#"{ "name": "left", "dependencies": { "shared": "*" } }"#);
    fixture.install("right", r#"{ "name": "right", "dependencies": { "shared": "*" } }"#);
    fixture.install(
      "shared",
      r#"{ "name": "shared", "version": "2.1.0", "kiln": { "build": "make" } }"#,
    );
    fixture
  }

  mod format {
    use super::*;

    #[tokio::test]
    async fn key_has_name_version_and_hash() {
      let fixture = diamond();
      let sandbox = sandbox(&fixture).await;
      let hasher = IdentityHasher::new(&sandbox, KeyMode::Hashed).unwrap();

      let key = hasher.key_for("shared").unwrap();
      let (prefix, hash) = key.as_str().rsplit_once('-').unwrap();
      assert_eq!(prefix, "shared-2.1.0");
      assert_eq!(hash.len(), crate::consts::OBJ_HASH_PREFIX_LEN);
    }

    #[tokio::test]
    async fn missing_version_defaults() {
      let fixture = SandboxFixture::new(r#"{ "name": "@scope/my-app" }"#);
      let sandbox = sandbox(&fixture).await;
      let hasher = IdentityHasher::new(&sandbox, KeyMode::Deterministic).unwrap();

      assert_eq!(hasher.key(&sandbox.root).unwrap().as_str(), "scope_my_app-0.0.0");
    }

    #[tokio::test]
    async fn unknown_package_is_an_error() {
      let fixture = diamond();
      let sandbox = sandbox(&fixture).await;
      let hasher = IdentityHasher::new(&sandbox, KeyMode::Hashed).unwrap();

      assert!(matches!(
        hasher.key_for("nope"),
        Err(KeyError::UnknownPackage { name }) if name == "nope"
      ));
    }
  }

  mod stability {
    use super::*;

    #[tokio::test]
    async fn diamond_occurrences_share_a_key() {
      let fixture = diamond();
      let sandbox = sandbox(&fixture).await;
      let hasher = IdentityHasher::new(&sandbox, KeyMode::Hashed).unwrap();

      let via_left = &sandbox.root.dependency_tree["left"].dependency_tree["shared"];
      let via_right = &sandbox.root.dependency_tree["right"].dependency_tree["shared"];
      assert_eq!(hasher.key(via_left).unwrap(), hasher.key(via_right).unwrap());
    }

    #[tokio::test]
    async fn keys_survive_a_fresh_resolution() {
      let fixture = diamond();
      let first = sandbox(&fixture).await;
      let second = sandbox(&fixture).await;

      let a = IdentityHasher::new(&first, KeyMode::Hashed).unwrap().keys().unwrap();
      let b = IdentityHasher::new(&second, KeyMode::Hashed).unwrap().keys().unwrap();
      assert_eq!(a, b);
    }

    #[tokio::test]
    async fn keys_do_not_depend_on_sandbox_location() {
      let one = diamond();
      let two = diamond();
      let a = sandbox(&one).await;
      let b = sandbox(&two).await;

      let key_a = IdentityHasher::new(&a, KeyMode::Hashed).unwrap().key_for("app").unwrap();
      let key_b = IdentityHasher::new(&b, KeyMode::Hashed).unwrap().key_for("app").unwrap();
      assert_eq!(key_a, key_b);
    }

    #[tokio::test]
    async fn exported_sandbox_paths_do_not_depend_on_location() {
      let with_lib = || {
        let fixture = SandboxFixture::new(r#"{ "name": "app", "dependencies": { "lib": "*" } }"#);
        let include = fixture.path().join("node_modules/lib/include");
        fixture.install(
          "lib",
          &format!(
            r#"{{ "name": "lib", "kiln": {{ "exportedEnv": {{ "LIB__INC": {{ "val": "{}" }} }} }} }}"#,
            include.display()
          ),
        );
        fixture
      };
      let one = with_lib();
      let two = with_lib();
      let a = sandbox(&one).await;
      let b = sandbox(&two).await;

      let key_a = IdentityHasher::new(&a, KeyMode::Hashed).unwrap().key_for("lib").unwrap();
      let key_b = IdentityHasher::new(&b, KeyMode::Hashed).unwrap().key_for("lib").unwrap();
      assert_eq!(key_a, key_b);
    }

    #[tokio::test]
    async fn dependency_change_propagates_to_dependents() {
      let one = diamond();
      let two = diamond();
      two.install(
        "shared",
        r#"{ "name": "shared", "version": "2.1.0", "kiln": { "build": "make install" } }"#,
      );
      let a = sandbox(&one).await;
      let b = sandbox(&two).await;

      let hash_a = IdentityHasher::new(&a, KeyMode::Hashed).unwrap();
      let hash_b = IdentityHasher::new(&b, KeyMode::Hashed).unwrap();
      assert_ne!(hash_a.key_for("left").unwrap(), hash_b.key_for("left").unwrap());
      assert_ne!(hash_a.sandbox_key().unwrap(), hash_b.sandbox_key().unwrap());
    }
  }
}
