//! Manifest types for kiln.
//!
//! A [`PackageDescriptor`] is the parsed form of one package manifest. Only the
//! fields the planner needs are modelled; everything else in the file is ignored.
//!
//! # Example
//!
//! ```json
//! {
//!   "name": "lib",
//!   "version": "1.0.0",
//!   "dependencies": { "dep": "*" },
//!   "kiln": {
//!     "build": "make && make install",
//!     "exportedEnv": {
//!       "LIB__INCLUDE": { "val": "$LIB__ROOT/include", "scope": "export" }
//!     }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::consts::NAMESPACE_SEPARATOR;

/// Visibility of an exported environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
  /// Visible only to the declaring package's own build.
  Local,
  /// Forwarded to packages that directly depend on the declaring package.
  Export,
  /// Visible to every package in the graph.
  Global,
}

impl Scope {
  const ALL: [Scope; 3] = [Scope::Local, Scope::Export, Scope::Global];

  pub fn as_str(&self) -> &'static str {
    match self {
      Scope::Local => "local",
      Scope::Export => "export",
      Scope::Global => "global",
    }
  }

  fn bit(self) -> u8 {
    match self {
      Scope::Local => 0b001,
      Scope::Export => 0b010,
      Scope::Global => 0b100,
    }
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// A set of [`Scope`]s, parsed from a `|`-joined string such as `"export|global"`.
///
/// An empty or missing scope string means [`Scope::Local`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeSet(u8);

impl ScopeSet {
  pub const fn empty() -> Self {
    ScopeSet(0)
  }

  pub fn local() -> Self {
    Self::from_scopes(&[Scope::Local])
  }

  pub fn from_scopes(scopes: &[Scope]) -> Self {
    let mut set = Self::empty();
    for scope in scopes {
      set.insert(*scope);
    }
    set
  }

  pub fn insert(&mut self, scope: Scope) {
    self.0 |= scope.bit();
  }

  pub fn contains(&self, scope: Scope) -> bool {
    self.0 & scope.bit() != 0
  }

  pub fn is_empty(&self) -> bool {
    self.0 == 0
  }

  pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
    Scope::ALL.into_iter().filter(|s| self.contains(*s))
  }
}

impl Default for ScopeSet {
  fn default() -> Self {
    Self::local()
  }
}

impl fmt::Debug for ScopeSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_set().entries(self.iter()).finish()
  }
}

impl fmt::Display for ScopeSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<&str> = self.iter().map(|s| s.as_str()).collect();
    write!(f, "{}", parts.join("|"))
  }
}

/// Error for an unrecognised scope token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scope '{0}' (expected local, export or global)")]
pub struct ScopeParseError(pub String);

impl FromStr for ScopeSet {
  type Err = ScopeParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut set = ScopeSet::empty();
    for token in s.split('|').map(str::trim).filter(|t| !t.is_empty()) {
      let scope = match token {
        "local" => Scope::Local,
        "export" => Scope::Export,
        "global" => Scope::Global,
        other => return Err(ScopeParseError(other.to_string())),
      };
      set.insert(scope);
    }
    if set.is_empty() {
      set.insert(Scope::Local);
    }
    Ok(set)
  }
}

impl Serialize for ScopeSet {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for ScopeSet {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
  }
}

/// An exported environment variable declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVarDecl {
  /// The variable value. May reference other variables (`$LIB__ROOT/bin`).
  #[serde(rename = "val")]
  pub value: String,

  #[serde(default)]
  pub scope: ScopeSet,

  /// Whether this package must be the only one in the graph declaring the name.
  #[serde(default)]
  pub exclusive: bool,

  /// Marks the declaration as a built-in for reporting purposes.
  #[serde(default)]
  pub builtin: bool,

  /// A misspelled `scopes` field. Kept only so it can be reported.
  #[serde(default, skip_serializing)]
  pub scopes: Option<serde_json::Value>,
}

impl EnvVarDecl {
  pub fn new(value: impl Into<String>, scope: ScopeSet) -> Self {
    Self {
      value: value.into(),
      scope,
      exclusive: false,
      builtin: false,
      scopes: None,
    }
  }

  pub fn exclusive(mut self) -> Self {
    self.exclusive = true;
    self
  }
}

/// The build section of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
  /// Shell command building and installing the package.
  #[serde(default)]
  pub build: Option<String>,

  /// Whether the package must be built inside its own source directory.
  #[serde(default)]
  pub builds_in_source: bool,

  #[serde(default)]
  pub exported_env: BTreeMap<String, EnvVarDecl>,
}

/// How a dependency was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
  Regular,
  Peer,
  Conditional,
  Optional,
}

/// A single dependency requirement of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
  pub kind: DependencyKind,
  pub name: String,
  pub requirement: String,
}

/// A parsed package manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDescriptor {
  #[serde(default)]
  pub name: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,

  #[serde(default)]
  pub dependencies: BTreeMap<String, String>,

  #[serde(default)]
  pub peer_dependencies: BTreeMap<String, String>,

  #[serde(default)]
  pub conditional_dependencies: BTreeMap<String, String>,

  #[serde(default)]
  pub optional_dependencies: BTreeMap<String, String>,

  /// Remote locator recorded by the installer, if the package came from a registry.
  #[serde(default, rename = "_resolved", skip_serializing_if = "Option::is_none")]
  pub resolved: Option<String>,

  #[serde(default, rename = "kiln")]
  pub config: BuildConfig,
}

impl PackageDescriptor {
  /// Create a descriptor with only a name, mostly useful in tests.
  pub fn named(name: &str) -> Self {
    Self {
      name: name.to_string(),
      version: None,
      dependencies: BTreeMap::new(),
      peer_dependencies: BTreeMap::new(),
      conditional_dependencies: BTreeMap::new(),
      optional_dependencies: BTreeMap::new(),
      resolved: None,
      config: BuildConfig::default(),
    }
  }

  /// All dependency requirements, merged in priority order
  /// regular, peer, conditional, optional.
  ///
  /// A name declared under several kinds keeps its first occurrence.
  pub fn dependencies(&self) -> Vec<Dependency> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    let groups = [
      (DependencyKind::Regular, &self.dependencies),
      (DependencyKind::Peer, &self.peer_dependencies),
      (DependencyKind::Conditional, &self.conditional_dependencies),
      (DependencyKind::Optional, &self.optional_dependencies),
    ];

    for (kind, deps) in groups {
      for (name, requirement) in deps {
        if seen.insert(name.clone()) {
          result.push(Dependency {
            kind,
            name: name.clone(),
            requirement: requirement.clone(),
          });
        }
      }
    }

    result
  }

  /// The build command, ignoring blank strings.
  pub fn build_command(&self) -> Option<&str> {
    self.config.build.as_deref().filter(|cmd| !cmd.trim().is_empty())
  }

  pub fn version_or_default(&self) -> &str {
    self.version.as_deref().unwrap_or("0.0.0")
  }

  /// Identifier-safe form of the package name (`@scope/my-pkg` -> `scope_my_pkg`).
  pub fn normalized_name(&self) -> String {
    normalize_name(&self.name)
  }

  /// Prefix every non-global exported variable of this package must start with
  /// (`my-pkg` -> `MY_PKG__`).
  pub fn env_prefix(&self) -> String {
    format!("{}{}", self.name.replace('-', "_").to_uppercase(), NAMESPACE_SEPARATOR)
  }
}

pub fn normalize_name(name: &str) -> String {
  name.to_lowercase().replace('@', "").replace(['/', '-'], "_")
}
