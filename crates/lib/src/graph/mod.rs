//! Build graph emission.
//!
//! [`BuildGraphEmitter`] turns a resolved sandbox into structured rule data: a
//! prelude of raw lines and environment macros, and an ordered list of rules
//! and generated files. Rendering that data as a Makefile lives in [`render`].
//!
//! # Targets
//!
//! Every package contributes `<name>.build`, `<name>.rebuild`, `<name>.clean`
//! and `<name>.shell`. Packages with a build command also get
//! `<name>.<config-file>`, which writes the library-path configuration file
//! their build reads. The root package's targets are aliased as the top-level
//! `build`, `rebuild`, `shell` and `clean`.
//!
//! Rules are emitted in dependency order, and each package name is emitted
//! once even if it occurs at several places in the tree.

pub mod render;

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{APP_NAME, LIB_CONFIG_FILENAME, MODULES_DIRNAME, SANDBOX_VAR, STORE_VAR};
use crate::env::SandboxEnvironment;
use crate::env::path::relative_to_sandbox;
use crate::identity::{IdentityHasher, KeyError, PackageKey};
use crate::sandbox::{PackageInfo, Sandbox};
use crate::store::StoreTree;

pub use render::render_makefile;

#[derive(Debug, Error)]
pub enum EmitError {
  /// A package refers to a dependency the emitter has not seen. The tree is
  /// inconsistent; this is a bug in whatever built it.
  #[error("package {package} depends on unknown package {name}")]
  UnknownPackage { package: String, name: String },

  #[error(transparent)]
  Key(#[from] KeyError),

  #[error("cycle detected in build graph")]
  CycleDetected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOptions {
  /// Install non-root packages into the shared store rather than the sandbox.
  pub build_in_store: bool,
  /// Name of the generated library-path configuration file.
  pub lib_config_file: String,
}

impl Default for EmitOptions {
  fn default() -> Self {
    Self {
      build_in_store: true,
      lib_config_file: LIB_CONFIG_FILENAME.to_string(),
    }
  }
}

/// One build rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
  pub target: String,
  pub dependencies: Vec<String>,
  /// Recipe body, one shell line per line.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub command: Option<String>,
}

impl Rule {
  fn new(target: impl Into<String>, dependencies: Vec<String>) -> Self {
    Self {
      target: target.into(),
      dependencies,
      command: None,
    }
  }

  fn with_command(mut self, command: impl Into<String>) -> Self {
    self.command = Some(command.into());
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphItem {
  /// A line copied into the output verbatim.
  Raw { value: String },
  /// A named multi-line macro.
  Define { name: String, value: String },
  /// A file written by the target of the same name.
  File { target: String, content: String },
  Rule(Rule),
}

/// Summary of one package in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPackage {
  pub name: String,
  pub key: PackageKey,
  pub install: String,
  pub has_build: bool,
  /// Names of direct dependencies.
  pub dependencies: Vec<String>,
}

/// The emitted plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildGraph {
  pub prelude: Vec<GraphItem>,
  pub items: Vec<GraphItem>,
  /// Packages in emission order.
  pub packages: Vec<PlannedPackage>,
}

impl BuildGraph {
  pub fn rules(&self) -> impl Iterator<Item = &Rule> {
    self.items.iter().filter_map(|item| match item {
      GraphItem::Rule(rule) => Some(rule),
      _ => None,
    })
  }

  pub fn rule(&self, target: &str) -> Option<&Rule> {
    self.rules().find(|rule| rule.target == target)
  }

  /// Position of `target` among the rules.
  pub fn position(&self, target: &str) -> Option<usize> {
    self.rules().position(|rule| rule.target == target)
  }

  /// Package names grouped into waves that could build in parallel.
  ///
  /// Every package's dependencies are in earlier waves.
  pub fn waves(&self) -> Result<Vec<Vec<String>>, EmitError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for package in &self.packages {
      nodes.insert(&package.name, graph.add_node(&package.name));
    }
    for package in &self.packages {
      let dependent = nodes[package.name.as_str()];
      for dep in &package.dependencies {
        let Some(&dependency) = nodes.get(dep.as_str()) else {
          return Err(EmitError::UnknownPackage {
            package: package.name.clone(),
            name: dep.clone(),
          });
        };
        graph.add_edge(dependency, dependent, ());
      }
    }

    let sorted = toposort(&graph, None).map_err(|_| EmitError::CycleDetected)?;

    let mut level: HashMap<NodeIndex, usize> = HashMap::new();
    for idx in sorted {
      let wave = graph
        .neighbors_directed(idx, Direction::Incoming)
        .map(|dep| level[&dep] + 1)
        .max()
        .unwrap_or(0);
      level.insert(idx, wave);
    }

    let mut waves: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (idx, wave) in level {
      waves.entry(wave).or_default().push(graph[idx].to_string());
    }
    Ok(
      waves
        .into_values()
        .map(|mut names| {
          names.sort();
          names
        })
        .collect(),
    )
  }
}

const STORE_TARGET: &str = "kiln-store";

/// Emits the [`BuildGraph`] of a sandbox.
pub struct BuildGraphEmitter<'a> {
  sandbox: &'a Sandbox,
  env: &'a SandboxEnvironment,
  hasher: &'a IdentityHasher<'a>,
  options: EmitOptions,
}

impl<'a> BuildGraphEmitter<'a> {
  pub fn new(
    sandbox: &'a Sandbox,
    env: &'a SandboxEnvironment,
    hasher: &'a IdentityHasher<'a>,
    options: EmitOptions,
  ) -> Self {
    Self {
      sandbox,
      env,
      hasher,
      options,
    }
  }

  pub fn emit(&self) -> Result<BuildGraph, EmitError> {
    let root_name = self.sandbox.root.name();
    let mut graph = BuildGraph {
      prelude: self.prelude(),
      items: self.root_items(root_name),
      packages: Vec::new(),
    };

    let mut emitted: HashSet<&str> = HashSet::new();
    for info in self.sandbox.packages_postorder() {
      for dep in info.dependencies() {
        if !emitted.contains(dep.name()) {
          return Err(EmitError::UnknownPackage {
            package: info.name().to_string(),
            name: dep.name().to_string(),
          });
        }
      }
      self.emit_package(info, &mut graph)?;
      emitted.insert(info.name());
    }

    info!(
      packages = graph.packages.len(),
      rules = graph.rules().count(),
      "emitted build graph"
    );
    Ok(graph)
  }

  fn prelude(&self) -> Vec<GraphItem> {
    let shell = self.sandbox.env.get("SHELL").cloned().unwrap_or_default();
    vec![
      GraphItem::Raw {
        value: format!("SHELL = {}", shell),
      },
      GraphItem::Raw {
        value: format!("{} ?= $(HOME)/.{}/store", STORE_VAR, APP_NAME),
      },
      GraphItem::Raw {
        value: format!("{} ?= $(CURDIR)", SANDBOX_VAR),
      },
      GraphItem::Raw {
        value: format!(".PHONY: build rebuild shell clean {}", STORE_TARGET),
      },
    ]
  }

  fn root_items(&self, root_name: &str) -> Vec<GraphItem> {
    let store_dirs: Vec<String> = StoreTree::ALL
      .iter()
      .map(|tree| format!("$({})/{}", STORE_VAR, tree.dir_name()))
      .collect();

    vec![
      GraphItem::Rule(Rule::new("build", vec![format!("{}.build", root_name)])),
      GraphItem::Rule(Rule::new("rebuild", vec![format!("{}.rebuild", root_name)])),
      GraphItem::Rule(Rule::new("shell", vec![format!("{}.shell", root_name)])),
      GraphItem::Rule(Rule::new("clean", Vec::new()).with_command(format!(
        "rm -rf $({sandbox})/{build} $({sandbox})/{install}",
        sandbox = SANDBOX_VAR,
        build = StoreTree::Build.dir_name(),
        install = StoreTree::Install.dir_name(),
      ))),
      GraphItem::Rule(Rule::new(store_dirs.join(" "), Vec::new()).with_command("mkdir -p $(@)")),
      GraphItem::Rule(Rule::new(STORE_TARGET, store_dirs)),
    ]
  }

  fn emit_package(&self, info: &PackageInfo, graph: &mut BuildGraph) -> Result<(), EmitError> {
    let name = info.name();
    let key = self.hasher.key(info)?;
    let build = info.descriptor.build_command();
    let macro_name = format!("{}__ENV", info.normalized_name);
    debug!(package = %name, key = %key, "emitting package rules");

    graph.prelude.push(GraphItem::Define {
      name: macro_name.clone(),
      value: self.environment_macro(info, &key)?,
    });

    let wrap = |command: &str| {
      [
        format!("export {}=$({});", STORE_VAR, STORE_VAR),
        format!("export {}=$({});", SANDBOX_VAR, SANDBOX_VAR),
        format!("export cur__install_key=\"{}\";", key),
        format!("$({})", macro_name),
        "cd $cur__root;".to_string(),
        command.to_string(),
      ]
      .join(" \\\n")
    };
    let package_rule = |target: &str, mut dependencies: Vec<String>, command: Option<&str>| {
      dependencies.insert(0, STORE_TARGET.to_string());
      let rule = Rule::new(format!("{}.{}", name, target), dependencies);
      GraphItem::Rule(match command {
        Some(command) => rule.with_command(wrap(command)),
        None => rule,
      })
    };

    let dep_builds: Vec<String> = info.dependencies().map(|dep| format!("{}.build", dep.name())).collect();

    if build.is_some() {
      let config_path = self.target_path(info, StoreTree::Build, &[&self.options.lib_config_file])?;
      graph.items.push(GraphItem::File {
        target: config_path.clone(),
        content: self.lib_config(info)?,
      });
      graph
        .items
        .push(package_rule(&self.options.lib_config_file, vec![config_path], None));
    }

    graph.items.push(package_rule(
      "clean",
      Vec::new(),
      Some("rm -rf $cur__install $cur__target_dir"),
    ));
    graph
      .items
      .push(package_rule("shell", dep_builds.clone(), Some("bash --norc --noprofile")));

    match build {
      Some(command) => {
        let mut dependencies = vec![format!("{}.{}", name, self.options.lib_config_file)];
        dependencies.extend(dep_builds.iter().cloned());
        let command = if info.descriptor.config.builds_in_source {
          in_source(command)
        } else {
          command.to_string()
        };
        graph.items.push(package_rule(
          "build",
          dependencies.clone(),
          Some(&build_once(name, &command)),
        ));
        graph
          .items
          .push(package_rule("rebuild", dependencies, Some(&rebuild(&command))));
      }
      None => {
        graph.items.push(package_rule("build", dep_builds.clone(), None));
        graph.items.push(package_rule("rebuild", dep_builds, None));
      }
    }

    graph.packages.push(PlannedPackage {
      name: name.to_string(),
      install: self.target_path(info, StoreTree::Install, &[])?,
      key,
      has_build: build.is_some(),
      dependencies: info.dependencies().map(|dep| dep.name().to_string()).collect(),
    });
    Ok(())
  }

  /// Shell exports making up a package's build environment.
  fn environment_macro(&self, info: &PackageInfo, key: &PackageKey) -> Result<String, EmitError> {
    let mut bindings: Vec<(String, String)> = self
      .sandbox
      .env
      .iter()
      .map(|(name, value)| (name.clone(), value.clone()))
      .collect();

    bindings.extend([
      ("cur__name".to_string(), info.name().to_string()),
      ("cur__version".to_string(), info.descriptor.version_or_default().to_string()),
      (
        "cur__root".to_string(),
        relative_to_sandbox(&info.root_directory, self.sandbox.root_dir()),
      ),
      ("cur__install".to_string(), self.target_path(info, StoreTree::Install, &[])?),
      ("cur__target_dir".to_string(), self.target_path(info, StoreTree::Build, &[])?),
      ("cur__install_key".to_string(), key.to_string()),
    ]);

    let transitive = info.transitive_dependencies();
    for dep in transitive.iter().rev() {
      bindings.extend(
        self
          .env
          .builtins(dep.name())
          .map(|var| (var.name.clone(), var.value.clone())),
      );
    }

    if let Some(group) = self.env.group(info.name()) {
      bindings.extend(
        group
          .resolved()
          .into_iter()
          .map(|var| (var.name.clone(), var.value.clone())),
      );
    }

    if !transitive.is_empty() {
      let bins = transitive
        .iter()
        .map(|dep| self.target_path(dep, StoreTree::Install, &["bin"]))
        .collect::<Result<Vec<_>, _>>()?;
      bindings.push(("PATH".to_string(), format!("{}:$PATH", bins.join(":"))));
    }

    Ok(
      bindings
        .iter()
        .map(|(name, value)| format!("export {}=\"{}\";", name, value))
        .collect::<Vec<_>>()
        .join(" \\\n"),
    )
  }

  fn lib_config(&self, info: &PackageInfo) -> Result<String, EmitError> {
    let search = info
      .transitive_dependencies()
      .into_iter()
      .map(|dep| self.target_path(dep, StoreTree::Install, &["lib"]))
      .collect::<Result<Vec<_>, _>>()?;
    let destdir = self.target_path(info, StoreTree::Install, &["lib"])?;
    Ok(format!("path = \"{}\"\ndestdir = \"{}\"", search.join(":"), destdir))
  }

  /// Location of `info` in `tree`, written in terms of make variables.
  fn target_path(&self, info: &PackageInfo, tree: StoreTree, rest: &[&str]) -> Result<String, EmitError> {
    let mut segments: Vec<String> = if info.name() == self.sandbox.root.name() {
      vec![format!("$({})", SANDBOX_VAR), tree.dir_name().to_string()]
    } else if self.options.build_in_store {
      vec![
        format!("$({})", STORE_VAR),
        tree.dir_name().to_string(),
        self.hasher.key(info)?.to_string(),
      ]
    } else {
      vec![
        format!("$({})", SANDBOX_VAR),
        tree.dir_name().to_string(),
        MODULES_DIRNAME.to_string(),
        info.name().to_string(),
      ]
    };
    segments.extend(rest.iter().map(|s| s.to_string()));
    Ok(segments.join("/"))
  }
}

fn build_once(name: &str, command: &str) -> String {
  format!(
    "if [ -d \"$cur__install\" ]; then echo \"{name} is already built\"; else \\\n\
     mkdir -p \"$cur__install\" \"$cur__target_dir\" && ({command}) || {{ rm -rf \"$cur__install\"; exit 1; }}; \\\n\
     fi"
  )
}

/// Packages that build in their source tree get a private copy of it under
/// `$cur__target_dir`, so the checkout itself is never written or cleaned.
fn in_source(command: &str) -> String {
  format!("cp -R \"$cur__root/.\" \"$cur__target_dir\" && cd \"$cur__target_dir\" && {command}")
}

fn rebuild(command: &str) -> String {
  format!("rm -rf \"$cur__install\" && mkdir -p \"$cur__install\" \"$cur__target_dir\" && ({command})")
}
