//! Implementation of the `kiln plan` command.
//!
//! Prints the structured build graph as JSON for executors that do not speak
//! make.

use anyhow::{Context as _, Result};
use serde::Serialize;

use kiln_lib::env::EnvOptions;
use kiln_lib::graph::{BuildGraph, BuildGraphEmitter, EmitOptions};
use kiln_lib::identity::{IdentityHasher, KeyMode};

use super::{Context, load_environment};
use crate::output::print_json;

#[derive(Serialize)]
struct PlanOutput<'a> {
  sandbox_key: String,
  waves: Vec<Vec<String>>,
  #[serde(flatten)]
  graph: &'a BuildGraph,
}

pub async fn cmd_plan(ctx: &Context, strict: bool) -> Result<()> {
  let (sandbox, env) = load_environment(ctx, EnvOptions::default(), strict).await?;

  let hasher = IdentityHasher::new(&sandbox, KeyMode::for_sandbox(&sandbox)).context("Failed to hash sandbox")?;
  let graph = BuildGraphEmitter::new(&sandbox, &env, &hasher, EmitOptions::default())
    .emit()
    .context("Failed to emit build graph")?;

  print_json(&PlanOutput {
    sandbox_key: hasher.sandbox_key().context("Failed to compute sandbox key")?.0,
    waves: graph.waves().context("Failed to order build graph")?,
    graph: &graph,
  })
}
