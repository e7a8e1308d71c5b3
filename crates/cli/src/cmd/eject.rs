//! Implementation of the `kiln build-eject` command.
//!
//! Plans the sandbox and renders the result as a Makefile that builds every
//! package without kiln installed.

use std::fs;
use std::path::Path;

use anyhow::{Context as _, Result};

use kiln_lib::env::EnvOptions;
use kiln_lib::graph::{BuildGraphEmitter, EmitOptions, render_makefile};
use kiln_lib::identity::{IdentityHasher, KeyMode};

use super::{Context, load_environment};
use crate::output::print_success;

pub async fn cmd_build_eject(ctx: &Context, output: Option<&Path>, no_store: bool, strict: bool) -> Result<()> {
  let (sandbox, env) = load_environment(ctx, EnvOptions::default(), strict).await?;

  let hasher = IdentityHasher::new(&sandbox, KeyMode::for_sandbox(&sandbox)).context("Failed to hash sandbox")?;
  let options = EmitOptions {
    build_in_store: !no_store,
    ..EmitOptions::default()
  };
  let graph = BuildGraphEmitter::new(&sandbox, &env, &hasher, options)
    .emit()
    .context("Failed to emit build graph")?;
  let makefile = render_makefile(&graph);

  match output {
    Some(path) => {
      fs::write(path, &makefile).with_context(|| format!("Failed to write Makefile: {}", path.display()))?;
      print_success(&format!(
        "Wrote {} package(s) to {}",
        graph.packages.len(),
        path.display()
      ));
    }
    None => print!("{}", makefile),
  }
  Ok(())
}
