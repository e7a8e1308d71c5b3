//! Command implementations.
//!
//! Each command resolves the sandbox, runs whichever planning stages it needs
//! and prints the result. Diagnostics always go to stderr.

mod eject;
mod env;
mod info;
mod key;
mod plan;

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};

use kiln_lib::env::{EnvOptions, EnvironmentComputer, SandboxEnvironment};
use kiln_lib::sandbox::{ResolveOptions, Sandbox};

use crate::output::{OutputFormat, print_diagnostics};

pub use eject::cmd_build_eject;
pub use env::cmd_env;
pub use info::cmd_info;
pub use key::cmd_key;
pub use plan::cmd_plan;

/// Options shared by every command.
pub struct Context {
  pub sandbox: PathBuf,
  pub deterministic: bool,
  pub format: OutputFormat,
}

pub async fn load_sandbox(ctx: &Context) -> Result<Sandbox> {
  let options = ResolveOptions {
    deterministic: ctx.deterministic,
  };
  Sandbox::from_directory(&ctx.sandbox, options)
    .await
    .with_context(|| format!("Failed to resolve sandbox: {}", ctx.sandbox.display()))
}

/// Resolve the sandbox and compute its environment, reporting diagnostics.
///
/// With `strict`, any error diagnostic fails the command.
pub async fn load_environment(ctx: &Context, options: EnvOptions, strict: bool) -> Result<(Sandbox, SandboxEnvironment)> {
  let sandbox = load_sandbox(ctx).await?;
  let env = EnvironmentComputer::new(&sandbox, options).compute();

  let errors = print_diagnostics(sandbox.diagnostics().into_iter().chain(env.diagnostics()));
  if strict && errors > 0 {
    bail!("{} error(s) found while planning", errors);
  }
  Ok((sandbox, env))
}
