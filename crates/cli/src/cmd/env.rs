use anyhow::Result;

use kiln_lib::env::{EnvOptions, EnvironmentComputer, EnvironmentReport};

use super::{Context, load_sandbox};
use crate::output::{print_diagnostics, print_json};

pub async fn cmd_env(ctx: &Context, absolute: bool) -> Result<()> {
  let sandbox = load_sandbox(ctx).await?;
  print_diagnostics(sandbox.diagnostics());

  let options = EnvOptions { relocatable: !absolute };
  let env = EnvironmentComputer::new(&sandbox, options).compute();
  let report = EnvironmentReport::new(&env);

  if ctx.format.is_json() {
    print_json(&report)?;
  } else {
    print!("{}", report);
  }
  Ok(())
}
