use anyhow::{Context as _, Result};

use kiln_lib::identity::{IdentityHasher, KeyMode};

use super::{Context, load_sandbox};
use crate::output::{print_diagnostics, print_info, print_json, print_stat, symbols};

pub async fn cmd_key(ctx: &Context) -> Result<()> {
  let sandbox = load_sandbox(ctx).await?;
  print_diagnostics(sandbox.diagnostics());

  let hasher = IdentityHasher::new(&sandbox, KeyMode::for_sandbox(&sandbox)).context("Failed to hash sandbox")?;
  let sandbox_key = hasher.sandbox_key().context("Failed to compute sandbox key")?;
  let keys = hasher.keys().context("Failed to compute package keys")?;

  if ctx.format.is_json() {
    print_json(&serde_json::json!({ "sandbox": sandbox_key, "packages": keys }))?;
  } else {
    print_info(&format!("Sandbox {} {}", symbols::ARROW, sandbox_key));
    for (name, key) in &keys {
      print_stat(name, key.as_str());
    }
  }
  Ok(())
}
