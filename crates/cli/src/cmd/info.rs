use anyhow::Result;

use kiln_lib::platform::{Platform, host_names};
use kiln_lib::store::StorePaths;

use super::Context;
use crate::output::{print_json, print_stat};

pub fn cmd_info(ctx: &Context) -> Result<()> {
  let store = StorePaths::current();
  let platform = Platform::current().map(|p| p.triple());
  let (os, arch) = host_names(ctx.deterministic);

  if ctx.format.is_json() {
    let value = serde_json::json!({
      "platform": platform,
      "os": os,
      "architecture": arch,
      "store": store.store.display().to_string(),
      "deterministic": ctx.deterministic,
    });
    return print_json(&value);
  }

  println!("System:");
  match platform {
    Some(triple) => print_stat("Platform", &triple),
    None => print_stat("Platform", "unknown"),
  }
  print_stat("OS", &os);
  print_stat("Architecture", &arch);
  print_stat("Store", &store.store.display().to_string());
  print_stat("Deterministic", &ctx.deterministic.to_string());
  Ok(())
}
