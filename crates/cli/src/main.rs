use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

use cmd::{Context, cmd_build_eject, cmd_env, cmd_info, cmd_key, cmd_plan};
use kiln_lib::store::StorePaths;
use output::OutputFormat;

/// kiln - plan hermetic package builds from a dependency tree
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Pin host-specific values and omit hashes from package keys
  #[arg(long, global = true)]
  deterministic: bool,

  /// Sandbox directory containing the root manifest
  #[arg(long, global = true, default_value = ".")]
  sandbox: PathBuf,

  /// Output format
  #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  format: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the environment every package exports
  Env {
    /// Keep absolute paths instead of writing them relative to the sandbox
    #[arg(long)]
    absolute: bool,
  },

  /// Render the build plan as a Makefile
  BuildEject {
    /// Write the Makefile here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Install dependencies inside the sandbox instead of the shared store
    #[arg(long)]
    no_store: bool,

    /// Fail if resolution or environment errors were found
    #[arg(long)]
    strict: bool,
  },

  /// Print the structured build plan as JSON
  Plan {
    /// Fail if resolution or environment errors were found
    #[arg(long)]
    strict: bool,
  },

  /// Print the sandbox key and every package key
  Key,

  /// Show host platform and store information
  Info,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let ctx = Context {
    sandbox: cli.sandbox,
    deterministic: cli.deterministic || StorePaths::deterministic(),
    format: cli.format,
  };
  debug!(sandbox = %ctx.sandbox.display(), deterministic = ctx.deterministic, "starting kiln");

  match cli.command {
    Commands::Env { absolute } => cmd_env(&ctx, absolute).await,
    Commands::BuildEject {
      output,
      no_store,
      strict,
    } => cmd_build_eject(&ctx, output.as_deref(), no_store, strict).await,
    Commands::Plan { strict } => cmd_plan(&ctx, strict).await,
    Commands::Key => cmd_key(&ctx).await,
    Commands::Info => cmd_info(&ctx),
  }
}
