use std::path::PathBuf;

use crate::consts::{APP_NAME, STORE_VAR, TEST_VAR};
use crate::platform::paths::home_dir;

/// Top-level trees of a store or sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTree {
  Install,
  Build,
  Logs,
}

impl StoreTree {
  pub const ALL: [StoreTree; 3] = [StoreTree::Install, StoreTree::Build, StoreTree::Logs];

  pub fn dir_name(&self) -> &'static str {
    match self {
      StoreTree::Install => "_install",
      StoreTree::Build => "_build",
      StoreTree::Logs => "_logs",
    }
  }
}

/// Run-wide location settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
  pub store: PathBuf,
  /// Pin platform names and drop key hashes for reproducible output.
  pub deterministic: bool,
}

impl StorePaths {
  pub fn current() -> Self {
    Self {
      store: Self::store_path(),
      deterministic: Self::deterministic(),
    }
  }

  pub fn store_path() -> PathBuf {
    if let Ok(path) = std::env::var(STORE_VAR) {
      return PathBuf::from(path);
    }

    Self::default_store_path()
  }

  /// `$HOME/.kiln/store`, or a relative `.kiln/store` when no home is known.
  pub fn default_store_path() -> PathBuf {
    home_dir()
      .unwrap_or_default()
      .join(format!(".{}", APP_NAME))
      .join("store")
  }

  pub fn deterministic() -> bool {
    std::env::var_os(TEST_VAR).is_some_and(|v| !v.is_empty())
  }
}
