//! Package manifest ingestion.
//!
//! Every package directory carries one manifest describing its name, version,
//! dependency requirements and build configuration. This module parses it into
//! a [`PackageDescriptor`], converting dynamic fields such as scope strings into
//! typed values so the rest of the crate never handles raw strings.

mod types;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

pub use types::*;

/// Errors that can occur while reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  /// The manifest file could not be read.
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The manifest is not valid JSON or has malformed fields.
  #[error("failed to parse manifest {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// The manifest has no package name.
  #[error("no package name declared in {path}")]
  MissingName { path: PathBuf },
}

impl ManifestError {
  /// Path of the manifest that failed.
  pub fn path(&self) -> &Path {
    match self {
      ManifestError::Read { path, .. } | ManifestError::Parse { path, .. } | ManifestError::MissingName { path } => path,
    }
  }
}

/// Parse manifest contents, attributing errors to `path`.
pub fn parse_manifest(contents: &str, path: &Path) -> Result<PackageDescriptor, ManifestError> {
  let descriptor: PackageDescriptor = serde_json::from_str(contents).map_err(|e| ManifestError::Parse {
    path: path.to_path_buf(),
    source: e,
  })?;

  if descriptor.name.trim().is_empty() {
    return Err(ManifestError::MissingName {
      path: path.to_path_buf(),
    });
  }

  Ok(descriptor)
}

/// Read and parse the manifest at `path`.
pub async fn read_manifest(path: &Path) -> Result<PackageDescriptor, ManifestError> {
  trace!(path = %path.display(), "reading manifest");
  let contents = tokio::fs::read_to_string(path).await.map_err(|e| ManifestError::Read {
    path: path.to_path_buf(),
    source: e,
  })?;
  parse_manifest(&contents, path)
}
