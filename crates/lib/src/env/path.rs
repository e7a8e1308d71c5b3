//! Sandbox-relative paths.
//!
//! Plans are meant to run on hosts other than the one that produced them, so
//! paths inside the sandbox are written relative to `$KILN__SANDBOX`. Paths
//! that leave the sandbox are kept as they are.

use std::path::{Component, Path};

use crate::consts::SANDBOX_VAR;

/// Express `path` relative to `sandbox_root`.
///
/// If the real path of `path` lies inside `sandbox_root` the result is
/// `$KILN__SANDBOX/<relative>` (or `$KILN__SANDBOX` for the root itself).
/// Otherwise `path` is returned unchanged, symlinks and all.
pub fn relative_to_sandbox(path: &Path, sandbox_root: &Path) -> String {
  let real = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

  match real.strip_prefix(sandbox_root) {
    Ok(relative) => {
      let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
          Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
          _ => None,
        })
        .collect();
      if segments.is_empty() {
        format!("${}", SANDBOX_VAR)
      } else {
        format!("${}/{}", SANDBOX_VAR, segments.join("/"))
      }
    }
    Err(_) => path.display().to_string(),
  }
}

/// Rewrite a declared value if it is an absolute path.
///
/// Values that merely reference other variables (`$LIB__ROOT/include`) or are
/// not paths at all pass through untouched.
pub fn normalize_value(value: &str, sandbox_root: &Path) -> String {
  let path = Path::new(value);
  if path.is_absolute() {
    relative_to_sandbox(path, sandbox_root)
  } else {
    value.to_string()
  }
}
