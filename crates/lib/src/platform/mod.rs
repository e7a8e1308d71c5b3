//! Host platform detection.
//!
//! Builds see the host's operating system and architecture through the
//! sandbox base environment. Deterministic runs replace both with fixed
//! placeholders so plans and keys do not depend on the machine.

pub mod arch;
pub mod os;
pub mod paths;

use arch::Arch;
use os::Os;
use std::fmt;

/// Placeholder platform used by deterministic runs.
pub const DETERMINISTIC_PLATFORM: &str = "platform";
/// Placeholder architecture used by deterministic runs.
pub const DETERMINISTIC_ARCHITECTURE: &str = "architecture";

/// Platform identifier combining architecture and OS (e.g., "aarch64-darwin")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the host platform.
  ///
  /// Returns `None` if the OS or architecture is not recognised.
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Returns the platform triple string (e.g., "aarch64-darwin")
  pub fn triple(&self) -> String {
    format!("{}-{}", self.arch, self.os)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}

/// Platform and architecture names exported to builds.
///
/// Unrecognised hosts fall back to Rust's own identifiers.
pub fn host_names(deterministic: bool) -> (String, String) {
  if deterministic {
    return (DETERMINISTIC_PLATFORM.to_string(), DETERMINISTIC_ARCHITECTURE.to_string());
  }
  let platform = Os::current().map_or(std::env::consts::OS, |os| os.as_str());
  let arch = Arch::current().map_or(std::env::consts::ARCH, |arch| arch.as_str());
  (platform.to_string(), arch.to_string())
}
