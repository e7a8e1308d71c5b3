//! Store and sandbox locations.
//!
//! Built packages live in a store shared by every sandbox on the machine.
//! Emitted plans refer to it only through the `KILN__STORE` variable, so the
//! path chosen here is a default that the executor may override.
//!
//! # Layout
//!
//! ```text
//! store/
//! ├── _install/               # Installed packages
//! │   └── <name>-<version>-<hash>/
//! ├── _build/                 # Build directories and generated config files
//! │   └── <name>-<version>-<hash>/
//! └── _logs/                  # Build logs
//! ```
//!
//! The root package of a sandbox uses the same `_install`/`_build` trees
//! directly under the sandbox directory.

pub mod paths;

pub use paths::{StorePaths, StoreTree};
