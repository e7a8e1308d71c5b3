//! Shared utilities.
//!
//! Hashing for package keys and test helpers.

pub mod hash;

#[cfg(test)]
pub mod testutil;
