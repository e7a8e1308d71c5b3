//! Hashing used for package keys.
//!
//! - `ObjectHash`: a truncated 20-character hash embedded in keys and paths
//! - `Hashable`: hash any serializable value through its JSON form
//! - `hash_bytes()`: full hash of arbitrary bytes

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A truncated content hash.
///
/// The hash is the first 20 hex characters of the SHA-256 of the input. That
/// is enough to tell packages apart while keeping store paths readable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Types whose identity is the hash of their JSON serialization.
///
/// Implementors must serialize deterministically: use `BTreeMap` rather than
/// `HashMap` for any map field.
pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    let full = hash_bytes(serialized.as_bytes());
    Ok(ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// Full 64-character lowercase SHA-256 of `data`.
pub fn hash_bytes(data: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data);
  format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  #[derive(Serialize)]
  struct Sample {
    name: String,
    values: BTreeMap<String, String>,
  }

  impl Hashable for Sample {}

  fn sample(pairs: &[(&str, &str)]) -> Sample {
    Sample {
      name: "pkg".to_string(),
      values: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    }
  }

  #[test]
  fn object_hash_is_truncated() {
    let hash = sample(&[]).compute_hash().unwrap();
    assert_eq!(hash.0.len(), OBJ_HASH_PREFIX_LEN);
    assert!(hash.0.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn insertion_order_does_not_matter() {
    let a = sample(&[("A", "1"), ("B", "2")]).compute_hash().unwrap();
    let b = sample(&[("B", "2"), ("A", "1")]).compute_hash().unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn content_changes_hash() {
    let a = sample(&[("A", "1")]).compute_hash().unwrap();
    let b = sample(&[("A", "2")]).compute_hash().unwrap();
    assert_ne!(a, b);
  }

  #[test]
  fn hash_bytes_known_value() {
    assert_eq!(
      hash_bytes(b"hello world"),
      "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
  }
}
