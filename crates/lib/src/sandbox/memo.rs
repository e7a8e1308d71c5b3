//! In-flight de-duplicating cache for async lookups.
//!
//! The entry for a key is created before the lookup starts, so concurrent
//! callers asking for the same key await one computation instead of repeating
//! the I/O. Entries are never evicted; a cache lives for one resolver run.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

type Inflight<V> = Arc<OnceCell<V>>;

pub struct InflightCache<K, V> {
  entries: Mutex<HashMap<K, Inflight<V>>>,
}

impl<K, V> Default for InflightCache<K, V> {
  fn default() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
    }
  }
}

impl<K: Eq + Hash, V: Clone> InflightCache<K, V> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return the cached value for `key`, running `init` if nobody has yet.
  pub async fn get_or_init<F, Fut>(&self, key: K, init: F) -> V
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = V>,
  {
    let cell = {
      let mut entries = self.entries.lock().await;
      entries.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
    };
    cell.get_or_init(init).await.clone()
  }

  /// Number of keys seen so far, including lookups still in flight.
  pub async fn len(&self) -> usize {
    self.entries.lock().await.len()
  }
}
