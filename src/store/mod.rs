//! Versioned response cache storage.
//!
//! The cache is organized as named generations, each owning a set of
//! response snapshots keyed by request identity. Exactly one generation is
//! current at any time; activation deletes the rest.

mod memory;
pub(crate) mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::http::{Request, ResponseSnapshot};

/// A cached response plus the time it was stored.
#[derive(Debug, Clone)]
pub struct StoredResponse {
  pub snapshot: ResponseSnapshot,
  pub stored_at: DateTime<Utc>,
}

/// Storage backend for named cache generations.
///
/// Every write is a single atomic put with per-key last-write-wins
/// semantics; no read-modify-write sequences span the store.
pub trait CacheStore: Send + Sync {
  /// Ensure a generation exists.
  fn open(&self, generation: &str) -> Result<(), StoreError>;

  /// Store a response snapshot under `generation`, overwriting any entry
  /// with the same request identity.
  fn put(
    &self,
    generation: &str,
    request: &Request,
    snapshot: &ResponseSnapshot,
  ) -> Result<(), StoreError>;

  /// Look up a response by request identity.
  fn lookup(
    &self,
    generation: &str,
    request: &Request,
  ) -> Result<Option<StoredResponse>, StoreError>;

  /// Names of all generations present in the store.
  fn generations(&self) -> Result<Vec<String>, StoreError>;

  /// Delete a generation and all of its entries. Returns whether it existed.
  fn delete_generation(&self, generation: &str) -> Result<bool, StoreError>;

  /// URLs cached under `generation`, for reporting.
  fn entry_urls(&self, generation: &str) -> Result<Vec<String>, StoreError>;
}
