//! In-memory cache store for ephemeral runs and tests.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{CacheStore, StoredResponse};
use crate::error::StoreError;
use crate::http::{Request, ResponseSnapshot};

struct Entry {
  url: String,
  stored: StoredResponse,
}

type Generations = HashMap<String, HashMap<String, Entry>>;

/// Cache store that keeps everything in process memory. Nothing survives
/// a restart; used for `--ephemeral` runs and tests.
#[derive(Default)]
pub struct MemoryStore {
  generations: Mutex<Generations>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Generations>, StoreError> {
    self.generations.lock().map_err(|_| StoreError::LockPoisoned)
  }
}

impl CacheStore for MemoryStore {
  fn open(&self, generation: &str) -> Result<(), StoreError> {
    self.lock()?.entry(generation.to_string()).or_default();
    Ok(())
  }

  fn put(
    &self,
    generation: &str,
    request: &Request,
    snapshot: &ResponseSnapshot,
  ) -> Result<(), StoreError> {
    self
      .lock()?
      .entry(generation.to_string())
      .or_default()
      .insert(
        request.cache_key(),
        Entry {
          url: request.url.as_str().to_string(),
          stored: StoredResponse {
            snapshot: snapshot.clone(),
            stored_at: Utc::now(),
          },
        },
      );
    Ok(())
  }

  fn lookup(
    &self,
    generation: &str,
    request: &Request,
  ) -> Result<Option<StoredResponse>, StoreError> {
    Ok(
      self
        .lock()?
        .get(generation)
        .and_then(|entries| entries.get(&request.cache_key()))
        .map(|entry| entry.stored.clone()),
    )
  }

  fn generations(&self) -> Result<Vec<String>, StoreError> {
    let mut names: Vec<String> = self.lock()?.keys().cloned().collect();
    names.sort();
    Ok(names)
  }

  fn delete_generation(&self, generation: &str) -> Result<bool, StoreError> {
    Ok(self.lock()?.remove(generation).is_some())
  }

  fn entry_urls(&self, generation: &str) -> Result<Vec<String>, StoreError> {
    let mut urls: Vec<String> = self
      .lock()?
      .get(generation)
      .map(|entries| entries.values().map(|e| e.url.clone()).collect())
      .unwrap_or_default();
    urls.sort();
    Ok(urls)
  }
}
