//! The two fetch-resolution algorithms.
//!
//! Within one request's resolution the cache read and the network attempt
//! are strictly ordered, never parallel; the stored entry always reflects
//! the most recent successful network response for its key.

use tracing::{debug, warn};

use super::fallback::Fallback;
use crate::http::{Request, ResponseSnapshot};
use crate::net::Fetcher;
use crate::store::CacheStore;

/// Try the network first; fall back to cache, then to the offline
/// fallback.
pub async fn network_first<S, F>(
  store: &S,
  generation: &str,
  fetcher: &F,
  fallback: &Fallback,
  request: &Request,
) -> ResponseSnapshot
where
  S: CacheStore,
  F: Fetcher,
{
  match fetcher.fetch(request).await {
    Ok(snapshot) => {
      if snapshot.is_success() {
        write_through(store, generation, request, &snapshot);
      }
      snapshot
    }
    Err(err) => {
      debug!(url = %request.url, %err, "network failed, trying cache");
      match store.lookup(generation, request) {
        Ok(Some(stored)) => stored.snapshot,
        Ok(None) => fallback.resolve(store, generation, request),
        Err(store_err) => {
          warn!(url = %request.url, %store_err, "cache lookup failed");
          fallback.resolve(store, generation, request)
        }
      }
    }
  }
}

/// Serve from cache when possible; touch the network only on a miss.
pub async fn cache_first<S, F>(
  store: &S,
  generation: &str,
  fetcher: &F,
  fallback: &Fallback,
  request: &Request,
) -> ResponseSnapshot
where
  S: CacheStore,
  F: Fetcher,
{
  match store.lookup(generation, request) {
    Ok(Some(stored)) => {
      debug!(url = %request.url, "cache hit");
      return stored.snapshot;
    }
    Ok(None) => {}
    Err(err) => warn!(url = %request.url, %err, "cache lookup failed"),
  }

  match fetcher.fetch(request).await {
    Ok(snapshot) => {
      if snapshot.is_success() {
        write_through(store, generation, request, &snapshot);
      }
      snapshot
    }
    Err(err) => {
      debug!(url = %request.url, %err, "cache miss and network failed");
      fallback.resolve(store, generation, request)
    }
  }
}

/// Store a copy of a live response under the request's identity.
///
/// Independent of response delivery: a failed write is logged and costs
/// at most an extra network fetch on a later request.
fn write_through<S: CacheStore>(
  store: &S,
  generation: &str,
  request: &Request,
  snapshot: &ResponseSnapshot,
) {
  if let Err(err) = store.put(generation, request, snapshot) {
    warn!(url = %request.url, %err, "cache write failed");
  }
}
