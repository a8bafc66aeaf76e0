//! Typed errors for the gateway engine.

use thiserror::Error;

/// A network fetch could not complete.
///
/// Transient and expected on intermittent links. The strategy handlers
/// absorb it into cache-or-fallback resolution; it only reaches a caller
/// for bypassed (non-GET) requests.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("request timed out")]
  Timeout,
  #[error("network unreachable: {0}")]
  Network(String),
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      FetchError::Timeout
    } else {
      FetchError::Network(err.to_string())
    }
  }
}

/// Cache store or action queue storage failure.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("storage error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("stored value serialization error: {0}")]
  Serde(#[from] serde_json::Error),
  #[error("{0}")]
  Io(#[from] std::io::Error),
  #[error("lock poisoned")]
  LockPoisoned,
  #[error("could not determine data directory")]
  NoDataDir,
  #[error("invalid stored timestamp {0:?}")]
  Timestamp(String),
  #[error("corrupt queue row: {0}")]
  Corrupt(String),
}

/// A manifest asset could not be installed.
///
/// The only error allowed to fail its lifecycle event; the previous
/// generation keeps serving until a full install commits.
#[derive(Debug, Error)]
pub enum InstallError {
  #[error("failed to fetch manifest asset {url}: {source}")]
  AssetFetch {
    url: String,
    #[source]
    source: FetchError,
  },
  #[error("manifest asset {url} returned status {status}")]
  AssetStatus { url: String, status: u16 },
  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Activation was attempted out of order or could not purge old state.
#[derive(Debug, Error)]
pub enum ActivateError {
  #[error("generation {0} has no committed install")]
  NotInstalled(String),
  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Lifecycle errors surfaced by the event dispatcher. Every other failure
/// is absorbed into a degraded outcome.
#[derive(Debug, Error)]
pub enum DispatchError {
  #[error(transparent)]
  Install(#[from] InstallError),
  #[error(transparent)]
  Activate(#[from] ActivateError),
}
