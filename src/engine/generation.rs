//! Cache-generation lifecycle: install and activate.

use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ActivateError, InstallError};
use crate::http::Request;
use crate::net::Fetcher;
use crate::store::CacheStore;

/// Owns the current cache generation: its name, the manifest of critical
/// assets, and the install/activate lifecycle.
///
/// The name is injected at construction; nothing else in the engine holds
/// generation state.
pub struct Generations<S> {
  store: Arc<S>,
  current: String,
  manifest: Vec<Url>,
  ready: AtomicBool,
}

impl<S: CacheStore> Generations<S> {
  pub fn new(store: Arc<S>, current: String, manifest: Vec<Url>) -> Self {
    Self {
      store,
      current,
      manifest,
      ready: AtomicBool::new(false),
    }
  }

  /// Name of the generation all cache operations resolve against.
  pub fn current(&self) -> &str {
    &self.current
  }

  /// Whether `activate` has completed for the current generation.
  pub fn is_ready(&self) -> bool {
    self.ready.load(Ordering::Acquire)
  }

  /// Fetch and store every manifest asset under the current generation.
  ///
  /// All-or-nothing: any asset failure aborts the install, rolls back
  /// partial writes, and leaves the previous generation in charge. The
  /// caller retries the whole manifest rather than serve a half-populated
  /// cache.
  pub async fn install<F: Fetcher>(&self, fetcher: &F) -> Result<(), InstallError> {
    info!(
      generation = %self.current,
      assets = self.manifest.len(),
      "installing"
    );

    let fetches = self.manifest.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let snapshot = fetcher
        .fetch(&request)
        .await
        .map_err(|source| InstallError::AssetFetch {
          url: url.to_string(),
          source,
        })?;
      if !snapshot.is_success() {
        return Err(InstallError::AssetStatus {
          url: url.to_string(),
          status: snapshot.status,
        });
      }
      Ok((request, snapshot))
    });
    let assets = try_join_all(fetches).await?;

    self.store.open(&self.current)?;
    for (request, snapshot) in &assets {
      if let Err(err) = self.store.put(&self.current, request, snapshot) {
        // A half-populated generation must never become activatable.
        if let Err(cleanup) = self.store.delete_generation(&self.current) {
          warn!(%cleanup, "failed to roll back partial install");
        }
        return Err(err.into());
      }
    }

    info!(generation = %self.current, "install committed");
    Ok(())
  }

  /// Delete every generation other than the current one and mark the
  /// engine ready to serve.
  ///
  /// Refuses to run before the current generation's install has
  /// committed. Returns the purged generation names.
  pub fn activate(&self) -> Result<Vec<String>, ActivateError> {
    let names = self.store.generations()?;
    if !names.iter().any(|name| name == &self.current) {
      return Err(ActivateError::NotInstalled(self.current.clone()));
    }

    let mut purged = Vec::new();
    for name in names {
      if name != self.current {
        debug!(generation = %name, "deleting superseded generation");
        self.store.delete_generation(&name)?;
        purged.push(name);
      }
    }

    self.ready.store(true, Ordering::Release);
    info!(generation = %self.current, purged = purged.len(), "activated");
    Ok(purged)
  }
}
