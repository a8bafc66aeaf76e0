//! Request-interception engine and event dispatcher.
//!
//! A single entry point routes each tagged event to its handler; the only
//! generation state is the explicitly injected current-generation name.

pub mod classify;
pub mod fallback;
pub mod generation;
pub mod strategy;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{DispatchError, FetchError};
use crate::http::{Request, ResponseSnapshot};
use crate::net::Fetcher;
use crate::push::{self, ControlMessage, NotificationPayload};
use crate::store::CacheStore;
use crate::sync::{self, ActionQueue, DrainReport};

use classify::{Classification, RouteRules, Strategy};
use fallback::Fallback;
use generation::Generations;
use strategy::{cache_first, network_first};

/// Everything the engine needs to know, independent of how it was loaded.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Name of the current cache generation.
  pub generation: String,
  /// Base URL relative paths resolve against.
  pub origin: Url,
  /// Critical assets fetched at install time.
  pub manifest: Vec<Url>,
  pub rules: RouteRules,
  /// Pre-cached page served to offline navigations.
  pub offline_page: Url,
  /// Bilingual message carried in the structured 503 body.
  pub offline_message: String,
  /// Sync tag that triggers a queue drain.
  pub sync_tag: String,
  /// Application name used for notification defaults.
  pub app_name: String,
}

/// One event delivered by the host runtime.
#[derive(Debug)]
pub enum Event {
  /// A new version was deployed; populate its generation.
  Install,
  /// Take over serving and purge superseded generations.
  Activate,
  /// An intercepted outgoing request.
  Fetch(Request),
  /// Sync trigger with a tag naming the reason.
  Sync(String),
  /// Inbound push payload, opaque bytes.
  Push(Option<Vec<u8>>),
  /// Control message from the host application.
  Message(Value),
  /// The user chose a notification action.
  NotificationClick(String),
}

/// What an event produced.
#[derive(Debug)]
pub enum Outcome {
  None,
  Response(ResponseSnapshot),
  Drained(DrainReport),
  Notification(NotificationPayload),
  OpenWindow(String),
}

/// The request-interception caching engine.
///
/// Generic over its storage, queue and network seams; single-threaded and
/// cooperative — shared state lives behind the store and queue, which are
/// atomic at the operation level.
pub struct Engine<S, Q, F> {
  store: Arc<S>,
  queue: Q,
  fetcher: F,
  generations: Generations<S>,
  rules: RouteRules,
  fallback: Fallback,
  origin: Url,
  sync_tag: String,
  app_name: String,
}

impl<S, Q, F> Engine<S, Q, F>
where
  S: CacheStore,
  Q: ActionQueue,
  F: Fetcher,
{
  pub fn new(store: S, queue: Q, fetcher: F, config: EngineConfig) -> Self {
    let store = Arc::new(store);
    let generations = Generations::new(Arc::clone(&store), config.generation, config.manifest);

    Self {
      store,
      queue,
      fetcher,
      generations,
      rules: config.rules,
      fallback: Fallback::new(config.offline_page, config.offline_message),
      origin: config.origin,
      sync_tag: config.sync_tag,
      app_name: config.app_name,
    }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn queue(&self) -> &Q {
    &self.queue
  }

  pub fn generations(&self) -> &Generations<S> {
    &self.generations
  }

  pub fn sync_tag(&self) -> &str {
    &self.sync_tag
  }

  /// Resolve a possibly-relative URL against the configured origin.
  pub fn resolve(&self, raw: &str) -> Result<Url, url::ParseError> {
    self.origin.join(raw)
  }

  /// Route one event to its handler.
  ///
  /// Only `Install` and `Activate` can fail, so the platform retries
  /// install; every other event absorbs its failures into a degraded
  /// outcome.
  pub async fn dispatch(&self, event: Event) -> Result<Outcome, DispatchError> {
    match event {
      Event::Install => {
        self.generations.install(&self.fetcher).await?;
        Ok(Outcome::None)
      }
      Event::Activate => {
        self.generations.activate()?;
        Ok(Outcome::None)
      }
      Event::Fetch(request) => {
        let response = match self.handle_fetch(&request).await {
          Ok(response) => response,
          Err(err) => {
            debug!(url = %request.url, %err, "bypassed request failed");
            self.fallback.offline_error()
          }
        };
        Ok(Outcome::Response(response))
      }
      Event::Sync(tag) => {
        if tag == self.sync_tag {
          Ok(Outcome::Drained(sync::drain(&self.queue, &self.fetcher).await))
        } else {
          debug!(%tag, "ignoring unknown sync tag");
          Ok(Outcome::None)
        }
      }
      Event::Push(payload) => Ok(Outcome::Notification(NotificationPayload::from_push(
        payload.as_deref(),
        &self.app_name,
      ))),
      Event::Message(value) => {
        match ControlMessage::parse(&value) {
          Some(ControlMessage::SkipWaiting) => {
            if let Err(err) = self.generations.activate() {
              warn!(%err, "skip-waiting activation failed");
            }
          }
          Some(ControlMessage::CacheUrls { urls }) => self.warm_cache(&urls).await,
          None => debug!("ignoring unknown control message"),
        }
        Ok(Outcome::None)
      }
      Event::NotificationClick(action) => Ok(match push::click_target(&action) {
        Some(url) => Outcome::OpenWindow(url),
        None => Outcome::None,
      }),
    }
  }

  /// Resolve one intercepted request to exactly one response.
  ///
  /// GET requests always resolve — live, cached or fallback. Non-GET
  /// requests bypass the cache entirely and surface a network failure to
  /// the caller, which may queue the action for a later sync.
  pub async fn handle_fetch(&self, request: &Request) -> Result<ResponseSnapshot, FetchError> {
    let generation = self.generations.current();

    match self.rules.classify(request) {
      Classification::Routed { strategy, reason } => {
        debug!(url = %request.url, ?strategy, ?reason, "routing request");
        let response = match strategy {
          Strategy::NetworkFirst => {
            network_first(
              self.store.as_ref(),
              generation,
              &self.fetcher,
              &self.fallback,
              request,
            )
            .await
          }
          Strategy::CacheFirst => {
            cache_first(
              self.store.as_ref(),
              generation,
              &self.fetcher,
              &self.fallback,
              request,
            )
            .await
          }
        };
        Ok(response)
      }
      Classification::Bypass => self.fetcher.fetch(request).await,
    }
  }

  /// Fetch-and-store outside the interception path (cache pre-warming).
  /// Best-effort: individual failures are logged and skipped.
  async fn warm_cache(&self, urls: &[String]) {
    let generation = self.generations.current();

    for raw in urls {
      let url = match self.resolve(raw) {
        Ok(url) => url,
        Err(err) => {
          warn!(url = %raw, %err, "skipping unparseable warm url");
          continue;
        }
      };
      let request = Request::get(url);

      match self.fetcher.fetch(&request).await {
        Ok(snapshot) if snapshot.is_success() => {
          if let Err(err) = self.store.put(generation, &request, &snapshot) {
            warn!(url = %request.url, %err, "warm cache write failed");
          }
        }
        Ok(snapshot) => debug!(
          url = %request.url,
          status = snapshot.status,
          "not caching non-success warm response"
        ),
        Err(err) => debug!(url = %request.url, %err, "warm fetch failed"),
      }
    }
  }
}
