//! Last-resort responses when both network and cache have failed.

use serde_json::json;
use tracing::warn;
use url::Url;

use crate::http::{Request, ResponseSnapshot};
use crate::store::CacheStore;

/// Supplies the offline page for navigational requests and the structured
/// 503 error for everything else.
pub struct Fallback {
  offline_page: Request,
  message: String,
}

impl Fallback {
  pub fn new(offline_page: Url, message: String) -> Self {
    Self {
      offline_page: Request::get(offline_page),
      message,
    }
  }

  /// Resolve a request that neither the network nor the cache could serve.
  ///
  /// A navigating user always sees a coherent page rather than a raw
  /// error, provided the offline page was pre-cached.
  pub fn resolve<S: CacheStore>(
    &self,
    store: &S,
    generation: &str,
    request: &Request,
  ) -> ResponseSnapshot {
    if request.wants_html() {
      match store.lookup(generation, &self.offline_page) {
        Ok(Some(stored)) => return stored.snapshot,
        Ok(None) => {}
        Err(err) => warn!(%err, "offline page lookup failed"),
      }
    }

    self.offline_error()
  }

  /// The structured 503 body. Lets the UI layer distinguish "offline, no
  /// data" from other error kinds.
  pub fn offline_error(&self) -> ResponseSnapshot {
    let body = json!({
      "error": "Offline",
      "message": self.message,
      "cached": false,
    });

    ResponseSnapshot {
      status: 503,
      headers: vec![(
        "content-type".to_string(),
        "application/json".to_string(),
      )],
      body: serde_json::to_vec(&body).unwrap_or_default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use serde_json::Value;
  use url::Url;

  fn fallback() -> Fallback {
    Fallback::new(
      Url::parse("https://example.org/offline.html").unwrap(),
      "You are offline.".to_string(),
    )
  }

  fn html_request(url: &str) -> Request {
    let mut request = Request::get(Url::parse(url).unwrap());
    request
      .headers
      .push(("accept".to_string(), "text/html".to_string()));
    request
  }

  #[test]
  fn structured_error_carries_the_offline_shape() {
    let response = fallback().offline_error();
    assert_eq!(response.status, 503);
    assert_eq!(response.header("content-type"), Some("application/json"));

    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "Offline");
    assert_eq!(body["message"], "You are offline.");
    assert_eq!(body["cached"], false);
  }

  #[test]
  fn navigations_get_the_cached_offline_page() {
    let store = MemoryStore::new();
    let page = Request::get(Url::parse("https://example.org/offline.html").unwrap());
    let snapshot = ResponseSnapshot {
      status: 200,
      headers: vec![("content-type".to_string(), "text/html".to_string())],
      body: b"<h1>offline</h1>".to_vec(),
    };
    store.put("app-v1", &page, &snapshot).unwrap();

    let response = fallback().resolve(&store, "app-v1", &html_request("https://example.org/dashboard"));
    assert_eq!(response.body, b"<h1>offline</h1>");
  }

  #[test]
  fn navigations_without_a_cached_page_get_the_structured_error() {
    let store = MemoryStore::new();
    let response = fallback().resolve(&store, "app-v1", &html_request("https://example.org/dashboard"));
    assert_eq!(response.status, 503);
  }

  #[test]
  fn non_html_requests_never_get_the_offline_page() {
    let store = MemoryStore::new();
    let page = Request::get(Url::parse("https://example.org/offline.html").unwrap());
    let snapshot = ResponseSnapshot {
      status: 200,
      headers: Vec::new(),
      body: b"<h1>offline</h1>".to_vec(),
    };
    store.put("app-v1", &page, &snapshot).unwrap();

    let request = Request::get(Url::parse("https://example.org/api/x").unwrap());
    let response = fallback().resolve(&store, "app-v1", &request);
    assert_eq!(response.status, 503);
    assert_eq!(response.header("content-type"), Some("application/json"));
  }
}
