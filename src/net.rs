//! Network fetching seam.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;
use crate::http::{Method, Request, ResponseSnapshot};

/// Issues a request against the live network.
///
/// The engine is generic over this trait; `HttpFetcher` is the production
/// implementation and tests script network behavior through a mock.
pub trait Fetcher: Send + Sync {
  fn fetch(
    &self,
    request: &Request,
  ) -> impl Future<Output = Result<ResponseSnapshot, FetchError>> + Send;
}

/// reqwest-backed fetcher.
///
/// The client-level timeout bounds every request; no retry loop is layered
/// on top (retries are the network layer's concern).
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new(timeout: Duration) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client })
  }
}

fn reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Head => reqwest::Method::HEAD,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, FetchError> {
    let mut builder = self
      .client
      .request(reqwest_method(request.method), request.url.clone());

    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.to_string(),
          String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
      })
      .collect();
    let body = response.bytes().await?.to_vec();

    Ok(ResponseSnapshot {
      status,
      headers,
      body,
    })
  }
}

#[cfg(test)]
pub(crate) mod mock {
  //! Scripted fetcher for tests.

  use std::collections::HashMap;
  use std::sync::Mutex;

  use super::*;

  /// Maps URLs to scripted responses and records every attempted URL so
  /// tests can assert on network usage. Unrouted URLs fail as unreachable,
  /// so an empty mock behaves as a dead network.
  pub struct MockFetcher {
    routes: Mutex<HashMap<String, Result<ResponseSnapshot, String>>>,
    calls: Mutex<Vec<String>>,
  }

  impl MockFetcher {
    pub fn offline() -> Self {
      Self {
        routes: Mutex::new(HashMap::new()),
        calls: Mutex::new(Vec::new()),
      }
    }

    /// Script a successful response for `url`.
    pub fn respond(&self, url: &str, snapshot: ResponseSnapshot) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), Ok(snapshot));
    }

    /// Script a network failure for `url`.
    pub fn fail(&self, url: &str) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), Err("connection refused".to_string()));
    }

    /// URLs attempted so far, in order.
    pub fn calls(&self) -> Vec<String> {
      self.calls.lock().unwrap().clone()
    }
  }

  impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<ResponseSnapshot, FetchError> {
      self
        .calls
        .lock()
        .unwrap()
        .push(request.url.as_str().to_string());
      match self.routes.lock().unwrap().get(request.url.as_str()) {
        Some(Ok(snapshot)) => Ok(snapshot.clone()),
        Some(Err(message)) => Err(FetchError::Network(message.clone())),
        None => Err(FetchError::Network("no route to host".to_string())),
      }
    }
  }

  /// Shorthand for building response snapshots in tests.
  pub fn snapshot(status: u16, content_type: &str, body: &[u8]) -> ResponseSnapshot {
    ResponseSnapshot {
      status,
      headers: vec![("content-type".to_string(), content_type.to_string())],
      body: body.to_vec(),
    }
  }
}
