//! Request and response model shared by the engine, store and queue.

use sha2::{Digest, Sha256};
use url::Url;

/// HTTP methods the gateway routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  /// Only GET requests are eligible for caching.
  pub fn is_get(&self) -> bool {
    matches!(self, Method::Get)
  }
}

impl std::str::FromStr for Method {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Ok(Method::Get),
      "HEAD" => Ok(Method::Head),
      "POST" => Ok(Method::Post),
      "PUT" => Ok(Method::Put),
      "PATCH" => Ok(Method::Patch),
      "DELETE" => Ok(Method::Delete),
      other => Err(format!("unsupported method: {}", other)),
    }
  }
}

impl std::fmt::Display for Method {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  /// A bare GET request for `url`.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      headers: Vec::new(),
      body: None,
    }
  }

  /// Stable identity for cache keying: method plus absolute URL,
  /// SHA-256 hashed for fixed-length keys.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// First header value with the given name, case-insensitive.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Whether the caller is navigating to an HTML page.
  pub fn wants_html(&self) -> bool {
    self
      .header("accept")
      .is_some_and(|accept| accept.contains("text/html"))
  }
}

/// Immutable snapshot of a response: status, headers and body bytes.
///
/// Entries are overwritten on re-fetch, never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl ResponseSnapshot {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Body as text, lossily decoded for display.
  pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(&self.body)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(method: Method, url: &str) -> Request {
    Request {
      method,
      url: Url::parse(url).unwrap(),
      headers: Vec::new(),
      body: None,
    }
  }

  #[test]
  fn cache_key_is_stable_per_method_and_url() {
    let a = request(Method::Get, "https://example.org/api/x");
    let b = request(Method::Get, "https://example.org/api/x");
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn cache_key_distinguishes_method_and_url() {
    let get = request(Method::Get, "https://example.org/api/x");
    let post = request(Method::Post, "https://example.org/api/x");
    let other = request(Method::Get, "https://example.org/api/y");
    assert_ne!(get.cache_key(), post.cache_key());
    assert_ne!(get.cache_key(), other.cache_key());
  }

  #[test]
  fn wants_html_matches_accept_header_case_insensitively() {
    let mut req = request(Method::Get, "https://example.org/dashboard");
    assert!(!req.wants_html());

    req.headers.push((
      "Accept".to_string(),
      "text/html,application/xhtml+xml".to_string(),
    ));
    assert!(req.wants_html());
  }

  #[test]
  fn success_range_is_2xx() {
    let mut snapshot = ResponseSnapshot {
      status: 200,
      headers: Vec::new(),
      body: Vec::new(),
    };
    assert!(snapshot.is_success());
    snapshot.status = 299;
    assert!(snapshot.is_success());
    snapshot.status = 304;
    assert!(!snapshot.is_success());
    snapshot.status = 503;
    assert!(!snapshot.is_success());
  }
}
