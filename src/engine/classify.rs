//! Per-request strategy classification.

use serde::Deserialize;

use crate::http::Request;

/// Resolution order for a cacheable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Consult the network first, falling back to cache when it fails.
  NetworkFirst,
  /// Serve from cache when possible, touching the network only on a miss.
  CacheFirst,
}

/// Which rule produced a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchReason {
  /// The request path matched a configured prefix.
  PathPrefix(String),
  /// The request carries an `Accept: text/html` navigation signal.
  HtmlNavigation,
  /// No rule matched.
  Default,
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
  /// GET request handled by a caching strategy.
  Routed {
    strategy: Strategy,
    reason: MatchReason,
  },
  /// Non-GET request: straight to the network, never cached, no fallback.
  Bypass,
}

/// Path-prefix routing rules, evaluated in a fixed priority order.
///
/// API data must be as fresh as possible when online yet degrade to the
/// last-known cache offline; static assets rarely change and skip the
/// round-trip entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRules {
  /// Prefixes resolved network-first (API data).
  #[serde(default = "default_network_first")]
  pub network_first: Vec<String>,
  /// Prefixes resolved cache-first (static assets).
  #[serde(default = "default_cache_first")]
  pub cache_first: Vec<String>,
}

fn default_network_first() -> Vec<String> {
  vec!["/api/".to_string()]
}

fn default_cache_first() -> Vec<String> {
  vec!["/static/".to_string()]
}

impl Default for RouteRules {
  fn default() -> Self {
    Self {
      network_first: default_network_first(),
      cache_first: default_cache_first(),
    }
  }
}

impl RouteRules {
  /// Classify a request. Pure, no I/O; the first matching rule wins.
  pub fn classify(&self, request: &Request) -> Classification {
    if !request.method.is_get() {
      return Classification::Bypass;
    }

    let path = request.url.path();

    for prefix in &self.network_first {
      if path.starts_with(prefix.as_str()) {
        return Classification::Routed {
          strategy: Strategy::NetworkFirst,
          reason: MatchReason::PathPrefix(prefix.clone()),
        };
      }
    }

    for prefix in &self.cache_first {
      if path.starts_with(prefix.as_str()) {
        return Classification::Routed {
          strategy: Strategy::CacheFirst,
          reason: MatchReason::PathPrefix(prefix.clone()),
        };
      }
    }

    if request.wants_html() {
      return Classification::Routed {
        strategy: Strategy::NetworkFirst,
        reason: MatchReason::HtmlNavigation,
      };
    }

    Classification::Routed {
      strategy: Strategy::CacheFirst,
      reason: MatchReason::Default,
    }
  }
}
