//! Request classification: which caching policy applies to a request.
//!
//! A pure function of the request and the cache configuration, so every
//! policy decision is testable without a store or a network.

use crate::config::CacheConfig;
use crate::fetch::{Destination, FetchRequest};

/// The three caching policies the worker applies, in classification priority
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Serve from cache; consult the network only on a miss.
    CacheFirst,
    /// Serve stale from cache immediately, refresh in the background.
    StaleWhileRevalidate,
    /// Try the network; fall back to cache only on failure.
    NetworkFirst,
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachePolicy::CacheFirst => write!(f, "cache-first"),
            CachePolicy::StaleWhileRevalidate => write!(f, "stale-while-revalidate"),
            CachePolicy::NetworkFirst => write!(f, "network-first"),
        }
    }
}

/// Classify a request. Static assets (by destination or path prefix) are
/// cache-first, the game-data endpoint is stale-while-revalidate, everything
/// else is network-first.
pub fn classify(request: &FetchRequest, config: &CacheConfig) -> CachePolicy {
    let is_static_destination = matches!(
        request.destination,
        Destination::Style | Destination::Script | Destination::Image
    );
    if is_static_destination || request.path().starts_with(&config.static_prefix) {
        return CachePolicy::CacheFirst;
    }
    if request.path() == config.api_path {
        return CachePolicy::StaleWhileRevalidate;
    }
    CachePolicy::NetworkFirst
}
