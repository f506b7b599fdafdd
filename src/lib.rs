//! sixhop-accel: acceleration layer for the Wiki SixHop link-hopping game.
//!
//! Two cooperating components sit between the game page and the upstream
//! server:
//! - the prefetch controller speculatively fetches game-page data for links
//!   the user hovers or can see, bounded to a few fetches at a time;
//! - the cache worker intercepts every proxied request, serving static assets
//!   cache-first, the game-data endpoint stale-while-revalidate, and the rest
//!   network-first with cache fallback.
//!
//! Both are best-effort: any failure degrades to a plain uncached fetch.

pub mod config;
pub mod fetch;
pub mod prefetch;
pub mod server;
pub mod worker;
