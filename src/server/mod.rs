//! HTTP server: proxy surface plus control endpoints.
//!
//! - [`api`]: router, proxy fallback, event/message/stats/health handlers

pub mod api;
