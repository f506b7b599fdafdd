//! Speculative prefetching of game-page data.
//!
//! - [`link`]: game-link recognition and query parameter extraction
//! - [`entry`]: prefetch entry states and failure taxonomy
//! - [`events`]: the typed page-event stream that replaces DOM listeners
//! - [`controller`]: the bounded-concurrency prefetch controller

pub mod controller;
pub mod entry;
pub mod events;
pub mod link;
