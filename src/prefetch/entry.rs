//! Prefetch entry states and the failure taxonomy.
//!
//! An entry exists for every href the controller has committed to fetching.
//! `Loading` doubles as the re-fetch guard; any failure removes the entry so
//! a later hover can retry.

use std::time::Instant;

use thiserror::Error;

use crate::fetch::FetchError;
use crate::prefetch::link::LinkError;

/// One slot in the controller's in-memory map, keyed by href.
#[derive(Debug, Clone)]
pub enum PrefetchEntry {
    /// A fetch is in flight.
    Loading,
    /// Game data arrived and was accepted.
    Loaded {
        payload: serde_json::Value,
        fetched_at: Instant,
    },
}

impl PrefetchEntry {
    pub fn is_loaded(&self) -> bool {
        matches!(self, PrefetchEntry::Loaded { .. })
    }

    /// External view of the entry, for stats and tests.
    pub fn state(&self) -> EntryState {
        match self {
            PrefetchEntry::Loading => EntryState::Loading,
            PrefetchEntry::Loaded { .. } => EntryState::Loaded,
        }
    }
}

/// Entry state without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Loading,
    Loaded,
}

/// Why a prefetch did not produce a usable entry. Every variant removes the
/// entry; timeouts are only distinguished to demote their log level.
#[derive(Error, Debug)]
pub enum PrefetchError {
    #[error(transparent)]
    BadLink(#[from] LinkError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("endpoint declined with status {0:?}")]
    Rejected(Option<String>),
}

impl PrefetchError {
    /// Timeouts are routine on a 2 s budget; callers log them quietly.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PrefetchError::Fetch(FetchError::Timeout))
    }
}
