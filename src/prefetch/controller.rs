//! The prefetch controller: speculative fetching of game-page data.
//!
//! The controller watches page events (hover, page load, visibility, network
//! changes) and fetches the lightweight game-data payload for links the user
//! is likely to click, so the cache worker already holds the response when
//! the real navigation happens. At most `max_concurrent` fetches are in
//! flight; overflow waits in a FIFO queue and is drained on completion with a
//! short spacing delay to smooth bursts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PrefetchConfig;
use crate::fetch::{FetchError, FetchRequest, Fetcher};
use crate::prefetch::entry::{EntryState, PrefetchEntry, PrefetchError};
use crate::prefetch::events::{EffectiveConnectionType, PageEvent};
use crate::prefetch::link::{self, GameParams};

/// Counters surfaced by the stats endpoint.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PrefetchStats {
    /// Fetches admitted to a concurrency slot.
    pub started: u64,
    /// Fetches that produced a usable payload.
    pub loaded: u64,
    /// Fetches that failed (timeout, status, malformed, rejected).
    pub failed: u64,
    /// Enqueue operations while all slots were busy.
    pub queued_total: u64,
    /// Clicks on links whose data was already loaded.
    pub click_hits: u64,
    /// Clicks on links still loading or never prefetched.
    pub click_misses: u64,
    /// Cache clears triggered by connection degradation.
    pub cleared: u64,
}

/// What happened to a clicked link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickOutcome {
    NotGameLink,
    Prefetched,
    NotPrefetched,
}

/// Mutable controller state. Every mutation happens under this one lock,
/// mirroring the single-threaded event loop the design came from; the
/// increment/decrement pairing on `active` is the only cooperative resource.
#[derive(Debug, Default)]
struct ControllerState {
    /// href → entry. A present key, in any state, suppresses re-fetching.
    entries: HashMap<String, PrefetchEntry>,

    /// hrefs waiting for a free concurrency slot, oldest first.
    queue: VecDeque<String>,

    /// Fetches currently in flight. Never exceeds the configured bound.
    active: usize,

    /// Debounce generation; only the latest hover's timer survives.
    hover_seq: u64,

    /// Tab hidden: suppress new debounce timers, leave in-flight fetches.
    hidden: bool,

    /// Lifecycle flag; events are dropped until `start()`.
    started: bool,

    stats: PrefetchStats,
}

/// Result of asking for a concurrency slot.
enum Admission {
    Started,
    AlreadyTracked,
    Queued,
}

/// Where an href goes when all slots are busy. New work waits at the back;
/// a dequeued href that loses its slot during the spacing delay returns to
/// the front, since it already held the oldest position.
enum Placement {
    Back,
    Front,
}

fn admit(state: &mut ControllerState, href: &str, max: usize, placement: Placement) -> Admission {
    if state.entries.contains_key(href) {
        return Admission::AlreadyTracked;
    }
    if state.active >= max {
        match placement {
            Placement::Back => state.queue.push_back(href.to_string()),
            Placement::Front => state.queue.push_front(href.to_string()),
        }
        state.stats.queued_total += 1;
        return Admission::Queued;
    }
    state.active += 1;
    state.stats.started += 1;
    state
        .entries
        .insert(href.to_string(), PrefetchEntry::Loading);
    Admission::Started
}

/// Handle to the prefetch controller. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Prefetcher {
    state: Arc<RwLock<ControllerState>>,
    fetcher: Arc<dyn Fetcher>,
    config: Arc<PrefetchConfig>,
}

impl Prefetcher {
    pub fn new(config: PrefetchConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            state: Arc::new(RwLock::new(ControllerState::default())),
            fetcher,
            config: Arc::new(config),
        }
    }

    /// Attach the controller: events are processed from here on.
    pub async fn start(&self) {
        let mut st = self.state.write().await;
        st.started = true;
        info!(
            max_concurrent = self.config.max_concurrent,
            debounce_ms = self.config.hover_debounce_ms,
            "Prefetch controller started"
        );
    }

    /// Detach the controller: further events are dropped and any pending
    /// debounce timer is cancelled. In-flight fetches run to completion.
    pub async fn stop(&self) {
        let mut st = self.state.write().await;
        st.started = false;
        st.hover_seq += 1;
        info!("Prefetch controller stopped");
    }

    /// Dispatch one page event. Returns the outcome for click events.
    pub async fn handle_event(&self, event: PageEvent) -> Option<ClickOutcome> {
        if !self.state.read().await.started {
            return None;
        }
        match event {
            PageEvent::Hover { href } => {
                self.on_hover(href).await;
                None
            }
            PageEvent::PageLoaded { visible_links } => {
                self.on_page_loaded(visible_links).await;
                None
            }
            PageEvent::Click { href } => Some(self.on_click(&href).await),
            PageEvent::Visibility { hidden } => {
                self.on_visibility(hidden).await;
                None
            }
            PageEvent::Connection { effective_type } => {
                self.on_connection_change(effective_type).await;
                None
            }
        }
    }

    /// Hover trigger: debounced so transient mouse travel does not fire.
    /// Cancel-and-reschedule: a newer hover invalidates the pending timer.
    pub async fn on_hover(&self, href: String) {
        if !link::is_game_link(&href) {
            return;
        }
        let seq = {
            let mut st = self.state.write().await;
            if st.hidden || st.entries.contains_key(&href) {
                return;
            }
            st.hover_seq += 1;
            st.hover_seq
        };

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.config.hover_debounce()).await;
            let still_current = {
                let st = this.state.read().await;
                st.started && !st.hidden && st.hover_seq == seq
            };
            if still_current {
                this.prefetch(href).await;
            }
        });
    }

    /// Page-load trigger: eagerly prefetch the first few matching links that
    /// are visible, in the order the page reported them.
    pub async fn on_page_loaded(&self, visible_links: Vec<String>) {
        let eager: Vec<String> = visible_links
            .into_iter()
            .filter(|href| link::is_game_link(href))
            .take(self.config.eager_prefetch_limit)
            .collect();
        if eager.is_empty() {
            return;
        }
        info!(count = eager.len(), "Eagerly prefetching visible links");
        for href in eager {
            self.prefetch(href).await;
        }
    }

    /// Click trigger: report whether the link's data was already loaded. The
    /// navigation itself proceeds either way; the worker's cache serves it.
    pub async fn on_click(&self, href: &str) -> ClickOutcome {
        if !link::is_game_link(href) {
            return ClickOutcome::NotGameLink;
        }
        let mut st = self.state.write().await;
        let loaded = st.entries.get(href).is_some_and(PrefetchEntry::is_loaded);
        if loaded {
            st.stats.click_hits += 1;
            debug!(href, "Click on prefetched link");
            ClickOutcome::Prefetched
        } else {
            st.stats.click_misses += 1;
            ClickOutcome::NotPrefetched
        }
    }

    /// Visibility trigger: hiding the tab cancels the pending debounce timer
    /// but not in-flight fetches.
    pub async fn on_visibility(&self, hidden: bool) {
        let mut st = self.state.write().await;
        st.hidden = hidden;
        if hidden {
            st.hover_seq += 1;
            debug!("Tab hidden, pending hover prefetch cancelled");
        } else {
            debug!("Tab visible, prefetch resumed");
        }
    }

    /// Network trigger: on degradation to 2g-class connections, drop the
    /// whole cache as a bandwidth safety valve. Future prefetches are not
    /// otherwise blocked.
    pub async fn on_connection_change(&self, effective_type: EffectiveConnectionType) {
        if !effective_type.is_slow() {
            debug!(%effective_type, "Connection changed");
            return;
        }
        let mut st = self.state.write().await;
        let dropped = st.entries.len();
        st.entries.clear();
        st.stats.cleared += 1;
        info!(%effective_type, dropped, "Slow connection, prefetch cache cleared");
    }

    /// Admit an href for prefetching: no-op when already tracked (any state),
    /// queued when all slots are busy, otherwise fetched immediately.
    pub async fn prefetch(&self, href: String) {
        let admission = {
            let mut st = self.state.write().await;
            admit(&mut st, &href, self.config.max_concurrent, Placement::Back)
        };
        match admission {
            Admission::Started => {
                debug!(href, "Prefetch started");
                self.spawn_drive(href);
            }
            Admission::Queued => debug!(href, "Prefetch queued"),
            Admission::AlreadyTracked => {}
        }
    }

    fn spawn_drive(&self, href: String) {
        let this = self.clone();
        tokio::spawn(async move { this.drive(href).await });
    }

    /// Run one admitted fetch to completion, then keep draining the queue for
    /// as long as this slot can be reused. The decrement on completion is
    /// unconditional, so the increment/decrement pairing holds on every
    /// outcome.
    async fn drive(&self, first: String) {
        let mut current = first;
        loop {
            self.fetch_once(&current).await;

            let mut next = {
                let mut st = self.state.write().await;
                st.active -= 1;
                st.queue.pop_front()
            };
            loop {
                let Some(candidate) = next.take() else { return };
                tokio::time::sleep(self.config.queue_spacing()).await;
                let mut st = self.state.write().await;
                match admit(&mut st, &candidate, self.config.max_concurrent, Placement::Front) {
                    Admission::Started => {
                        debug!(href = candidate, "Prefetch dequeued");
                        current = candidate;
                        break;
                    }
                    // Satisfied while it waited; look at the next queued href.
                    Admission::AlreadyTracked => next = st.queue.pop_front(),
                    // Newer hovers took every slot during the spacing delay;
                    // the href is back at the front of the queue and their
                    // completions will drain it in order.
                    Admission::Queued => return,
                }
            }
        }
    }

    /// One fetch attempt. Success stores the payload; any failure removes the
    /// entry entirely so a future hover can retry.
    async fn fetch_once(&self, href: &str) {
        let result = self.fetch_game_data(href).await;
        let mut st = self.state.write().await;
        match result {
            Ok(payload) => {
                st.stats.loaded += 1;
                st.entries.insert(
                    href.to_string(),
                    PrefetchEntry::Loaded {
                        payload,
                        fetched_at: Instant::now(),
                    },
                );
                debug!(href, "Prefetch loaded");
            }
            Err(err) => {
                st.stats.failed += 1;
                st.entries.remove(href);
                if err.is_timeout() {
                    debug!(href, "Prefetch timed out");
                } else {
                    warn!(href, error = %err, "Prefetch failed");
                }
            }
        }
    }

    async fn fetch_game_data(&self, href: &str) -> Result<serde_json::Value, PrefetchError> {
        let params = GameParams::from_href(href)?;
        let request = FetchRequest::get(params.data_url(&self.config.data_endpoint))
            .with_header("X-Requested-With", "XMLHttpRequest")
            .with_header("Accept", "application/json");

        let response = timeout(self.config.fetch_timeout(), self.fetcher.fetch(&request))
            .await
            .map_err(|_| PrefetchError::Fetch(FetchError::Timeout))??;

        if !response.is_ok() {
            return Err(PrefetchError::Status(response.status));
        }
        let body = response.json()?;
        match body.get("status").and_then(|s| s.as_str()) {
            Some("success") => Ok(body),
            other => Err(PrefetchError::Rejected(other.map(str::to_string))),
        }
    }

    /// Point-in-time view of the controller, for the stats endpoint and tests.
    pub async fn snapshot(&self) -> ControllerSnapshot {
        let st = self.state.read().await;
        ControllerSnapshot {
            started: st.started,
            active: st.active,
            queued: st.queue.iter().cloned().collect(),
            entries: st
                .entries
                .iter()
                .map(|(href, entry)| (href.clone(), entry.state()))
                .collect(),
            stats: st.stats,
        }
    }

    /// State of a single entry, if tracked.
    pub async fn entry_state(&self, href: &str) -> Option<EntryState> {
        self.state.read().await.entries.get(href).map(PrefetchEntry::state)
    }

    /// Stored payload for a loaded entry.
    pub async fn loaded_payload(&self, href: &str) -> Option<serde_json::Value> {
        match self.state.read().await.entries.get(href) {
            Some(PrefetchEntry::Loaded { payload, .. }) => Some(payload.clone()),
            _ => None,
        }
    }
}

/// Point-in-time controller state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ControllerSnapshot {
    pub started: bool,
    pub active: usize,
    pub queued: Vec<String>,
    pub entries: HashMap<String, EntryState>,
    pub stats: PrefetchStats,
}
