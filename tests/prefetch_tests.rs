//! Integration tests for the prefetch controller.
//!
//! All tests run on a paused clock with a scripted fetcher, so debounce,
//! timeout and queue-spacing behavior is deterministic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use sixhop_accel::config::PrefetchConfig;
use sixhop_accel::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};
use sixhop_accel::prefetch::controller::{ClickOutcome, Prefetcher};
use sixhop_accel::prefetch::entry::EntryState;
use sixhop_accel::prefetch::events::{EffectiveConnectionType, PageEvent};

#[derive(Clone)]
enum Behavior {
    /// Instant success payload.
    Success,
    /// Success after a delay.
    Delay(Duration),
    /// Non-2xx response.
    Status(u16),
    /// Connection-level failure.
    Transport,
    /// 200 with a declared non-success status.
    Rejected,
    /// 200 with a body that is not JSON.
    Garbage,
}

/// Scripted fetcher keyed on the `page` query parameter, with a request log.
struct MockFetcher {
    log: Mutex<Vec<String>>,
    behaviors: Mutex<HashMap<String, Behavior>>,
}

impl MockFetcher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
            behaviors: Mutex::new(HashMap::new()),
        })
    }

    fn set(&self, page: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(page.to_string(), behavior);
    }

    fn fetch_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    /// Position of the first request for a page in the log.
    fn position_of(&self, page: &str) -> Option<usize> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .position(|url| page_of(url) == page)
    }
}

fn page_of(url: &str) -> String {
    url.split("page=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .unwrap_or("")
        .to_string()
}

fn json_response(status: u16, body: &str) -> FetchResponse {
    FetchResponse {
        status,
        headers: vec![("content-type".into(), "application/json".into())],
        body: Bytes::from(body.to_string()),
    }
}

fn success_response(page: &str) -> FetchResponse {
    json_response(
        200,
        &format!(r#"{{"status":"success","page_title":"{page}","links":[]}}"#),
    )
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let page = page_of(&request.url);
        let behavior = {
            self.log.lock().unwrap().push(request.url.clone());
            self.behaviors
                .lock()
                .unwrap()
                .get(&page)
                .cloned()
                .unwrap_or(Behavior::Success)
        };
        match behavior {
            Behavior::Success => Ok(success_response(&page)),
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(success_response(&page))
            }
            Behavior::Status(code) => Ok(FetchResponse {
                status: code,
                headers: vec![],
                body: Bytes::new(),
            }),
            Behavior::Transport => Err(FetchError::Transport("connection refused".into())),
            Behavior::Rejected => Ok(json_response(200, r#"{"status":"error","message":"no"}"#)),
            Behavior::Garbage => Ok(json_response(200, "<html>not json</html>")),
        }
    }
}

fn game_href(page: &str) -> String {
    format!("/game?page={page}&clicks=6&mytarget=Kyoto&difficulty=normal&start_time=1700000000")
}

fn controller(fetcher: Arc<MockFetcher>) -> Prefetcher {
    Prefetcher::new(PrefetchConfig::default(), fetcher)
}

#[tokio::test(start_paused = true)]
async fn test_non_game_links_never_prefetch() {
    let fetcher = MockFetcher::new();
    let prefetcher = controller(fetcher.clone());
    prefetcher.start().await;

    prefetcher.on_hover("/about".to_string()).await;
    prefetcher.on_hover("https://en.wikipedia.org/wiki/Tokyo".to_string()).await;
    prefetcher
        .on_page_loaded(vec!["/about".to_string(), "/ranking".to_string()])
        .await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(fetcher.fetch_count(), 0);
    assert!(prefetcher.snapshot().await.entries.is_empty());
    assert_eq!(
        prefetcher.on_click("/about").await,
        ClickOutcome::NotGameLink
    );
}

#[tokio::test(start_paused = true)]
async fn test_loaded_entry_is_never_refetched() {
    let fetcher = MockFetcher::new();
    let prefetcher = controller(fetcher.clone());

    prefetcher.prefetch(game_href("Tokyo")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fetcher.fetch_count(), 1);
    assert_eq!(
        prefetcher.entry_state(&game_href("Tokyo")).await,
        Some(EntryState::Loaded)
    );

    // Repeated prefetches of a loaded entry are no-ops.
    prefetcher.prefetch(game_href("Tokyo")).await;
    prefetcher.prefetch(game_href("Tokyo")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fetcher.fetch_count(), 1);

    // Clearing re-enables fetching.
    prefetcher
        .on_connection_change(EffectiveConnectionType::TwoG)
        .await;
    prefetcher.prefetch(game_href("Tokyo")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fetcher.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_bound_and_queue() {
    let fetcher = MockFetcher::new();
    for page in ["A", "B", "C"] {
        fetcher.set(page, Behavior::Delay(Duration::from_millis(500)));
    }
    let prefetcher = controller(fetcher.clone());

    for page in ["A", "B", "C", "D", "E"] {
        prefetcher.prefetch(game_href(page)).await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snap = prefetcher.snapshot().await;
    assert_eq!(snap.active, 3);
    assert_eq!(snap.queued, vec![game_href("D"), game_href("E")]);
    assert_eq!(fetcher.fetch_count(), 3);
    assert!(snap.entries.values().all(|s| *s == EntryState::Loading));

    // Everything drains once the slow fetches finish.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let snap = prefetcher.snapshot().await;
    assert_eq!(snap.active, 0);
    assert!(snap.queued.is_empty());
    assert_eq!(snap.entries.len(), 5);
    assert!(snap.entries.values().all(|s| *s == EntryState::Loaded));
    assert_eq!(fetcher.fetch_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_queue_drains_in_fifo_order() {
    let fetcher = MockFetcher::new();
    for page in ["A", "B", "C"] {
        fetcher.set(page, Behavior::Delay(Duration::from_millis(200)));
    }
    let prefetcher = controller(fetcher.clone());

    for page in ["A", "B", "C", "D", "E"] {
        prefetcher.prefetch(game_href(page)).await;
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    // D was queued before E, so it must be fetched before E.
    let d = fetcher.position_of("D").expect("D fetched");
    let e = fetcher.position_of("E").expect("E fetched");
    assert!(d < e, "expected FIFO dequeue, got D at {d}, E at {e}");
    assert!(d >= 3, "queued URLs run after the first wave");
}

#[tokio::test(start_paused = true)]
async fn test_requeued_href_keeps_oldest_position() {
    let fetcher = MockFetcher::new();
    fetcher.set("A", Behavior::Delay(Duration::from_millis(200)));
    fetcher.set("F", Behavior::Delay(Duration::from_millis(300)));
    let mut config = PrefetchConfig::default();
    config.max_concurrent = 1;
    let prefetcher = Prefetcher::new(config, fetcher.clone());

    for page in ["A", "D", "E"] {
        prefetcher.prefetch(game_href(page)).await;
    }

    // A frees its slot at 200 ms and dequeues D; while D sits out the
    // spacing delay, a fresh prefetch steals the slot. D must go back to
    // the front of the queue, still ahead of E.
    tokio::time::sleep(Duration::from_millis(250)).await;
    prefetcher.prefetch(game_href("F")).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snap = prefetcher.snapshot().await;
    assert_eq!(snap.entries.len(), 4);
    assert!(snap.entries.values().all(|s| *s == EntryState::Loaded));

    let d = fetcher.position_of("D").expect("D fetched");
    let e = fetcher.position_of("E").expect("E fetched");
    assert!(d < e, "D was queued before E, got D at {d}, E at {e}");
}

#[tokio::test(start_paused = true)]
async fn test_every_failure_path_releases_its_slot() {
    let fetcher = MockFetcher::new();
    fetcher.set("Status", Behavior::Status(503));
    fetcher.set("Transport", Behavior::Transport);
    fetcher.set("Rejected", Behavior::Rejected);
    fetcher.set("Garbage", Behavior::Garbage);
    // Longer than the 2 s fetch timeout.
    fetcher.set("Hang", Behavior::Delay(Duration::from_secs(3600)));
    let prefetcher = controller(fetcher.clone());

    for page in ["Status", "Transport", "Rejected", "Garbage", "Hang"] {
        prefetcher.prefetch(game_href(page)).await;
    }
    tokio::time::sleep(Duration::from_secs(10)).await;

    let snap = prefetcher.snapshot().await;
    assert_eq!(snap.active, 0, "every increment must be matched by a decrement");
    assert!(snap.queued.is_empty());
    // Failed entries are removed entirely so a later hover can retry.
    assert!(snap.entries.is_empty());
    assert_eq!(snap.stats.started, 5);
    assert_eq!(snap.stats.failed, 5);
    assert_eq!(snap.stats.loaded, 0);

    // A retry after failure is admitted again.
    fetcher.set("Status", Behavior::Success);
    prefetcher.prefetch(game_href("Status")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        prefetcher.entry_state(&game_href("Status")).await,
        Some(EntryState::Loaded)
    );
}

#[tokio::test(start_paused = true)]
async fn test_hover_debounce_keeps_only_latest() {
    let fetcher = MockFetcher::new();
    let prefetcher = controller(fetcher.clone());
    prefetcher.start().await;

    prefetcher.on_hover(game_href("First")).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    // Second hover before the 50 ms debounce fires cancels the first timer.
    prefetcher.on_hover(game_href("Second")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(fetcher.fetch_count(), 1);
    assert!(prefetcher.entry_state(&game_href("First")).await.is_none());
    assert_eq!(
        prefetcher.entry_state(&game_href("Second")).await,
        Some(EntryState::Loaded)
    );
}

#[tokio::test(start_paused = true)]
async fn test_hover_then_click_issues_no_extra_fetch() {
    let fetcher = MockFetcher::new();
    let prefetcher = controller(fetcher.clone());
    prefetcher.start().await;

    let href = game_href("Tokyo");
    prefetcher.on_hover(href.clone()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fetcher.fetch_count(), 1);

    let outcome = prefetcher
        .handle_event(PageEvent::Click { href: href.clone() })
        .await;
    assert_eq!(outcome, Some(ClickOutcome::Prefetched));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fetcher.fetch_count(), 1, "click must not fetch again");

    let snap = prefetcher.snapshot().await;
    assert_eq!(snap.stats.click_hits, 1);
    assert_eq!(snap.stats.click_misses, 0);
}

#[tokio::test(start_paused = true)]
async fn test_click_without_prefetch_counts_as_miss() {
    let fetcher = MockFetcher::new();
    let prefetcher = controller(fetcher.clone());
    prefetcher.start().await;

    let outcome = prefetcher.on_click(&game_href("Kyoto")).await;
    assert_eq!(outcome, ClickOutcome::NotPrefetched);
    assert_eq!(prefetcher.snapshot().await.stats.click_misses, 1);
}

#[tokio::test(start_paused = true)]
async fn test_hidden_tab_cancels_pending_debounce_only() {
    let fetcher = MockFetcher::new();
    fetcher.set("Inflight", Behavior::Delay(Duration::from_millis(500)));
    let prefetcher = controller(fetcher.clone());
    prefetcher.start().await;

    // An in-flight prefetch keeps running when the tab hides.
    prefetcher.prefetch(game_href("Inflight")).await;

    prefetcher.on_hover(game_href("Pending")).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    prefetcher.on_visibility(true).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(prefetcher.entry_state(&game_href("Pending")).await.is_none());
    assert_eq!(
        prefetcher.entry_state(&game_href("Inflight")).await,
        Some(EntryState::Loaded)
    );

    // New hovers are suppressed while hidden, resumed once visible.
    prefetcher.on_hover(game_href("WhileHidden")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(prefetcher.entry_state(&game_href("WhileHidden")).await.is_none());

    prefetcher.on_visibility(false).await;
    prefetcher.on_hover(game_href("WhileHidden")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        prefetcher.entry_state(&game_href("WhileHidden")).await,
        Some(EntryState::Loaded)
    );
}

#[tokio::test(start_paused = true)]
async fn test_page_load_prefetches_up_to_limit() {
    let fetcher = MockFetcher::new();
    let prefetcher = controller(fetcher.clone());
    prefetcher.start().await;

    let mut links = vec!["/ranking".to_string()];
    for i in 0..7 {
        links.push(game_href(&format!("P{i}")));
    }
    prefetcher
        .handle_event(PageEvent::PageLoaded {
            visible_links: links,
        })
        .await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(fetcher.fetch_count(), 5);
    for i in 0..5 {
        assert_eq!(
            prefetcher.entry_state(&game_href(&format!("P{i}"))).await,
            Some(EntryState::Loaded)
        );
    }
    assert!(prefetcher.entry_state(&game_href("P5")).await.is_none());
    assert!(prefetcher.entry_state(&game_href("P6")).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_connection_clears_all_entries() {
    let fetcher = MockFetcher::new();
    let prefetcher = controller(fetcher.clone());
    prefetcher.start().await;

    for page in ["A", "B", "C"] {
        prefetcher.prefetch(game_href(page)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(prefetcher.snapshot().await.entries.len(), 3);

    prefetcher
        .handle_event(PageEvent::Connection {
            effective_type: EffectiveConnectionType::TwoG,
        })
        .await;

    let snap = prefetcher.snapshot().await;
    assert!(snap.entries.is_empty());
    assert_eq!(snap.stats.cleared, 1);

    // A fast connection change leaves the cache alone.
    prefetcher.prefetch(game_href("D")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    prefetcher
        .on_connection_change(EffectiveConnectionType::FourG)
        .await;
    assert_eq!(prefetcher.snapshot().await.entries.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_controller_drops_events() {
    let fetcher = MockFetcher::new();
    let prefetcher = controller(fetcher.clone());

    // Never started: all events are dropped.
    let outcome = prefetcher
        .handle_event(PageEvent::Hover {
            href: game_href("Tokyo"),
        })
        .await;
    assert_eq!(outcome, None);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fetcher.fetch_count(), 0);

    // Stop cancels a pending debounce timer.
    prefetcher.start().await;
    prefetcher.on_hover(game_href("Tokyo")).await;
    prefetcher.stop().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_loaded_payload_is_kept() {
    let fetcher = MockFetcher::new();
    let prefetcher = controller(fetcher.clone());

    prefetcher.prefetch(game_href("Tokyo")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let payload = prefetcher.loaded_payload(&game_href("Tokyo")).await.unwrap();
    assert_eq!(payload["status"], "success");
    assert_eq!(payload["page_title"], "Tokyo");
}
