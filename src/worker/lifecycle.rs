//! Cache worker lifecycle: install, activate, and the control channel.
//!
//! The worker moves `Installing → Waiting → Active`. Install precaches the
//! static asset manifest; activate purges partitions left over from previous
//! versions and starts intercepting. A `SKIP_WAITING` control message forces
//! activation without waiting.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::fetch::{FetchError, FetchRequest, Fetcher};
use crate::worker::store::{CacheStorage, CachedResponse};

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Precaching the static manifest.
    Installing,
    /// Installed, not yet controlling requests.
    Waiting,
    /// Intercepting every request.
    Active,
}

impl WorkerState {
    /// Whether fetches are routed through the caching policies.
    pub fn can_intercept(&self) -> bool {
        matches!(self, WorkerState::Active)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Waiting => write!(f, "waiting"),
            WorkerState::Active => write!(f, "active"),
        }
    }
}

/// Control messages accepted from the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("precache of {asset} failed: {source}")]
    Precache {
        asset: String,
        #[source]
        source: FetchError,
    },

    #[error("precache of {asset} got HTTP {status}")]
    PrecacheStatus { asset: String, status: u16 },

    #[error("invalid lifecycle state: expected {expected}, found {found}")]
    InvalidState {
        expected: WorkerState,
        found: WorkerState,
    },
}

/// The cache worker: owns the partitions, the upstream fetcher, and the
/// lifecycle state. Fetch interception lives in [`crate::worker::handler`].
pub struct CacheWorker {
    pub(crate) storage: Arc<CacheStorage>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) config: Arc<CacheConfig>,
    state: RwLock<WorkerState>,
}

impl CacheWorker {
    pub fn new(config: CacheConfig, storage: Arc<CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            storage,
            fetcher,
            config: Arc::new(config),
            state: RwLock::new(WorkerState::Installing),
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// The underlying partition store, for stats reporting.
    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    /// Precache the static manifest into the static partition.
    ///
    /// By default a failing asset is skipped so one dead CDN entry cannot
    /// disable the whole cache layer; `require_full_precache` restores
    /// all-or-nothing batch semantics.
    pub async fn install(&self) -> Result<(), WorkerError> {
        let state = self.state().await;
        if state != WorkerState::Installing {
            return Err(WorkerError::InvalidState {
                expected: WorkerState::Installing,
                found: state,
            });
        }

        self.storage.open(&self.config.static_partition).await;

        let mut cached = 0usize;
        for asset in &self.config.precache_manifest {
            let request = FetchRequest::get(asset.clone());
            match self.fetcher.fetch(&request).await {
                Ok(response) if response.is_ok() => {
                    self.storage
                        .put(
                            &self.config.static_partition,
                            asset,
                            CachedResponse::from_response(&response),
                        )
                        .await;
                    cached += 1;
                }
                Ok(response) => {
                    if self.config.require_full_precache {
                        return Err(WorkerError::PrecacheStatus {
                            asset: asset.clone(),
                            status: response.status,
                        });
                    }
                    warn!(asset, status = response.status, "Skipping precache asset");
                }
                Err(source) => {
                    if self.config.require_full_precache {
                        return Err(WorkerError::Precache {
                            asset: asset.clone(),
                            source,
                        });
                    }
                    warn!(asset, error = %source, "Skipping unreachable precache asset");
                }
            }
        }

        *self.state.write().await = WorkerState::Waiting;
        info!(
            cached,
            manifest = self.config.precache_manifest.len(),
            "Worker installed"
        );
        Ok(())
    }

    /// Purge partitions from previous versions, then start intercepting
    /// immediately (the claim step: no reload needed).
    pub async fn activate(&self) -> Result<(), WorkerError> {
        let state = self.state().await;
        if state == WorkerState::Active {
            return Ok(());
        }
        if state != WorkerState::Waiting {
            return Err(WorkerError::InvalidState {
                expected: WorkerState::Waiting,
                found: state,
            });
        }

        let live = self.config.live_partitions();
        for name in self.storage.partition_names().await {
            if !live.contains(&name.as_str()) {
                self.storage.delete_partition(&name).await;
                info!(partition = name, "Deleted old cache partition");
            }
        }

        *self.state.write().await = WorkerState::Active;
        info!("Worker activated");
        Ok(())
    }

    /// Handle a control message from the page.
    pub async fn handle_message(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::SkipWaiting => {
                let state = self.state().await;
                if state == WorkerState::Waiting {
                    info!("Skip-waiting requested, activating");
                    if let Err(err) = self.activate().await {
                        warn!(error = %err, "Skip-waiting activation failed");
                    }
                } else {
                    debug!(%state, "Skip-waiting ignored");
                }
            }
        }
    }
}
