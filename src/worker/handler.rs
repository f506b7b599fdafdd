//! Fetch interception: one handler per caching policy.
//!
//! Every proxied request goes through [`CacheWorker::handle_fetch`], which
//! classifies it and applies the matching policy. Until the worker is active,
//! requests pass straight through to the network.

use tracing::{debug, warn};

use crate::fetch::{FetchError, FetchRequest, FetchResponse};
use crate::worker::classifier::{classify, CachePolicy};
use crate::worker::lifecycle::CacheWorker;
use crate::worker::store::CachedResponse;

impl CacheWorker {
    /// Intercept one request and answer it under the applicable policy.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        if !self.state().await.can_intercept() {
            return self.fetcher.fetch(request).await;
        }

        match classify(request, &self.config) {
            CachePolicy::CacheFirst => self.cache_first(request).await,
            CachePolicy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
            CachePolicy::NetworkFirst => self.network_first(request).await,
        }
    }

    /// Static assets: serve a cache hit; on a miss fetch the network, store a
    /// copy iff the status is exactly 200, and return the network response
    /// unchanged. A network error propagates: there is no cache fallback for
    /// a first-time static fetch.
    async fn cache_first(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        if let Some(cached) = self.storage.match_any(&request.url).await {
            debug!(url = request.url, "Static asset served from cache");
            return Ok(cached.to_response());
        }

        let response = self.fetcher.fetch(request).await?;
        if response.status == 200 {
            self.storage
                .put(
                    &self.config.static_partition,
                    &request.url,
                    CachedResponse::from_response(&response),
                )
                .await;
            debug!(url = request.url, "Static asset cached");
        }
        Ok(response)
    }

    /// Game data: a hit is returned immediately while a background fetch
    /// refreshes the entry for next time; the caller never waits on the
    /// refresh. A miss falls through to the network.
    async fn stale_while_revalidate(
        &self,
        request: &FetchRequest,
    ) -> Result<FetchResponse, FetchError> {
        let partition = self.config.api_partition.clone();

        if let Some(cached) = self.storage.lookup(&partition, &request.url).await {
            debug!(url = request.url, "Game data served from cache");
            let storage = self.storage.clone();
            let fetcher = self.fetcher.clone();
            let request = request.clone();
            tokio::spawn(async move {
                match fetcher.fetch(&request).await {
                    Ok(response) if response.status == 200 => {
                        storage
                            .put(&partition, &request.url, CachedResponse::from_response(&response))
                            .await;
                        debug!(url = request.url, "Game data revalidated");
                    }
                    Ok(response) => {
                        debug!(url = request.url, status = response.status, "Revalidation not stored");
                    }
                    Err(err) => {
                        debug!(url = request.url, error = %err, "Revalidation failed");
                    }
                }
            });

            return Ok(cached.to_response());
        }

        let response = self.fetcher.fetch(request).await?;
        if response.status == 200 {
            self.storage
                .put(&partition, &request.url, CachedResponse::from_response(&response))
                .await;
        }
        Ok(response)
    }

    /// Everything else: network first, with the cache as a last resort. If
    /// both fail, the original network error surfaces to the caller.
    async fn network_first(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        match self.fetcher.fetch(request).await {
            Ok(response) => Ok(response),
            Err(err) => match self.storage.match_any(&request.url).await {
                Some(cached) => {
                    warn!(url = request.url, error = %err, "Network failed, serving cached copy");
                    Ok(cached.to_response())
                }
                None => Err(err),
            },
        }
    }
}
