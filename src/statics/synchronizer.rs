use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;

use super::FetchWaker;
use crate::api::{ApiResult, BatchContentRequest, BatchItem, RemoteApi};
use crate::config::FetchConfig;
use crate::fetch_state::{now_ms, FetchErrorReason, FetchState};
use crate::model::{Album, CatalogEntity, ItemType};
use crate::stores::CatalogCache;
use crate::sync_db::SyncDb;

/// What one scheduler cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub attempted: usize,
    pub resolved: usize,
    pub failed: usize,
    /// Records still `Loading` when nothing was ready.
    pub loading: usize,
}

/// Background fetcher for catalog items that have an outstanding fetch state.
pub struct StaticsSynchronizer {
    api: Arc<dyn RemoteApi>,
    cache: Arc<dyn CatalogCache>,
    db: Arc<SyncDb>,
    config: FetchConfig,
    waker: FetchWaker,
}

impl StaticsSynchronizer {
    pub fn new(
        config: FetchConfig,
        api: Arc<dyn RemoteApi>,
        cache: Arc<dyn CatalogCache>,
        db: Arc<SyncDb>,
    ) -> Self {
        Self {
            api,
            cache,
            db,
            config,
            waker: FetchWaker::new(),
        }
    }

    pub fn waker(&self) -> FetchWaker {
        self.waker.clone()
    }

    /// Run the scheduler loop on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(&self) {
        match self.db.reset_loading() {
            Ok(0) => {}
            Ok(n) => tracing::info!("Reset {} fetch states left loading", n),
            Err(e) => tracing::warn!("Failed to reset loading fetch states: {:#}", e),
        }

        let min_idle = Duration::from_millis(self.config.min_idle_ms.max(1));
        let max_idle = Duration::from_millis(self.config.max_idle_ms).max(min_idle);
        let mut idle = min_idle;

        loop {
            let sleep_for = match self.run_cycle().await {
                Ok(outcome) if outcome.attempted > 0 => {
                    idle = min_idle;
                    tokio::task::yield_now().await;
                    continue;
                }
                Ok(outcome) if outcome.loading > 0 => min_idle,
                Ok(_) => {
                    let current = idle;
                    idle = (idle * 2).min(max_idle);
                    current
                }
                Err(e) => {
                    tracing::warn!("Fetch cycle failed: {:#}", e);
                    let current = idle;
                    idle = (idle * 2).min(max_idle);
                    current
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.waker.woken() => {
                    idle = min_idle;
                }
            }
        }
    }

    /// Pick up every ready record, fetch, and record the results.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let now = now_ms();
        let ready = self.db.ready_fetch_states(now, self.config.max_batch_size.max(1))?;
        if ready.is_empty() {
            return Ok(CycleOutcome {
                loading: self.db.loading_count()?,
                ..CycleOutcome::default()
            });
        }

        let loading: Vec<FetchState> = ready.into_iter().map(|s| s.loading(now)).collect();
        self.db.put_fetch_states(&loading)?;

        let mut outcome = CycleOutcome {
            attempted: loading.len(),
            ..CycleOutcome::default()
        };
        let (batchable, discographies): (Vec<FetchState>, Vec<FetchState>) = loading
            .into_iter()
            .partition(|s| s.item_type.is_batchable());

        if !batchable.is_empty() {
            self.fetch_batch(batchable, &mut outcome).await;
        }
        for state in discographies {
            self.fetch_discography(state, &mut outcome).await;
        }

        tracing::debug!(
            "Fetch cycle: {} attempted, {} resolved, {} failed",
            outcome.attempted,
            outcome.resolved,
            outcome.failed
        );
        Ok(outcome)
    }

    async fn fetch_batch(&self, items: Vec<FetchState>, outcome: &mut CycleOutcome) {
        let mut request = BatchContentRequest::default();
        for state in &items {
            let ids = match state.item_type {
                ItemType::Artist => &mut request.artists,
                ItemType::Album => &mut request.albums,
                ItemType::Track => &mut request.tracks,
                ItemType::Discography => continue,
            };
            ids.push(state.item_id.clone());
        }

        let mut response = match self.api.get_batch_content(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Batch fetch of {} items failed: {}", items.len(), e);
                // The whole call failed, so no item got a server verdict.
                let now = now_ms();
                let failed: Vec<FetchState> = items
                    .into_iter()
                    .map(|s| s.failed(FetchErrorReason::Network, now, &self.config))
                    .collect();
                self.record_failures(&failed, outcome);
                return;
            }
        };

        let mut failed = Vec::new();
        for state in items {
            let resolved = match state.item_type {
                ItemType::Artist => take_item(&mut response.artists, &state.item_id, CatalogEntity::Artist),
                ItemType::Album => take_item(&mut response.albums, &state.item_id, CatalogEntity::Album),
                ItemType::Track => take_item(&mut response.tracks, &state.item_id, CatalogEntity::Track),
                ItemType::Discography => continue,
            };

            let reason = match resolved {
                Ok(entity) => match self.cache.put(entity).await {
                    Ok(()) => {
                        self.resolved(&state, outcome);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to cache {} {}: {:#}", state.item_type, state.item_id, e);
                        FetchErrorReason::Client
                    }
                },
                Err(reason) => reason,
            };
            tracing::debug!("{} {} not fetched: {:?}", state.item_type, state.item_id, reason);
            failed.push(state.failed(reason, now_ms(), &self.config));
        }

        self.record_failures(&failed, outcome);
    }

    async fn fetch_discography(&self, state: FetchState, outcome: &mut CycleOutcome) {
        let reason = match self.fetch_albums(&state.item_id).await {
            Ok(albums) => match self.store_discography(&state.item_id, albums).await {
                Ok(()) => {
                    self.resolved(&state, outcome);
                    return;
                }
                Err(e) => {
                    tracing::warn!("Failed to cache discography of {}: {:#}", state.item_id, e);
                    FetchErrorReason::Client
                }
            },
            Err(e) => {
                tracing::warn!("Discography fetch for {} failed: {}", state.item_id, e);
                e.fetch_reason()
            }
        };
        self.record_failures(&[state.failed(reason, now_ms(), &self.config)], outcome);
    }

    /// Page through an artist's albums up to the configured cap.
    async fn fetch_albums(&self, artist_id: &str) -> ApiResult<Vec<Album>> {
        let cap = self.config.max_discography_albums;
        let page_size = self.config.discography_page_size.max(1);
        let mut albums: Vec<Album> = Vec::new();
        let mut offset = 0;

        while albums.len() < cap {
            let limit = page_size.min(cap - albums.len());
            let page = self.api.get_artist_discography(artist_id, offset, limit).await?;
            let received = page.albums.len();
            albums.extend(page.albums);
            offset += received;
            if !page.has_more || received == 0 {
                break;
            }
        }

        if albums.len() >= cap {
            tracing::debug!("Discography of {} capped at {} albums", artist_id, cap);
        }
        albums.truncate(cap);
        Ok(albums)
    }

    async fn store_discography(&self, artist_id: &str, albums: Vec<Album>) -> Result<()> {
        let album_ids: Vec<String> = albums.iter().map(|a| a.id.clone()).collect();
        for album in albums {
            self.cache.put(CatalogEntity::Album(album)).await?;
        }
        self.cache.merge_discography(artist_id, &album_ids).await
    }

    /// Persist failed records. A write error leaves them `Loading` until the
    /// next start resets them; the rest of the cycle still runs.
    fn record_failures(&self, failed: &[FetchState], outcome: &mut CycleOutcome) {
        if failed.is_empty() {
            return;
        }
        outcome.failed += failed.len();
        if let Err(e) = self.db.put_fetch_states(failed) {
            tracing::warn!("Failed to record {} fetch failures: {:#}", failed.len(), e);
        }
    }

    fn resolved(&self, state: &FetchState, outcome: &mut CycleOutcome) {
        outcome.resolved += 1;
        if let Err(e) = self.db.remove_fetch_state(state.item_type, &state.item_id) {
            tracing::warn!("Failed to clear fetch state {}: {:#}", state.key(), e);
        }
    }
}

/// Missing ids count as not found.
fn take_item<T>(
    items: &mut HashMap<String, BatchItem<T>>,
    id: &str,
    wrap: fn(T) -> CatalogEntity,
) -> std::result::Result<CatalogEntity, FetchErrorReason> {
    match items.remove(id) {
        Some(BatchItem::Ok(item)) => Ok(wrap(item)),
        Some(BatchItem::Error(e)) => Err(e.fetch_reason()),
        None => Err(FetchErrorReason::NotFound),
    }
}
