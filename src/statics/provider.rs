use std::sync::Arc;

use futures_util::stream::{self, Stream};
use tokio::sync::watch;

use super::FetchWaker;
use crate::fetch_state::{now_ms, FetchErrorReason, FetchState, FetchStatus};
use crate::model::{CatalogEntity, ItemType};
use crate::stores::CatalogCache;
use crate::sync_db::SyncDb;

/// What a consumer should currently show for one catalog item.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentFrame {
    Loading,
    Error(FetchErrorReason),
    Loaded(CatalogEntity),
}

/// Read side of catalog content: cache hits are served directly, misses are
/// queued for the synchronizer.
#[derive(Clone)]
pub struct LiveContentProvider {
    cache: Arc<dyn CatalogCache>,
    db: Arc<SyncDb>,
    waker: FetchWaker,
}

impl LiveContentProvider {
    pub fn new(cache: Arc<dyn CatalogCache>, db: Arc<SyncDb>, waker: FetchWaker) -> Self {
        Self { cache, db, waker }
    }

    /// Stream of frames for one item, recomputed whenever the cache or the
    /// fetch states change. Consecutive equal frames are dropped.
    ///
    /// Each call starts over from the current state; the stream ends when
    /// both change feeds are closed.
    pub fn observe(&self, item_type: ItemType, id: &str) -> impl Stream<Item = ContentFrame> + Send + 'static {
        let watch = Watcher {
            provider: self.clone(),
            item_type,
            id: id.to_string(),
            cache_rx: self.cache.subscribe(),
            fetch_rx: self.db.subscribe(),
            last: None,
            started: false,
        };

        stream::unfold(watch, |mut w| async move {
            loop {
                if w.started && !w.wait_for_change().await {
                    return None;
                }
                w.started = true;

                let frame = w.provider.current(w.item_type, &w.id).await;
                if w.last.as_ref() != Some(&frame) {
                    w.last = Some(frame.clone());
                    return Some((frame, w));
                }
            }
        })
    }

    /// Compute the frame for one item right now.
    ///
    /// An errored fetch state is re-armed for an immediate retry; an unknown
    /// item gets a fresh fetch state. Both wake the synchronizer.
    pub async fn current(&self, item_type: ItemType, id: &str) -> ContentFrame {
        match self.resolve(item_type, id).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to resolve {} {}: {:#}", item_type, id, e);
                ContentFrame::Error(FetchErrorReason::Client)
            }
        }
    }

    async fn resolve(&self, item_type: ItemType, id: &str) -> anyhow::Result<ContentFrame> {
        if let Some(entity) = self.cache.get(item_type, id).await? {
            return Ok(ContentFrame::Loaded(entity));
        }

        let now = now_ms();
        match self.db.fetch_state(item_type, id)? {
            Some(state) => match state.status {
                FetchStatus::Idle | FetchStatus::Loading => Ok(ContentFrame::Loading),
                FetchStatus::Error => {
                    let reason = state.error_reason.unwrap_or(FetchErrorReason::Unknown);
                    self.db.put_fetch_state(&state.rearmed(now))?;
                    self.waker.wake();
                    Ok(ContentFrame::Error(reason))
                }
            },
            None => {
                self.db
                    .put_fetch_state(&FetchState::requested(item_type, id, now))?;
                self.waker.wake();
                Ok(ContentFrame::Loading)
            }
        }
    }
}

struct Watcher {
    provider: LiveContentProvider,
    item_type: ItemType,
    id: String,
    cache_rx: watch::Receiver<u64>,
    fetch_rx: watch::Receiver<u64>,
    last: Option<ContentFrame>,
    started: bool,
}

impl Watcher {
    /// False once both feeds are gone.
    async fn wait_for_change(&mut self) -> bool {
        tokio::select! {
            changed = self.cache_rx.changed() => {
                changed.is_ok() || self.fetch_rx.changed().await.is_ok()
            }
            changed = self.fetch_rx.changed() => {
                changed.is_ok() || self.cache_rx.changed().await.is_ok()
            }
        }
    }
}
