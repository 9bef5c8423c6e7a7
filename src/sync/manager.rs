use std::sync::{Arc, Mutex, Weak};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::applier::EventApplier;
use super::backoff::{RetryBackoff, NEVER};
use super::notifications::{recent_unread_downloads, DownloadNotificationGrouper};
use super::playlists::reconcile_playlists;
use super::SyncState;
use crate::api::{ApiError, RemoteApi, SyncEventsPage, SyncSnapshot};
use crate::config::SyncConfig;
use crate::model::{ContentType, DownloadCompletedData, Permission, Playlist};
use crate::observable::Observable;
use crate::stores::{DownloadStatusSink, SystemNotifier, UserDataStore};
use crate::sync_db::SyncDb;
use crate::sync_events::StoredEvent;

/// Keeps the local user data in step with the server event log.
///
/// All public operations are serialized: a second call waits for the one in
/// flight. Failures never escape; they surface as [`SyncState::Error`], arm
/// the retry timer and make the operation return `false`.
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn RemoteApi>,
    db: Arc<SyncDb>,
    store: Arc<dyn UserDataStore>,
    notifier: Arc<dyn SystemNotifier>,
    grouper: Arc<DownloadNotificationGrouper>,
    applier: EventApplier,
    config: SyncConfig,
    state: Observable<SyncState>,
    backoff: Mutex<RetryBackoff>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
    op_lock: tokio::sync::Mutex<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.retry_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

impl SyncManager {
    pub fn new(
        config: SyncConfig,
        api: Arc<dyn RemoteApi>,
        db: Arc<SyncDb>,
        store: Arc<dyn UserDataStore>,
        downloads: Arc<dyn DownloadStatusSink>,
        notifier: Arc<dyn SystemNotifier>,
    ) -> Self {
        let grouper = Arc::new(DownloadNotificationGrouper::new(
            Arc::clone(&notifier),
            config.download_notification_debounce(),
        ));
        let applier = EventApplier::new(
            Arc::clone(&store),
            downloads,
            Arc::clone(&notifier),
            Arc::clone(&grouper),
        );
        Self {
            inner: Arc::new(Inner {
                api,
                db,
                store,
                notifier,
                grouper,
                applier,
                backoff: Mutex::new(RetryBackoff::from_config(&config)),
                config,
                state: Observable::new(SyncState::Idle),
                retry_task: Mutex::new(None),
                op_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn state(&self) -> SyncState {
        self.inner.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// Full sync when there is no usable cursor, catch-up otherwise.
    pub async fn initialize(&self) -> bool {
        let _op = self.inner.op_lock.lock().await;
        self.initialize_locked().await
    }

    pub async fn full_sync(&self) -> bool {
        let _op = self.inner.op_lock.lock().await;
        self.full_sync_locked().await
    }

    pub async fn catch_up(&self) -> bool {
        let _op = self.inner.op_lock.lock().await;
        self.catch_up_locked().await
    }

    /// Apply one event pushed over the live connection.
    pub async fn handle_sync_message(&self, event: StoredEvent) -> bool {
        let _op = self.inner.op_lock.lock().await;

        let cursor = match self.inner.db.cursor() {
            Ok(cursor) => cursor,
            Err(e) => {
                self.fail(format!("{e:#}"));
                return false;
            }
        };
        if event.seq > cursor.saturating_add(1) {
            tracing::info!(
                "Live event {} skips ahead of cursor {}, catching up",
                event.seq,
                cursor
            );
            return self.catch_up_locked().await;
        }
        if event.seq <= cursor {
            tracing::debug!("Live event {} already applied (cursor {})", event.seq, cursor);
            self.mark_synced(cursor);
            return true;
        }

        let applied = match self.inner.applier.apply(&event).await {
            Ok(()) => self.inner.db.advance_cursor(event.seq),
            Err(e) => Err(e),
        };
        match applied {
            Ok(cursor) => {
                self.mark_synced(cursor);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to apply live event {}: {:#}", event.seq, e);
                self.fail(format!("{e:#}"));
                false
            }
        }
    }

    /// Forget everything about the current user's sync position (logout).
    pub async fn cleanup(&self) {
        // Abort first so a retry holding the op lock lets go of it.
        self.cancel_retry();
        let _op = self.inner.op_lock.lock().await;
        self.cancel_retry();
        self.inner.grouper.cancel();
        if let Err(e) = self.inner.db.clear_sync_state() {
            tracing::error!("Failed to clear sync state: {:#}", e);
        }
        if let Ok(mut backoff) = self.inner.backoff.lock() {
            backoff.reset();
        }
        self.inner.state.set(SyncState::Idle);
    }

    // ── Operation bodies (op lock held) ─────────────────────────────

    async fn initialize_locked(&self) -> bool {
        let plan = self
            .inner
            .db
            .cursor()
            .and_then(|cursor| Ok((cursor, self.inner.db.needs_full_sync()?)));
        match plan {
            Ok((0, _)) | Ok((_, true)) => self.full_sync_locked().await,
            Ok(_) => self.catch_up_locked().await,
            Err(e) => {
                tracing::error!("Failed to read sync cursor: {:#}", e);
                self.full_sync_locked().await
            }
        }
    }

    async fn full_sync_locked(&self) -> bool {
        self.inner.state.set(SyncState::Syncing);
        tracing::info!("Starting full sync");

        let result = match self.inner.api.get_sync_state().await {
            Ok(snapshot) => self.apply_snapshot(snapshot).await,
            Err(e) => Err(anyhow::Error::new(e).context("Failed to fetch sync state")),
        };
        match result {
            Ok(seq) => {
                tracing::info!("Full sync complete at seq {}", seq);
                self.succeed(seq).await;
                true
            }
            Err(e) => {
                tracing::warn!("Full sync failed: {:#}", e);
                if let Err(e) = self.inner.db.set_needs_full_sync(true) {
                    tracing::error!("{:#}", e);
                }
                self.fail(format!("{e:#}"));
                false
            }
        }
    }

    async fn catch_up_locked(&self) -> bool {
        let cursor = match self.inner.db.cursor() {
            Ok(cursor) => cursor,
            Err(e) => {
                self.fail(format!("{e:#}"));
                return false;
            }
        };
        self.inner.state.set(SyncState::Syncing);

        match self.inner.api.get_sync_events(cursor).await {
            Ok(mut page) => {
                page.events.sort_by_key(|e| e.seq);
                if let Some(first) = page.events.first() {
                    if first.seq > cursor.saturating_add(1) {
                        tracing::info!(
                            "Event log gap: cursor {} but first event is {}, running full sync",
                            cursor,
                            first.seq
                        );
                        return self.full_sync_locked().await;
                    }
                }
                match self.apply_page(cursor, page).await {
                    Ok(seq) => {
                        self.succeed(seq).await;
                        true
                    }
                    Err(e) => {
                        tracing::warn!("Catch-up failed: {:#}", e);
                        self.fail(format!("{e:#}"));
                        false
                    }
                }
            }
            Err(ApiError::EventsPruned) => {
                tracing::info!("Events since {} were pruned, running full sync", cursor);
                if let Err(e) = self.inner.db.set_needs_full_sync(true) {
                    tracing::error!("{:#}", e);
                }
                self.full_sync_locked().await
            }
            Err(e) => {
                tracing::warn!("Failed to fetch events since {}: {}", cursor, e);
                self.fail(e.to_string());
                false
            }
        }
    }

    // ── Steps ───────────────────────────────────────────────────────

    async fn apply_snapshot(&self, snapshot: SyncSnapshot) -> Result<u64> {
        let store = &self.inner.store;
        let now = chrono::Utc::now().timestamp();

        // Liked content is taken wholesale; pending local likes are not kept.
        for (content_type, ids) in [
            (ContentType::Album, &snapshot.likes.albums),
            (ContentType::Artist, &snapshot.likes.artists),
            (ContentType::Track, &snapshot.likes.tracks),
        ] {
            store
                .replace_liked(content_type, ids, now)
                .await
                .with_context(|| format!("Failed to replace liked {}s", content_type))?;
        }

        store
            .replace_permissions(&Permission::known(&snapshot.permissions))
            .await
            .context("Failed to replace permissions")?;

        for setting in &snapshot.settings {
            store.apply_setting(setting).await?;
        }

        let pending: Vec<Playlist> = store
            .playlists()
            .await?
            .into_iter()
            .filter(Playlist::is_pending)
            .collect();
        let merged = reconcile_playlists(&snapshot.playlists, &pending);
        store
            .replace_playlists(&merged)
            .await
            .context("Failed to replace playlists")?;

        store
            .replace_notifications(&snapshot.notifications)
            .await
            .context("Failed to replace notifications")?;

        let cutoff = now - self.inner.config.recent_download_window().num_seconds();
        let recent = recent_unread_downloads(&snapshot.notifications, cutoff);
        if !recent.is_empty() {
            let (ids, items): (Vec<String>, Vec<DownloadCompletedData>) = recent.into_iter().unzip();
            self.inner
                .notifier
                .show_grouped_downloads_completed(&items, &ids)
                .await;
        }

        self.inner.db.set_cursor(snapshot.seq)?;
        self.inner.db.set_needs_full_sync(false)?;
        Ok(snapshot.seq)
    }

    /// Apply a gap-free page; returns the cursor afterwards.
    async fn apply_page(&self, cursor: u64, page: SyncEventsPage) -> Result<u64> {
        let mut cursor = cursor;
        for event in &page.events {
            if event.seq <= cursor {
                tracing::debug!("Skipping already applied event {}", event.seq);
                continue;
            }
            self.inner
                .applier
                .apply(event)
                .await
                .with_context(|| format!("Failed to apply event {} ({})", event.seq, event.event.event_type()))?;
            cursor = self.inner.db.advance_cursor(event.seq)?;
        }
        if page.current_seq > cursor {
            cursor = self.inner.db.advance_cursor(page.current_seq)?;
        }
        self.inner.db.set_needs_full_sync(false)?;
        Ok(cursor)
    }

    async fn succeed(&self, seq: u64) {
        self.mark_synced(seq);
        self.acknowledge_pending_reads().await;
    }

    /// Reset the backoff, drop any pending retry and publish `Synced(seq)`.
    fn mark_synced(&self, seq: u64) {
        if let Ok(mut backoff) = self.inner.backoff.lock() {
            backoff.reset();
        }
        self.cancel_retry();
        self.inner.state.set(SyncState::Synced(seq));
    }

    fn fail(&self, message: String) {
        self.inner.state.set(SyncState::Error(message));
        self.schedule_retry();
    }

    /// Push notification reads made offline. Failures stay queued.
    async fn acknowledge_pending_reads(&self) {
        let pending = match self.inner.store.pending_reads().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Failed to load pending notification reads: {:#}", e);
                return;
            }
        };
        for id in pending {
            match self.inner.api.mark_notification_read(&id).await {
                Ok(()) | Err(ApiError::NotFound) => {
                    if let Err(e) = self.inner.store.remove_pending_read(&id).await {
                        tracing::warn!("Failed to drop pending read {}: {:#}", id, e);
                    }
                }
                Err(e) => {
                    tracing::debug!("Notification read {} not acknowledged: {}", id, e);
                }
            }
        }
    }

    // ── Retry timer ─────────────────────────────────────────────────

    fn schedule_retry(&self) {
        let delay = match self.inner.backoff.lock() {
            Ok(mut backoff) => backoff.next_delay(),
            Err(e) => {
                tracing::error!("Retry backoff poisoned: {}", e);
                NEVER
            }
        };
        if delay == NEVER {
            tracing::debug!("Automatic sync retry disabled");
            return;
        }
        tracing::info!("Retrying sync in {:?}", delay);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = SyncManager { inner };
            // Fired; a reschedule from inside initialize must not abort this task.
            if let Ok(mut slot) = manager.inner.retry_task.lock() {
                slot.take();
            }
            manager.initialize().await;
        });

        if let Ok(mut slot) = self.inner.retry_task.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
    }

    fn cancel_retry(&self) {
        if let Ok(mut slot) = self.inner.retry_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}
