//! Scripted fakes and fixtures shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::api::{
    ApiError, ApiResult, BatchContentRequest, BatchContentResponse, DiscographyPage, RemoteApi,
    SyncEventsPage, SyncSnapshot,
};
use crate::model::{
    Album, Artist, CatalogEntity, ContentType, DownloadCompletedData, ItemType, Notification,
    NotificationType,
};
use crate::stores::{
    CatalogCache, DownloadStatusSink, MemoryCatalogCache, SystemNotifier, WhatsNewCounts,
};
use crate::sync_events::{StoredEvent, UserEvent};

// ── Fixtures ─────────────────────────────────────────────────────────

pub fn event(seq: u64, event: UserEvent) -> StoredEvent {
    StoredEvent {
        seq,
        event,
        server_timestamp: 1_700_000_000 + seq as i64,
    }
}

pub fn liked_event(seq: u64, album_id: &str) -> StoredEvent {
    event(
        seq,
        UserEvent::ContentLiked {
            content_type: ContentType::Album,
            content_id: album_id.to_string(),
        },
    )
}

pub fn download_data(album_id: &str) -> DownloadCompletedData {
    DownloadCompletedData {
        album_id: album_id.to_string(),
        album_name: format!("Album {album_id}"),
        artist_name: "Various".to_string(),
        image_id: None,
        request_id: format!("req-{album_id}"),
    }
}

/// Unread `download_completed` notification with a valid payload.
pub fn download_notification(id: &str, album_id: &str, created_at: i64) -> Notification {
    Notification {
        id: id.to_string(),
        notification_type: NotificationType::DownloadCompleted,
        title: "Download complete".to_string(),
        body: None,
        data: serde_json::to_value(download_data(album_id)).unwrap(),
        read_at: None,
        created_at,
    }
}

pub fn album(id: &str) -> Album {
    Album {
        id: id.to_string(),
        name: format!("Album {id}"),
        artist_ids: vec![],
        track_ids: vec![],
        release_date: None,
        image_id: None,
    }
}

pub fn artist(id: &str) -> Artist {
    Artist {
        id: id.to_string(),
        name: format!("Artist {id}"),
        genres: vec![],
        image_id: None,
    }
}

// ── Remote API ───────────────────────────────────────────────────────

/// Remote API answering from per-endpoint queues. An empty queue answers
/// with a network error.
#[derive(Default)]
pub struct FakeApi {
    snapshots: Mutex<VecDeque<ApiResult<SyncSnapshot>>>,
    event_pages: Mutex<VecDeque<ApiResult<SyncEventsPage>>>,
    batches: Mutex<VecDeque<ApiResult<BatchContentResponse>>>,
    discographies: Mutex<HashMap<String, ApiResult<Vec<Album>>>>,
    failing_reads: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    batch_requests: Mutex<Vec<BatchContentRequest>>,
    acknowledged_reads: Mutex<Vec<String>>,
}

fn unscripted() -> ApiError {
    ApiError::Network("no scripted response".to_string())
}

impl FakeApi {
    pub fn push_snapshot(&self, result: ApiResult<SyncSnapshot>) {
        self.snapshots.lock().unwrap().push_back(result);
    }

    pub fn push_events(&self, result: ApiResult<SyncEventsPage>) {
        self.event_pages.lock().unwrap().push_back(result);
    }

    pub fn push_batch(&self, result: ApiResult<BatchContentResponse>) {
        self.batches.lock().unwrap().push_back(result);
    }

    pub fn set_discography(&self, artist_id: &str, albums: Vec<Album>) {
        self.discographies
            .lock()
            .unwrap()
            .insert(artist_id.to_string(), Ok(albums));
    }

    pub fn fail_discography(&self, artist_id: &str, error: ApiError) {
        self.discographies
            .lock()
            .unwrap()
            .insert(artist_id.to_string(), Err(error));
    }

    pub fn fail_read(&self, notification_id: &str) {
        self.failing_reads
            .lock()
            .unwrap()
            .insert(notification_id.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn batch_requests(&self) -> Vec<BatchContentRequest> {
        self.batch_requests.lock().unwrap().clone()
    }

    pub fn acknowledged_reads(&self) -> Vec<String> {
        self.acknowledged_reads.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn get_sync_state(&self) -> ApiResult<SyncSnapshot> {
        self.record("sync_state".to_string());
        self.snapshots
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted()))
    }

    async fn get_sync_events(&self, since: u64) -> ApiResult<SyncEventsPage> {
        self.record(format!("sync_events:{since}"));
        self.event_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted()))
    }

    async fn get_batch_content(&self, request: &BatchContentRequest) -> ApiResult<BatchContentResponse> {
        self.record("batch".to_string());
        self.batch_requests.lock().unwrap().push(request.clone());
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(unscripted()))
    }

    async fn get_artist_discography(
        &self,
        artist_id: &str,
        offset: usize,
        limit: usize,
    ) -> ApiResult<DiscographyPage> {
        self.record(format!("discography:{artist_id}:{offset}:{limit}"));
        let discographies = self.discographies.lock().unwrap();
        let albums = match discographies.get(artist_id) {
            Some(Ok(albums)) => albums,
            Some(Err(e)) => return Err(e.clone()),
            None => return Err(ApiError::NotFound),
        };
        let page: Vec<Album> = albums.iter().skip(offset).take(limit).cloned().collect();
        Ok(DiscographyPage {
            has_more: offset + page.len() < albums.len(),
            albums: page,
            offset,
            limit,
            total: albums.len(),
        })
    }

    async fn mark_notification_read(&self, notification_id: &str) -> ApiResult<()> {
        self.record(format!("read:{notification_id}"));
        if self.failing_reads.lock().unwrap().contains(notification_id) {
            return Err(unscripted());
        }
        self.acknowledged_reads
            .lock()
            .unwrap()
            .push(notification_id.to_string());
        Ok(())
    }
}

// ── Collaborators ────────────────────────────────────────────────────

type GroupedCall = (Vec<DownloadCompletedData>, Vec<String>);
type WhatsNewCall = (String, String, Option<String>, WhatsNewCounts);

#[derive(Default)]
pub struct RecordingNotifier {
    grouped: Mutex<Vec<GroupedCall>>,
    whats_new: Mutex<Vec<WhatsNewCall>>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    /// A notifier that takes `delay` to show a grouped notification.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn grouped(&self) -> Vec<GroupedCall> {
        self.grouped.lock().unwrap().clone()
    }

    pub fn whats_new(&self) -> Vec<WhatsNewCall> {
        self.whats_new.lock().unwrap().clone()
    }
}

#[async_trait]
impl SystemNotifier for RecordingNotifier {
    async fn show_grouped_downloads_completed(
        &self,
        items: &[DownloadCompletedData],
        notification_ids: &[String],
    ) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.grouped
            .lock()
            .unwrap()
            .push((items.to_vec(), notification_ids.to_vec()));
    }

    async fn show_whats_new(
        &self,
        batch_id: &str,
        batch_name: &str,
        description: Option<&str>,
        counts: WhatsNewCounts,
    ) {
        self.whats_new.lock().unwrap().push((
            batch_id.to_string(),
            batch_name.to_string(),
            description.map(str::to_string),
            counts,
        ));
    }
}

#[derive(Default)]
pub struct RecordingDownloads {
    events: Mutex<Vec<StoredEvent>>,
    fail: bool,
}

impl RecordingDownloads {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<StoredEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadStatusSink for RecordingDownloads {
    async fn on_download_event(&self, event: &StoredEvent) -> Result<()> {
        if self.fail {
            anyhow::bail!("download store unavailable");
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Catalog cache that refuses writes for selected ids.
pub struct RejectingCatalogCache {
    inner: MemoryCatalogCache,
    rejected: HashSet<String>,
}

impl RejectingCatalogCache {
    pub fn rejecting<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            inner: MemoryCatalogCache::new(),
            rejected: ids.into_iter().map(str::to_string).collect(),
        }
    }
}

#[async_trait]
impl CatalogCache for RejectingCatalogCache {
    async fn get(&self, item_type: ItemType, id: &str) -> Result<Option<CatalogEntity>> {
        self.inner.get(item_type, id).await
    }

    async fn put(&self, entity: CatalogEntity) -> Result<()> {
        if self.rejected.contains(entity.id()) {
            anyhow::bail!("disk full");
        }
        self.inner.put(entity).await
    }

    async fn merge_discography(&self, artist_id: &str, album_ids: &[String]) -> Result<()> {
        self.inner.merge_discography(artist_id, album_ids).await
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.subscribe()
    }
}
