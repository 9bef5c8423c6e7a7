//! Store seams the sync engine writes through.
//!
//! - [`UserDataStore`]: likes, permissions, settings, playlists, notifications
//! - [`CatalogCache`]: resolved catalog entities and discography edges
//! - [`DownloadStatusSink`]: receives download events untouched
//! - [`SystemNotifier`]: platform notifications
//!
//! In-memory implementations live in [`memory`].

pub mod memory;

pub use memory::{MemoryCatalogCache, MemoryUserDataStore};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::model::{
    CatalogEntity, ContentType, DownloadCompletedData, ItemType, LikedContent, Notification,
    Permission, Playlist, UserSetting, UserSettings,
};
use crate::sync_events::StoredEvent;

/// Per-user mutable state mirrored from the server event log.
///
/// Every mutation is an idempotent upsert or replace, so re-applying an event
/// leaves the store unchanged. Implementations provide per-key write
/// atomicity and bump the [`subscribe`](UserDataStore::subscribe) revision
/// after every change.
#[async_trait]
pub trait UserDataStore: Send + Sync {
    // ── Liked content ───────────────────────────────────────────────

    async fn upsert_liked(&self, record: &LikedContent) -> Result<()>;

    /// Replace every record of `content_type` with a liked, synced record per id.
    async fn replace_liked(&self, content_type: ContentType, content_ids: &[String], modified_at: i64) -> Result<()>;

    async fn liked(&self, content_type: ContentType) -> Result<Vec<LikedContent>>;

    // ── Permissions ─────────────────────────────────────────────────

    async fn add_permission(&self, permission: Permission) -> Result<()>;

    async fn remove_permission(&self, permission: Permission) -> Result<()>;

    async fn replace_permissions(&self, permissions: &[Permission]) -> Result<()>;

    async fn permissions(&self) -> Result<Vec<Permission>>;

    // ── Settings ────────────────────────────────────────────────────

    async fn apply_setting(&self, setting: &UserSetting) -> Result<()>;

    async fn settings(&self) -> Result<UserSettings>;

    // ── Playlists ───────────────────────────────────────────────────

    async fn upsert_playlist(&self, playlist: &Playlist) -> Result<()>;

    async fn delete_playlist(&self, playlist_id: &str) -> Result<()>;

    async fn playlist(&self, playlist_id: &str) -> Result<Option<Playlist>>;

    async fn playlists(&self) -> Result<Vec<Playlist>>;

    async fn replace_playlists(&self, playlists: &[Playlist]) -> Result<()>;

    // ── Notifications ───────────────────────────────────────────────

    async fn upsert_notification(&self, notification: &Notification) -> Result<()>;

    /// Returns false when the notification is unknown.
    async fn mark_notification_read(&self, notification_id: &str, read_at: i64) -> Result<bool>;

    async fn replace_notifications(&self, notifications: &[Notification]) -> Result<()>;

    async fn notifications(&self) -> Result<Vec<Notification>>;

    /// Ids the user marked read locally that the server has not acknowledged.
    async fn pending_reads(&self) -> Result<Vec<String>>;

    async fn queue_pending_read(&self, notification_id: &str) -> Result<()>;

    async fn remove_pending_read(&self, notification_id: &str) -> Result<()>;

    // ── Change feed ─────────────────────────────────────────────────

    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// Resolved catalog entities.
#[async_trait]
pub trait CatalogCache: Send + Sync {
    async fn get(&self, item_type: ItemType, id: &str) -> Result<Option<CatalogEntity>>;

    async fn put(&self, entity: CatalogEntity) -> Result<()>;

    /// Union `album_ids` into the artist's discography edges.
    async fn merge_discography(&self, artist_id: &str, album_ids: &[String]) -> Result<()>;

    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// Download status collaborator. Events arrive exactly as the server sent them.
#[async_trait]
pub trait DownloadStatusSink: Send + Sync {
    async fn on_download_event(&self, event: &StoredEvent) -> Result<()>;
}

/// Counts shown in a "what's new" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WhatsNewCounts {
    pub albums_added: i32,
    pub artists_added: i32,
    pub tracks_added: i32,
}

/// Platform notification surface.
#[async_trait]
pub trait SystemNotifier: Send + Sync {
    async fn show_grouped_downloads_completed(
        &self,
        items: &[DownloadCompletedData],
        notification_ids: &[String],
    );

    async fn show_whats_new(
        &self,
        batch_id: &str,
        batch_name: &str,
        description: Option<&str>,
        counts: WhatsNewCounts,
    );
}
