use std::sync::Arc;

use anyhow::{Context, Result};

use super::notifications::DownloadNotificationGrouper;
use crate::model::{LikedContent, NotificationType, Permission, Playlist, SyncStatus};
use crate::stores::{DownloadStatusSink, SystemNotifier, UserDataStore, WhatsNewCounts};
use crate::sync_events::{StoredEvent, UserEvent};

/// Maps one server event onto store writes.
///
/// Every write is an upsert or replace, so applying the same event twice is
/// the same as applying it once.
pub struct EventApplier {
    store: Arc<dyn UserDataStore>,
    downloads: Arc<dyn DownloadStatusSink>,
    notifier: Arc<dyn SystemNotifier>,
    grouper: Arc<DownloadNotificationGrouper>,
}

impl EventApplier {
    pub fn new(
        store: Arc<dyn UserDataStore>,
        downloads: Arc<dyn DownloadStatusSink>,
        notifier: Arc<dyn SystemNotifier>,
        grouper: Arc<DownloadNotificationGrouper>,
    ) -> Self {
        Self {
            store,
            downloads,
            notifier,
            grouper,
        }
    }

    pub async fn apply(&self, stored: &StoredEvent) -> Result<()> {
        if stored.event.is_download_event() {
            return self
                .downloads
                .on_download_event(stored)
                .await
                .context("download status sink rejected event");
        }

        match &stored.event {
            UserEvent::ContentLiked {
                content_type,
                content_id,
            }
            | UserEvent::ContentUnliked {
                content_type,
                content_id,
            } => {
                let liked = matches!(stored.event, UserEvent::ContentLiked { .. });
                self.store
                    .upsert_liked(&LikedContent {
                        content_id: content_id.clone(),
                        content_type: *content_type,
                        liked,
                        modified_at: stored.server_timestamp,
                        sync_status: SyncStatus::Synced,
                    })
                    .await?;
            }

            UserEvent::SettingChanged { setting } => {
                self.store.apply_setting(setting).await?;
            }

            UserEvent::PlaylistCreated { playlist_id, name }
            | UserEvent::PlaylistRenamed { playlist_id, name } => {
                let track_ids = self
                    .store
                    .playlist(playlist_id)
                    .await?
                    .map(|p| p.track_ids)
                    .unwrap_or_default();
                self.store
                    .upsert_playlist(&Playlist::from_server(playlist_id.clone(), name.clone(), track_ids))
                    .await?;
            }

            UserEvent::PlaylistDeleted { playlist_id } => {
                self.store.delete_playlist(playlist_id).await?;
            }

            UserEvent::PlaylistTracksUpdated {
                playlist_id,
                track_ids,
            } => match self.store.playlist(playlist_id).await? {
                Some(existing) => {
                    self.store
                        .upsert_playlist(&Playlist::from_server(
                            playlist_id.clone(),
                            existing.name,
                            track_ids.clone(),
                        ))
                        .await?;
                }
                None => {
                    tracing::warn!(
                        "Tracks updated for unknown playlist {} (seq {}), skipping",
                        playlist_id,
                        stored.seq
                    );
                }
            },

            UserEvent::PermissionGranted {
                permission: Permission::Unknown,
            }
            | UserEvent::PermissionRevoked {
                permission: Permission::Unknown,
            } => {
                tracing::debug!("Skipping unknown permission change (seq {})", stored.seq);
            }

            UserEvent::PermissionGranted { permission } => {
                self.store.add_permission(*permission).await?;
            }

            UserEvent::PermissionRevoked { permission } => {
                self.store.remove_permission(*permission).await?;
            }

            UserEvent::PermissionsReset { permissions } => {
                self.store.replace_permissions(&Permission::known(permissions)).await?;
            }

            // Forwarded to the download sink above.
            UserEvent::DownloadRequestCreated { .. }
            | UserEvent::DownloadStatusChanged { .. }
            | UserEvent::DownloadProgressUpdated { .. }
            | UserEvent::DownloadCompleted { .. } => {}

            UserEvent::NotificationCreated { notification } => {
                self.store.upsert_notification(notification).await?;
                if notification.notification_type == NotificationType::DownloadCompleted {
                    match notification.download_completed_data() {
                        Ok(data) => self.grouper.enqueue(notification.id.clone(), data),
                        Err(e) => tracing::warn!(
                            "Could not decode download notification {}: {}",
                            notification.id,
                            e
                        ),
                    }
                }
            }

            UserEvent::NotificationRead {
                notification_id,
                read_at,
            } => {
                if !self.store.mark_notification_read(notification_id, *read_at).await? {
                    tracing::debug!("Read receipt for unknown notification {}", notification_id);
                }
            }

            UserEvent::WhatsNewBatchClosed {
                batch_id,
                batch_name,
                description,
                albums_added,
                artists_added,
                tracks_added,
            } => {
                if self.store.settings().await?.notify_whatsnew {
                    self.notifier
                        .show_whats_new(
                            batch_id,
                            batch_name,
                            description.as_deref(),
                            WhatsNewCounts {
                                albums_added: *albums_added,
                                artists_added: *artists_added,
                                tracks_added: *tracks_added,
                            },
                        )
                        .await;
                }
            }

            UserEvent::Unknown { event_type } => {
                tracing::debug!("Skipping unknown event type {} (seq {})", event_type, stored.seq);
            }
        }
        Ok(())
    }
}
