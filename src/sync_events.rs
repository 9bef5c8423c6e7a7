//! Server event log entries as delivered by `/v1/sync/events` and the live
//! connection.

use serde::{Deserialize, Serialize};

use crate::model::{ContentType, Notification, Permission, UserSetting};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadContentType {
    Album,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadQueueStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RetryWaiting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub total_children: i32,
    pub completed: i32,
    pub failed: i32,
    pub pending: i32,
    pub in_progress: i32,
}

/// Every event kind the server can append to a user's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum UserEvent {
    ContentLiked {
        content_type: ContentType,
        content_id: String,
    },
    ContentUnliked {
        content_type: ContentType,
        content_id: String,
    },
    SettingChanged {
        setting: UserSetting,
    },
    PlaylistCreated {
        playlist_id: String,
        name: String,
    },
    PlaylistRenamed {
        playlist_id: String,
        name: String,
    },
    PlaylistDeleted {
        playlist_id: String,
    },
    PlaylistTracksUpdated {
        playlist_id: String,
        track_ids: Vec<String>,
    },
    PermissionGranted {
        permission: Permission,
    },
    PermissionRevoked {
        permission: Permission,
    },
    PermissionsReset {
        permissions: Vec<Permission>,
    },
    DownloadRequestCreated {
        request_id: String,
        content_id: String,
        content_type: DownloadContentType,
        content_name: String,
        artist_name: Option<String>,
        queue_position: i32,
    },
    DownloadStatusChanged {
        request_id: String,
        content_id: String,
        status: DownloadQueueStatus,
        queue_position: Option<i32>,
        error_message: Option<String>,
    },
    DownloadProgressUpdated {
        request_id: String,
        content_id: String,
        progress: DownloadProgress,
    },
    DownloadCompleted {
        request_id: String,
        content_id: String,
    },
    NotificationCreated {
        notification: Notification,
    },
    NotificationRead {
        notification_id: String,
        read_at: i64,
    },
    WhatsNewBatchClosed {
        batch_id: String,
        batch_name: String,
        description: Option<String>,
        albums_added: i32,
        artists_added: i32,
        tracks_added: i32,
    },
    /// An event type this client does not know. Applying it is a no-op, so
    /// the cursor still moves past it.
    #[serde(skip)]
    Unknown { event_type: String },
}

/// Wire names of every event type [`UserEvent`] can decode.
const EVENT_TYPES: [&str; 17] = [
    "content_liked",
    "content_unliked",
    "setting_changed",
    "playlist_created",
    "playlist_renamed",
    "playlist_deleted",
    "playlist_tracks_updated",
    "permission_granted",
    "permission_revoked",
    "permissions_reset",
    "download_request_created",
    "download_status_changed",
    "download_progress_updated",
    "download_completed",
    "notification_created",
    "notification_read",
    "whats_new_batch_closed",
];

impl UserEvent {
    pub fn event_type(&self) -> &str {
        match self {
            UserEvent::ContentLiked { .. } => "content_liked",
            UserEvent::ContentUnliked { .. } => "content_unliked",
            UserEvent::SettingChanged { .. } => "setting_changed",
            UserEvent::PlaylistCreated { .. } => "playlist_created",
            UserEvent::PlaylistRenamed { .. } => "playlist_renamed",
            UserEvent::PlaylistDeleted { .. } => "playlist_deleted",
            UserEvent::PlaylistTracksUpdated { .. } => "playlist_tracks_updated",
            UserEvent::PermissionGranted { .. } => "permission_granted",
            UserEvent::PermissionRevoked { .. } => "permission_revoked",
            UserEvent::PermissionsReset { .. } => "permissions_reset",
            UserEvent::DownloadRequestCreated { .. } => "download_request_created",
            UserEvent::DownloadStatusChanged { .. } => "download_status_changed",
            UserEvent::DownloadProgressUpdated { .. } => "download_progress_updated",
            UserEvent::DownloadCompleted { .. } => "download_completed",
            UserEvent::NotificationCreated { .. } => "notification_created",
            UserEvent::NotificationRead { .. } => "notification_read",
            UserEvent::WhatsNewBatchClosed { .. } => "whats_new_batch_closed",
            UserEvent::Unknown { event_type } => event_type,
        }
    }

    /// Download events are not interpreted here; they go to the download sink.
    pub fn is_download_event(&self) -> bool {
        matches!(
            self,
            UserEvent::DownloadRequestCreated { .. }
                | UserEvent::DownloadStatusChanged { .. }
                | UserEvent::DownloadProgressUpdated { .. }
                | UserEvent::DownloadCompleted { .. }
        )
    }
}

/// An event with its server-assigned sequence number. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent")]
pub struct StoredEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: UserEvent,
    /// Seconds since the epoch.
    pub server_timestamp: i64,
}

#[derive(Deserialize)]
struct WireEvent {
    seq: u64,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    payload: serde_json::Value,
    server_timestamp: i64,
}

impl TryFrom<WireEvent> for StoredEvent {
    type Error = serde_json::Error;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let event = if EVENT_TYPES.contains(&wire.event_type.as_str()) {
            serde_json::from_value(serde_json::json!({
                "type": wire.event_type,
                "payload": wire.payload,
            }))?
        } else {
            UserEvent::Unknown {
                event_type: wire.event_type,
            }
        };
        Ok(StoredEvent {
            seq: wire.seq,
            event,
            server_timestamp: wire.server_timestamp,
        })
    }
}
