//! Catalog server API surface consumed by the sync engine and the statics
//! synchronizer.
//!
//! - [`RemoteApi`]: transport-agnostic trait with a closed set of outcomes
//! - [`HttpRemoteApi`]: reqwest implementation against the catalog server

pub mod http;

pub use http::HttpRemoteApi;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch_state::FetchErrorReason;
use crate::model::{Album, Artist, Notification, Permission, Track, UserSetting};
use crate::sync_events::StoredEvent;

/// Every way a remote call can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// The requested cursor is older than the oldest event the server keeps.
    #[error("requested events were pruned")]
    EventsPruned,

    #[error("unexpected server response: {0}")]
    Unknown(String),
}

impl ApiError {
    /// Map onto the per-item fetch failure taxonomy.
    pub fn fetch_reason(&self) -> FetchErrorReason {
        match self {
            ApiError::Network(_) => FetchErrorReason::Network,
            ApiError::Unauthorized => FetchErrorReason::Unauthorized,
            ApiError::NotFound => FetchErrorReason::NotFound,
            ApiError::EventsPruned | ApiError::Unknown(_) => FetchErrorReason::Unknown,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

// ── Sync ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LikesState {
    #[serde(default)]
    pub albums: Vec<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Full user state returned by `GET /v1/sync/state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub seq: u64,
    #[serde(default)]
    pub likes: LikesState,
    #[serde(default)]
    pub settings: Vec<UserSetting>,
    #[serde(default)]
    pub playlists: Vec<PlaylistState>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

/// Response of `GET /v1/sync/events?since=`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncEventsPage {
    pub events: Vec<StoredEvent>,
    pub current_seq: u64,
}

// ── Catalog content ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchContentRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artists: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub albums: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<String>,
}

impl BatchContentRequest {
    pub fn is_empty(&self) -> bool {
        self.artists.is_empty() && self.albums.is_empty() && self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.artists.len() + self.albums.len() + self.tracks.len()
    }
}

/// Per-item failure reported inside an otherwise successful batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemError {
    NotFound,
    Unauthorized,
    #[serde(other)]
    Unknown,
}

impl BatchItemError {
    pub fn fetch_reason(self) -> FetchErrorReason {
        match self {
            BatchItemError::NotFound => FetchErrorReason::NotFound,
            BatchItemError::Unauthorized => FetchErrorReason::Unauthorized,
            BatchItemError::Unknown => FetchErrorReason::Unknown,
        }
    }
}

/// `{"ok": entity}` or `{"error": "not_found"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchItem<T> {
    Ok(T),
    Error(BatchItemError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchContentResponse {
    #[serde(default)]
    pub artists: HashMap<String, BatchItem<Artist>>,
    #[serde(default)]
    pub albums: HashMap<String, BatchItem<Album>>,
    #[serde(default)]
    pub tracks: HashMap<String, BatchItem<Track>>,
}

/// One page of `GET /v1/content/artist/{id}/discography`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscographyPage {
    pub albums: Vec<Album>,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
    #[serde(default)]
    pub total: usize,
}

/// Remote catalog server.
///
/// Implementations must surface failures as [`ApiError`] rather than panic
/// or hang; request timeouts are the implementation's concern.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn get_sync_state(&self) -> ApiResult<SyncSnapshot>;

    /// Events with `seq > since`. Fails with [`ApiError::EventsPruned`] when
    /// the server no longer holds a continuous history from `since`.
    async fn get_sync_events(&self, since: u64) -> ApiResult<SyncEventsPage>;

    async fn get_batch_content(&self, request: &BatchContentRequest) -> ApiResult<BatchContentResponse>;

    async fn get_artist_discography(
        &self,
        artist_id: &str,
        offset: usize,
        limit: usize,
    ) -> ApiResult<DiscographyPage>;

    /// Acknowledge a notification the user read, possibly while offline.
    async fn mark_notification_read(&self, notification_id: &str) -> ApiResult<()>;
}
