//! User-data synchronization against the server event log.
//!
//! [`SyncManager`] decides between a full snapshot and an incremental
//! catch-up, [`EventApplier`] turns each event into store writes, and
//! [`DownloadNotificationGrouper`] coalesces "download completed"
//! notifications.

pub mod applier;
pub mod backoff;
pub mod manager;
pub mod notifications;
pub mod playlists;

pub use applier::EventApplier;
pub use backoff::RetryBackoff;
pub use manager::SyncManager;
pub use notifications::DownloadNotificationGrouper;

/// Observable status of the sync manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Synced(u64),
    Error(String),
}

impl SyncState {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced(_))
    }
}
