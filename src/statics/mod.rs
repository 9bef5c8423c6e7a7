//! Catalog content resolution.
//!
//! Callers ask [`LiveContentProvider`] for an entity; a miss records an
//! `Idle` fetch state and wakes the [`StaticsSynchronizer`], which batches
//! outstanding items against the server and fills the catalog cache.

pub mod provider;
pub mod synchronizer;

pub use provider::{ContentFrame, LiveContentProvider};
pub use synchronizer::{CycleOutcome, StaticsSynchronizer};

use std::sync::Arc;

use tokio::sync::Notify;

/// Handle that cuts the synchronizer's idle sleep short.
#[derive(Debug, Clone, Default)]
pub struct FetchWaker(Arc<Notify>);

impl FetchWaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        // notify_one keeps a permit when nobody is waiting yet.
        self.0.notify_one();
    }

    pub(crate) async fn woken(&self) {
        self.0.notified().await
    }
}
