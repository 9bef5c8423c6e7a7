//! One signed-in user's sync engine, wired together once.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::{HttpRemoteApi, RemoteApi};
use crate::config::Config;
use crate::model::ItemType;
use crate::statics::{ContentFrame, LiveContentProvider, StaticsSynchronizer};
use crate::stores::{CatalogCache, DownloadStatusSink, SystemNotifier, UserDataStore};
use crate::sync::{SyncManager, SyncState};
use crate::sync_db::SyncDb;
use crate::sync_events::StoredEvent;

pub struct SyncSession {
    manager: SyncManager,
    provider: LiveContentProvider,
    fetch_task: JoinHandle<()>,
}

impl SyncSession {
    /// Build the session against the catalog server named in `config`.
    pub fn connect(
        config: &Config,
        user_store: Arc<dyn UserDataStore>,
        catalog: Arc<dyn CatalogCache>,
        downloads: Arc<dyn DownloadStatusSink>,
        notifier: Arc<dyn SystemNotifier>,
    ) -> Result<Self> {
        let api = Arc::new(HttpRemoteApi::new(&config.server)?);
        Self::start(config, api, user_store, catalog, downloads, notifier)
    }

    /// Open the sync database under the configured data dir and start.
    pub fn start(
        config: &Config,
        api: Arc<dyn RemoteApi>,
        user_store: Arc<dyn UserDataStore>,
        catalog: Arc<dyn CatalogCache>,
        downloads: Arc<dyn DownloadStatusSink>,
        notifier: Arc<dyn SystemNotifier>,
    ) -> Result<Self> {
        let path = SyncDb::default_path(&config.storage)?;
        let db = SyncDb::open(&path).context("Failed to open sync database")?;
        Ok(Self::start_with_db(
            config,
            Arc::new(db),
            api,
            user_store,
            catalog,
            downloads,
            notifier,
        ))
    }

    /// Start on an already opened database. Spawns the fetch scheduler, so
    /// this must run inside a tokio runtime.
    pub fn start_with_db(
        config: &Config,
        db: Arc<SyncDb>,
        api: Arc<dyn RemoteApi>,
        user_store: Arc<dyn UserDataStore>,
        catalog: Arc<dyn CatalogCache>,
        downloads: Arc<dyn DownloadStatusSink>,
        notifier: Arc<dyn SystemNotifier>,
    ) -> Self {
        let manager = SyncManager::new(
            config.sync.clone(),
            Arc::clone(&api),
            Arc::clone(&db),
            user_store,
            downloads,
            notifier,
        );

        let synchronizer = StaticsSynchronizer::new(
            config.fetch.clone(),
            api,
            Arc::clone(&catalog),
            Arc::clone(&db),
        );
        let provider = LiveContentProvider::new(catalog, db, synchronizer.waker());
        let fetch_task = synchronizer.spawn();

        tracing::info!("Sync session started");
        Self {
            manager,
            provider,
            fetch_task,
        }
    }

    pub async fn initialize(&self) -> bool {
        self.manager.initialize().await
    }

    /// The live connection came back; pick up whatever was missed.
    pub async fn on_reconnected(&self) -> bool {
        self.manager.catch_up().await
    }

    pub async fn handle_sync_message(&self, event: StoredEvent) -> bool {
        self.manager.handle_sync_message(event).await
    }

    pub fn sync_state(&self) -> SyncState {
        self.manager.state()
    }

    pub fn subscribe_sync_state(&self) -> watch::Receiver<SyncState> {
        self.manager.subscribe()
    }

    pub fn observe(&self, item_type: ItemType, id: &str) -> impl Stream<Item = ContentFrame> + Send + 'static {
        self.provider.observe(item_type, id)
    }

    pub async fn current(&self, item_type: ItemType, id: &str) -> ContentFrame {
        self.provider.current(item_type, id).await
    }

    pub fn manager(&self) -> &SyncManager {
        &self.manager
    }

    pub async fn logout(&self) {
        self.manager.cleanup().await;
        tracing::info!("Sync state cleared");
    }

    /// Stop the fetch scheduler. Pending retries die with the manager.
    pub fn shutdown(self) {
        self.fetch_task.abort();
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.fetch_task.abort();
    }
}
