//! In-memory store backends.
//!
//! Mutex-guarded maps with a watch revision for change notification. The
//! async trait methods just lock and operate.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use super::{CatalogCache, UserDataStore};
use crate::model::{
    CatalogEntity, ContentType, Discography, ItemType, LikedContent, Notification, Permission,
    Playlist, SyncStatus, UserSetting, UserSettings,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))
}

#[derive(Default)]
struct UserData {
    liked: HashMap<(ContentType, String), LikedContent>,
    permissions: BTreeSet<Permission>,
    settings: UserSettings,
    playlists: BTreeMap<String, Playlist>,
    notifications: HashMap<String, Notification>,
    pending_reads: BTreeSet<String>,
}

pub struct MemoryUserDataStore {
    data: Mutex<UserData>,
    changes: watch::Sender<u64>,
}

impl Default for MemoryUserDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserDataStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            data: Mutex::new(UserData::default()),
            changes,
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut UserData) -> R) -> Result<R> {
        let result = {
            let mut data = lock(&self.data)?;
            f(&mut data)
        };
        self.changes.send_modify(|rev| *rev = rev.wrapping_add(1));
        Ok(result)
    }

    fn read<R>(&self, f: impl FnOnce(&UserData) -> R) -> Result<R> {
        let data = lock(&self.data)?;
        Ok(f(&data))
    }
}

#[async_trait]
impl UserDataStore for MemoryUserDataStore {
    async fn upsert_liked(&self, record: &LikedContent) -> Result<()> {
        self.mutate(|d| {
            d.liked.insert(
                (record.content_type, record.content_id.clone()),
                record.clone(),
            );
        })
    }

    async fn replace_liked(&self, content_type: ContentType, content_ids: &[String], modified_at: i64) -> Result<()> {
        self.mutate(|d| {
            d.liked.retain(|(kind, _), _| *kind != content_type);
            for id in content_ids {
                d.liked.insert(
                    (content_type, id.clone()),
                    LikedContent {
                        content_id: id.clone(),
                        content_type,
                        liked: true,
                        modified_at,
                        sync_status: SyncStatus::Synced,
                    },
                );
            }
        })
    }

    async fn liked(&self, content_type: ContentType) -> Result<Vec<LikedContent>> {
        self.read(|d| {
            let mut records: Vec<LikedContent> = d
                .liked
                .values()
                .filter(|r| r.content_type == content_type)
                .cloned()
                .collect();
            records.sort_by(|a, b| a.content_id.cmp(&b.content_id));
            records
        })
    }

    async fn add_permission(&self, permission: Permission) -> Result<()> {
        self.mutate(|d| {
            d.permissions.insert(permission);
        })
    }

    async fn remove_permission(&self, permission: Permission) -> Result<()> {
        self.mutate(|d| {
            d.permissions.remove(&permission);
        })
    }

    async fn replace_permissions(&self, permissions: &[Permission]) -> Result<()> {
        self.mutate(|d| d.permissions = permissions.iter().copied().collect())
    }

    async fn permissions(&self) -> Result<Vec<Permission>> {
        self.read(|d| d.permissions.iter().copied().collect())
    }

    async fn apply_setting(&self, setting: &UserSetting) -> Result<()> {
        self.mutate(|d| d.settings.apply(setting))
    }

    async fn settings(&self) -> Result<UserSettings> {
        self.read(|d| d.settings.clone())
    }

    async fn upsert_playlist(&self, playlist: &Playlist) -> Result<()> {
        self.mutate(|d| {
            d.playlists.insert(playlist.id.clone(), playlist.clone());
        })
    }

    async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
        self.mutate(|d| {
            d.playlists.remove(playlist_id);
        })
    }

    async fn playlist(&self, playlist_id: &str) -> Result<Option<Playlist>> {
        self.read(|d| d.playlists.get(playlist_id).cloned())
    }

    async fn playlists(&self) -> Result<Vec<Playlist>> {
        self.read(|d| d.playlists.values().cloned().collect())
    }

    async fn replace_playlists(&self, playlists: &[Playlist]) -> Result<()> {
        self.mutate(|d| {
            d.playlists = playlists
                .iter()
                .map(|p| (p.id.clone(), p.clone()))
                .collect();
        })
    }

    async fn upsert_notification(&self, notification: &Notification) -> Result<()> {
        self.mutate(|d| {
            d.notifications
                .insert(notification.id.clone(), notification.clone());
        })
    }

    async fn mark_notification_read(&self, notification_id: &str, read_at: i64) -> Result<bool> {
        self.mutate(|d| match d.notifications.get_mut(notification_id) {
            Some(n) => {
                n.read_at = Some(read_at);
                true
            }
            None => false,
        })
    }

    async fn replace_notifications(&self, notifications: &[Notification]) -> Result<()> {
        self.mutate(|d| {
            d.notifications = notifications
                .iter()
                .map(|n| (n.id.clone(), n.clone()))
                .collect();
        })
    }

    async fn notifications(&self) -> Result<Vec<Notification>> {
        self.read(|d| {
            let mut all: Vec<Notification> = d.notifications.values().cloned().collect();
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
            all
        })
    }

    async fn pending_reads(&self) -> Result<Vec<String>> {
        self.read(|d| d.pending_reads.iter().cloned().collect())
    }

    async fn queue_pending_read(&self, notification_id: &str) -> Result<()> {
        self.mutate(|d| {
            d.pending_reads.insert(notification_id.to_string());
        })
    }

    async fn remove_pending_read(&self, notification_id: &str) -> Result<()> {
        self.mutate(|d| {
            d.pending_reads.remove(notification_id);
        })
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

pub struct MemoryCatalogCache {
    entities: Mutex<HashMap<(ItemType, String), CatalogEntity>>,
    changes: watch::Sender<u64>,
}

impl Default for MemoryCatalogCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalogCache {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            entities: Mutex::new(HashMap::new()),
            changes,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self) {
        self.changes.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}

#[async_trait]
impl CatalogCache for MemoryCatalogCache {
    async fn get(&self, item_type: ItemType, id: &str) -> Result<Option<CatalogEntity>> {
        let entities = lock(&self.entities)?;
        Ok(entities.get(&(item_type, id.to_string())).cloned())
    }

    async fn put(&self, entity: CatalogEntity) -> Result<()> {
        {
            let mut entities = lock(&self.entities)?;
            entities.insert((entity.item_type(), entity.id().to_string()), entity);
        }
        self.notify();
        Ok(())
    }

    async fn merge_discography(&self, artist_id: &str, album_ids: &[String]) -> Result<()> {
        {
            let mut entities = lock(&self.entities)?;
            let key = (ItemType::Discography, artist_id.to_string());
            let mut merged = match entities.remove(&key) {
                Some(CatalogEntity::Discography(d)) => d,
                _ => Discography {
                    artist_id: artist_id.to_string(),
                    album_ids: Vec::new(),
                },
            };
            for id in album_ids {
                if !merged.album_ids.contains(id) {
                    merged.album_ids.push(id.clone());
                }
            }
            entities.insert(key, CatalogEntity::Discography(merged));
        }
        self.notify();
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Artist, NotificationType};

    #[tokio::test]
    async fn test_replace_liked_only_touches_one_type() {
        let store = MemoryUserDataStore::new();
        store
            .replace_liked(ContentType::Album, &["al1".to_string()], 10)
            .await
            .unwrap();
        store
            .replace_liked(ContentType::Track, &["t1".to_string(), "t2".to_string()], 10)
            .await
            .unwrap();
        store
            .replace_liked(ContentType::Album, &["al2".to_string()], 20)
            .await
            .unwrap();

        let albums = store.liked(ContentType::Album).await.unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].content_id, "al2");
        assert_eq!(albums[0].modified_at, 20);
        assert_eq!(store.liked(ContentType::Track).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_read_unknown_notification() {
        let store = MemoryUserDataStore::new();
        assert!(!store.mark_notification_read("missing", 5).await.unwrap());

        let n = Notification {
            id: "n1".to_string(),
            notification_type: NotificationType::Other,
            title: "hello".to_string(),
            body: None,
            data: serde_json::Value::Null,
            read_at: None,
            created_at: 1,
        };
        store.upsert_notification(&n).await.unwrap();
        assert!(store.mark_notification_read("n1", 5).await.unwrap());
        assert_eq!(store.notifications().await.unwrap()[0].read_at, Some(5));
    }

    #[tokio::test]
    async fn test_mutations_bump_revision() {
        let store = MemoryUserDataStore::new();
        let rx = store.subscribe();
        store.add_permission(Permission::LikeContent).await.unwrap();
        store.queue_pending_read("n1").await.unwrap();
        assert_eq!(*rx.borrow(), 2);
        assert_eq!(store.pending_reads().await.unwrap(), vec!["n1".to_string()]);
    }

    #[tokio::test]
    async fn test_discography_merge_is_a_union() {
        let cache = MemoryCatalogCache::new();
        cache
            .merge_discography("ar1", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        cache
            .merge_discography("ar1", &["b".to_string(), "c".to_string()])
            .await
            .unwrap();

        match cache.get(ItemType::Discography, "ar1").await.unwrap() {
            Some(CatalogEntity::Discography(d)) => assert_eq!(d.album_ids, vec!["a", "b", "c"]),
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cache_keys_by_type() {
        let cache = MemoryCatalogCache::new();
        cache
            .put(CatalogEntity::Artist(Artist {
                id: "x".to_string(),
                name: "X".to_string(),
                genres: vec![],
                image_id: None,
            }))
            .await
            .unwrap();
        assert!(cache.get(ItemType::Artist, "x").await.unwrap().is_some());
        assert!(cache.get(ItemType::Album, "x").await.unwrap().is_none());
        assert_eq!(cache.len(), 1);
    }
}
