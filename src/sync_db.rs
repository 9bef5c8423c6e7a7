//! Persisted sync bookkeeping backed by redb.
//!
//!   sync_meta:     "cursor"           → last applied event seq
//!                  "needs_full_sync"  → 0 / 1
//!   fetch_states:  "{type}:{id}"      → JSON FetchState
//!
//! Writers bump a watch revision after every fetch-state commit so the
//! live provider can re-read the keys it cares about.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tokio::sync::watch;

use crate::config::StorageConfig;
use crate::fetch_state::{state_key, FetchState, FetchStatus};
use crate::model::ItemType;

const SYNC_META: TableDefinition<&str, u64> = TableDefinition::new("sync_meta");
const FETCH_STATES: TableDefinition<&str, &[u8]> = TableDefinition::new("fetch_states");

const CURSOR_KEY: &str = "cursor";
const NEEDS_FULL_SYNC_KEY: &str = "needs_full_sync";

const DB_FILE_NAME: &str = "sync.redb";

pub struct SyncDb {
    db: Database,
    changes: watch::Sender<u64>,
}

impl SyncDb {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)
            .with_context(|| format!("failed to open sync redb at {}", path.display()))?;
        // Ensure tables exist
        {
            let txn = db.begin_write()?;
            txn.open_table(SYNC_META)?;
            txn.open_table(FETCH_STATES)?;
            txn.commit()?;
        }
        let (changes, _) = watch::channel(0);
        Ok(Self { db, changes })
    }

    /// `{data_dir}/sync.redb`, creating the directory if needed.
    pub fn default_path(config: &StorageConfig) -> Result<PathBuf> {
        let data_dir = match config.data_dir {
            Some(ref dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .context("Failed to get data directory")?
                .join("catalog-sync"),
        };
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        Ok(data_dir.join(DB_FILE_NAME))
    }

    // ── Cursor ───────────────────────────────────────────────────────

    fn read_meta(&self, key: &str) -> Result<Option<u64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SYNC_META)?;
        Ok(table.get(key)?.map(|v| v.value()))
    }

    fn write_meta(&self, key: &str, value: u64) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SYNC_META)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn cursor(&self) -> Result<u64> {
        Ok(self.read_meta(CURSOR_KEY)?.unwrap_or(0))
    }

    /// Overwrite the cursor. Only a full sync may move it backwards.
    pub fn set_cursor(&self, seq: u64) -> Result<()> {
        self.write_meta(CURSOR_KEY, seq)
            .context("Failed to persist sync cursor")
    }

    /// Move the cursor forward to `seq`; never regresses. Returns the stored value.
    pub fn advance_cursor(&self, seq: u64) -> Result<u64> {
        let txn = self.db.begin_write()?;
        let stored = {
            let mut table = txn.open_table(SYNC_META)?;
            let current = table.get(CURSOR_KEY)?.map(|v| v.value()).unwrap_or(0);
            let next = current.max(seq);
            if next != current {
                table.insert(CURSOR_KEY, next)?;
            }
            next
        };
        txn.commit().context("Failed to persist sync cursor")?;
        Ok(stored)
    }

    pub fn needs_full_sync(&self) -> Result<bool> {
        Ok(self.read_meta(NEEDS_FULL_SYNC_KEY)?.unwrap_or(0) != 0)
    }

    pub fn set_needs_full_sync(&self, needed: bool) -> Result<()> {
        self.write_meta(NEEDS_FULL_SYNC_KEY, needed as u64)
            .context("Failed to persist full-sync flag")
    }

    /// Forget cursor and flag (logout).
    pub fn clear_sync_state(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SYNC_META)?;
            table.remove(CURSOR_KEY)?;
            table.remove(NEEDS_FULL_SYNC_KEY)?;
        }
        txn.commit()?;
        Ok(())
    }

    // ── Fetch states ─────────────────────────────────────────────────

    pub fn fetch_state(&self, item_type: ItemType, item_id: &str) -> Result<Option<FetchState>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FETCH_STATES)?;
        match table.get(state_key(item_type, item_id).as_str())? {
            Some(data) => {
                let state: FetchState = serde_json::from_slice(data.value())
                    .context("corrupt fetch state in redb")?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    pub fn put_fetch_state(&self, state: &FetchState) -> Result<()> {
        self.put_fetch_states(std::slice::from_ref(state))
    }

    pub fn put_fetch_states(&self, states: &[FetchState]) -> Result<()> {
        if states.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FETCH_STATES)?;
            for state in states {
                let data = serde_json::to_vec(state)?;
                table.insert(state.key().as_str(), data.as_slice())?;
            }
        }
        txn.commit().context("Failed to write fetch states")?;
        self.notify();
        Ok(())
    }

    pub fn remove_fetch_state(&self, item_type: ItemType, item_id: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FETCH_STATES)?;
            table.remove(state_key(item_type, item_id).as_str())?;
        }
        txn.commit().context("Failed to remove fetch state")?;
        self.notify();
        Ok(())
    }

    fn all_fetch_states(&self) -> Result<Vec<FetchState>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FETCH_STATES)?;
        let mut states = Vec::new();
        for entry in table.iter()? {
            let (_, data) = entry?;
            match serde_json::from_slice::<FetchState>(data.value()) {
                Ok(state) => states.push(state),
                Err(e) => tracing::warn!("Skipping corrupt fetch state: {}", e),
            }
        }
        Ok(states)
    }

    /// Idle records whose retry time has come, oldest deadline first.
    pub fn ready_fetch_states(&self, now_ms: i64, limit: usize) -> Result<Vec<FetchState>> {
        let mut ready: Vec<FetchState> = self
            .all_fetch_states()?
            .into_iter()
            .filter(|s| s.is_ready(now_ms))
            .collect();
        ready.sort_by_key(|s| s.try_next_ms);
        ready.truncate(limit);
        Ok(ready)
    }

    pub fn loading_count(&self) -> Result<usize> {
        Ok(self
            .all_fetch_states()?
            .iter()
            .filter(|s| s.status == FetchStatus::Loading)
            .count())
    }

    /// Put records stranded in `Loading` by a previous run back to `Idle`.
    pub fn reset_loading(&self) -> Result<usize> {
        let stranded: Vec<FetchState> = self
            .all_fetch_states()?
            .into_iter()
            .filter(|s| s.status == FetchStatus::Loading)
            .map(|mut s| {
                s.status = FetchStatus::Idle;
                s
            })
            .collect();
        self.put_fetch_states(&stranded)?;
        Ok(stranded.len())
    }

    /// Revision counter bumped on every fetch-state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::fetch_state::FetchErrorReason;

    fn open_temp() -> (tempfile::TempDir, SyncDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = SyncDb::open(&dir.path().join("sync.redb")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_cursor_defaults_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.redb");
        {
            let db = SyncDb::open(&path).unwrap();
            assert_eq!(db.cursor().unwrap(), 0);
            assert!(!db.needs_full_sync().unwrap());
            db.set_cursor(12).unwrap();
            db.set_needs_full_sync(true).unwrap();
        }
        let db = SyncDb::open(&path).unwrap();
        assert_eq!(db.cursor().unwrap(), 12);
        assert!(db.needs_full_sync().unwrap());
    }

    #[test]
    fn test_advance_cursor_never_regresses() {
        let (_dir, db) = open_temp();
        assert_eq!(db.advance_cursor(5).unwrap(), 5);
        assert_eq!(db.advance_cursor(3).unwrap(), 5);
        assert_eq!(db.advance_cursor(9).unwrap(), 9);
        assert_eq!(db.cursor().unwrap(), 9);
    }

    #[test]
    fn test_clear_sync_state() {
        let (_dir, db) = open_temp();
        db.set_cursor(40).unwrap();
        db.set_needs_full_sync(true).unwrap();
        db.clear_sync_state().unwrap();
        assert_eq!(db.cursor().unwrap(), 0);
        assert!(!db.needs_full_sync().unwrap());
    }

    #[test]
    fn test_fetch_state_crud() {
        let (_dir, db) = open_temp();
        let state = FetchState::requested(ItemType::Artist, "ar1", 100);
        db.put_fetch_state(&state).unwrap();
        assert_eq!(db.fetch_state(ItemType::Artist, "ar1").unwrap(), Some(state));
        assert!(db.fetch_state(ItemType::Discography, "ar1").unwrap().is_none());

        db.remove_fetch_state(ItemType::Artist, "ar1").unwrap();
        assert!(db.fetch_state(ItemType::Artist, "ar1").unwrap().is_none());
    }

    #[test]
    fn test_ready_selection() {
        let (_dir, db) = open_temp();
        let config = FetchConfig::default();
        db.put_fetch_states(&[
            FetchState::requested(ItemType::Album, "ready", 100),
            FetchState::requested(ItemType::Album, "future", 5_000),
            FetchState::requested(ItemType::Album, "loading", 0).loading(0),
            FetchState::requested(ItemType::Album, "failed", 0)
                .failed(FetchErrorReason::Unknown, 0, &config),
        ])
        .unwrap();

        let ready = db.ready_fetch_states(1_000, 10).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].item_id, "ready");
        assert_eq!(db.loading_count().unwrap(), 1);
        assert!(db.ready_fetch_states(1_000, 0).unwrap().is_empty());
    }

    #[test]
    fn test_reset_loading_recovers_stranded_items() {
        let (_dir, db) = open_temp();
        db.put_fetch_state(&FetchState::requested(ItemType::Track, "t1", 0).loading(10))
            .unwrap();
        assert_eq!(db.reset_loading().unwrap(), 1);
        let state = db.fetch_state(ItemType::Track, "t1").unwrap().unwrap();
        assert_eq!(state.status, FetchStatus::Idle);
        assert_eq!(db.loading_count().unwrap(), 0);
    }

    #[test]
    fn test_writes_bump_revision() {
        let (_dir, db) = open_temp();
        let rx = db.subscribe();
        let before = *rx.borrow();
        db.put_fetch_state(&FetchState::requested(ItemType::Album, "a", 0)).unwrap();
        db.remove_fetch_state(ItemType::Album, "a").unwrap();
        assert_eq!(*rx.borrow(), before + 2);
    }
}
