//! The server's `ChunkPool` specialization: store-backed loads, periodic flush, and
//! empty-chunk garbage collection.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glyphgrid_core::{Chunk, ChunkPos};
use glyphgrid_error::{PoolError, ResultExt};
use glyphgrid_log::debug;

use crate::pool::{ChangeSet, ChunkPool};
use crate::sqlite::{Store, StoreError};

/// Default interval between flush+evict ticks.
pub const DEFAULT_SAVE_PERIOD: Duration = Duration::from_secs(60);

/// Default age after which an untouched chunk is evicted from memory.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60);

/// A [`ChunkPool`] backed by a keyed SQLite store, with periodic flush+evict and
/// empty-row garbage collection.
pub struct PersistentPool {
    pool: ChunkPool,
    store: Store,
    save_period: Duration,
    max_age: Duration,
}

impl PersistentPool {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::with_store(Store::open(path)?))
    }

    pub fn with_store(store: Store) -> Self {
        Self {
            pool: ChunkPool::new(),
            store,
            save_period: DEFAULT_SAVE_PERIOD,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    pub fn with_periods(mut self, save_period: Duration, max_age: Duration) -> Self {
        self.save_period = save_period;
        self.max_age = max_age;
        self
    }

    /// `load(single)` is unsupported on this specialization; all loads batch through
    /// [`PersistentPool::load_list`].
    pub fn load(&self, _pos: ChunkPos) -> Result<(), PoolError> {
        Err(PoolError::UnsupportedSingleLoad)
    }

    /// Ensures every position in `positions` is resident, fetching absent ones from
    /// the store (in one blocking batch) and creating empty chunks for rows the store
    /// didn't have.
    pub async fn load_list(self: &Arc<Self>, positions: Vec<ChunkPos>) -> Result<(), StoreError> {
        let to_fetch: Vec<ChunkPos> = {
            let guard = self.pool.lock();
            positions
                .iter()
                .copied()
                .filter(|pos| !guard.contains(*pos))
                .collect()
        };

        if to_fetch.is_empty() {
            return Ok(());
        }

        let this = Arc::clone(self);
        let fetch_list = to_fetch.clone();
        let rows = tokio::task::spawn_blocking(move || this.store.load_many(&fetch_list))
            .await
            .expect("load_many blocking task panicked")?;

        let mut guard = self.pool.lock();
        for pos in to_fetch {
            match rows.get(&pos) {
                Some(content) => guard.insert(pos, Chunk::from_content(content.clone())),
                None => {
                    guard.create(pos);
                }
            }
        }
        Ok(())
    }

    /// Drains pending modifications across the pool into committed content, then
    /// persists the full image of every chunk that had pending modifications.
    pub async fn save_changes(self: &Arc<Self>) -> Result<(), StoreError> {
        let rows: Vec<(ChunkPos, String)> = {
            let mut guard = self.pool.lock();
            let diffs: ChangeSet = guard.commit_changes();
            diffs
                .into_iter()
                .filter_map(|(pos, _)| guard.get(pos).map(|chunk| (pos, chunk.content_image())))
                .collect()
        };

        if rows.is_empty() {
            return Ok(());
        }

        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.store.save_many(&rows))
            .await
            .expect("save_many blocking task panicked")
    }

    /// For use by [`Session::handle_request_chunks`](glyphgrid_server) and similar:
    /// exposes the pool's scoped lock directly.
    pub fn lock(&self) -> crate::pool::PoolGuard<'_> {
        self.pool.lock()
    }

    /// Deletes every persisted row whose content image is entirely spaces. Invoked on
    /// clean shutdown.
    pub async fn remove_empty(self: &Arc<Self>) -> Result<usize, StoreError> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.store.remove_empty())
            .await
            .expect("remove_empty blocking task panicked")
    }

    /// One flush+evict tick: `save_changes()`, then unload chunks whose age exceeds
    /// `max_age`. Store errors are logged and swallowed; the caller's loop continues
    /// regardless (spec.md §7).
    pub async fn flush_tick(self: &Arc<Self>) {
        if self
            .save_changes()
            .await
            .warn_on_err_once("periodic save_changes failed")
            .is_none()
        {
            return;
        }
        let now = Instant::now();
        let max_age = self.max_age;
        let before = self.pool.lock().len();
        self.pool.lock().evict_stale(now, max_age);
        let evicted = before.saturating_sub(self.pool.lock().len());
        if evicted > 0 {
            debug!(evicted, "evicted stale chunks after flush");
        }
    }

    /// Runs the flush+evict loop on `save_period`, forever. Intended to be
    /// `tokio::spawn`'d once at process startup.
    pub async fn run_flush_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.save_period);
        // The first tick fires immediately; the loop's cadence is spec'd from the
        // *previous* tick, so skip it.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.flush_tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pool() -> Arc<PersistentPool> {
        Arc::new(PersistentPool::with_store(Store::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn load_list_creates_empty_chunks_for_missing_rows() {
        let pool = new_pool();
        let pos = ChunkPos::new(0, 0);
        pool.load_list(vec![pos]).await.unwrap();
        assert!(pool.lock().get(pos).unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_changes_persists_only_modified_chunks() {
        let pool = new_pool();
        let pos = ChunkPos::new(0, 0);
        {
            let mut guard = pool.lock();
            guard.get_or_create(pos).set(0, 0, 'a');
        }
        pool.save_changes().await.unwrap();

        let rows = pool.store.load_many(&[pos]).unwrap();
        assert_eq!(rows.get(&pos).unwrap().get(0, ' '), 'a');
    }

    #[tokio::test]
    async fn evicted_chunk_reloads_with_identical_content() {
        let pool = new_pool();
        let pos = ChunkPos::new(-1, -1);
        {
            let mut guard = pool.lock();
            guard.get_or_create(pos).set(-1, -1, 'z');
        }
        pool.save_changes().await.unwrap();
        pool.lock().unload(pos);
        assert!(pool.lock().get(pos).is_none());

        pool.load_list(vec![pos]).await.unwrap();
        assert_eq!(pool.lock().get(pos).unwrap().as_diff().get(127, ' '), 'z');
    }

    #[tokio::test]
    async fn remove_empty_deletes_blank_rows_after_flush() {
        let pool = new_pool();
        let pos = ChunkPos::new(0, 0);
        {
            let mut guard = pool.lock();
            guard.get_or_create(pos).set(0, 0, 'a');
        }
        pool.save_changes().await.unwrap();
        {
            let mut guard = pool.lock();
            guard.get_or_create(pos).delete(0, 0);
        }
        pool.save_changes().await.unwrap();

        let deleted = pool.remove_empty().await.unwrap();
        assert_eq!(deleted, 1);
    }
}
