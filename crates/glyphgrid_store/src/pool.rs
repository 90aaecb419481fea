//! The keyed chunk collection shared by the server's persistent pool and the client's
//! pool: get/create/apply/commit/unload, guarded by a single mutex.

use std::collections::{HashMap, HashSet};

use parking_lot::{Mutex, MutexGuard};
use std::time::Instant;

use glyphgrid_core::{Chunk, ChunkDiff, ChunkPos};

/// A batch of per-chunk diffs, keyed by chunk position.
pub type ChangeSet = Vec<(ChunkPos, ChunkDiff)>;

/// Keyed collection of chunks, exclusively owned and guarded by a single mutex.
///
/// Every operation goes through [`ChunkPool::lock`], which returns a [`PoolGuard`].
/// Composite operations acquire once and call several `PoolGuard` methods on the same
/// guard, rather than relying on a re-entrant lock (see `DESIGN.md`).
#[derive(Default)]
pub struct ChunkPool {
    chunks: Mutex<HashMap<ChunkPos, Chunk>>,
}

impl ChunkPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the pool's lock, returning a scope through which chunks are accessed.
    pub fn lock(&self) -> PoolGuard<'_> {
        PoolGuard(self.chunks.lock())
    }
}

/// A scoped acquisition of a [`ChunkPool`]'s lock.
pub struct PoolGuard<'a>(MutexGuard<'a, HashMap<ChunkPos, Chunk>>);

impl PoolGuard<'_> {
    /// The chunk at `pos`, if resident.
    pub fn get(&self, pos: ChunkPos) -> Option<&Chunk> {
        self.0.get(&pos)
    }

    /// Inserts a fresh, empty chunk at `pos`, overwriting any existing one, and
    /// returns a mutable reference to it. Idempotent in the sense spec.md §4.4
    /// describes: calling it after a get-miss is the normal path; re-creating an
    /// already-resident chunk discards its state, which is only ever done
    /// deliberately by callers.
    pub fn create(&mut self, pos: ChunkPos) -> &mut Chunk {
        self.0.entry(pos).or_insert_with(Chunk::new);
        self.0.get_mut(&pos).expect("just inserted")
    }

    /// Returns the chunk at `pos`, creating it first if absent.
    pub fn get_or_create(&mut self, pos: ChunkPos) -> &mut Chunk {
        self.0.entry(pos).or_insert_with(Chunk::new)
    }

    /// Directly inserts `chunk` at `pos`, used to rehydrate a chunk loaded from
    /// outside the pool (a store row, a server reply).
    pub fn insert(&mut self, pos: ChunkPos, chunk: Chunk) {
        self.0.insert(pos, chunk);
    }

    pub fn contains(&self, pos: ChunkPos) -> bool {
        self.0.contains_key(&pos)
    }

    pub fn positions(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// For each `(pos, diff)`, get-or-create the chunk then fold `diff` into its
    /// pending modifications. Used for local edits queued for later persistence.
    pub fn apply_diffs(&mut self, diffs: &ChangeSet) {
        for (pos, diff) in diffs {
            self.get_or_create(*pos).apply_pending(diff);
        }
    }

    /// For each `(pos, diff)`, get-or-create the chunk then fold `diff` into its
    /// committed content, stripping space entries. Used to adopt authoritative state.
    pub fn commit_diffs(&mut self, diffs: &ChangeSet) {
        for (pos, diff) in diffs {
            self.get_or_create(*pos).commit_content(diff);
        }
    }

    /// For every modified chunk, captures its pending diff, folds it into content,
    /// and returns the collected diffs keyed by position. Chunks with no pending
    /// modifications are left untouched and not included in the result.
    pub fn commit_changes(&mut self) -> ChangeSet {
        let mut out = Vec::new();
        for (&pos, chunk) in self.0.iter_mut() {
            if chunk.is_modified() {
                out.push((pos, chunk.commit_changes()));
            }
        }
        out
    }

    /// Drops the in-memory record at `pos`, returning it if present.
    pub fn unload(&mut self, pos: ChunkPos) -> Option<Chunk> {
        self.0.remove(&pos)
    }

    pub fn unload_list(&mut self, positions: &[ChunkPos]) {
        for &pos in positions {
            self.unload(pos);
        }
    }

    /// Unloads every resident chunk whose `(pos, chunk)` satisfies `predicate` and is
    /// not in `except_for`.
    pub fn clean_up(
        &mut self,
        except_for: &HashSet<ChunkPos>,
        mut predicate: impl FnMut(ChunkPos, &Chunk) -> bool,
    ) {
        let to_unload: Vec<ChunkPos> = self
            .0
            .iter()
            .filter(|(&pos, chunk)| !except_for.contains(&pos) && predicate(pos, chunk))
            .map(|(&pos, _)| pos)
            .collect();
        self.unload_list(&to_unload);
    }

    /// Unloads every resident chunk whose age exceeds `max_age` at `now`.
    pub fn evict_stale(&mut self, now: Instant, max_age: std::time::Duration) {
        self.clean_up(&HashSet::new(), |_, chunk| chunk.age(now) > max_age);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn diff_with(entries: &[(i64, i64, char)]) -> ChunkDiff {
        let mut d = ChunkDiff::new();
        for &(x, y, c) in entries {
            d.set(x, y, c);
        }
        d
    }

    #[test]
    fn get_on_absent_position_is_none() {
        let pool = ChunkPool::new();
        assert!(pool.lock().get(ChunkPos::new(0, 0)).is_none());
    }

    #[test]
    fn create_is_idempotent_after_get_miss() {
        let pool = ChunkPool::new();
        let mut guard = pool.lock();
        assert!(guard.get(ChunkPos::new(0, 0)).is_none());
        guard.create(ChunkPos::new(0, 0));
        assert!(guard.get(ChunkPos::new(0, 0)).unwrap().is_empty());
    }

    #[test]
    fn apply_diffs_then_commit_changes_round_trips() {
        let pool = ChunkPool::new();
        let pos = ChunkPos::new(0, 0);
        let diffs = vec![(pos, diff_with(&[(0, 0, 'a')]))];

        let mut guard = pool.lock();
        guard.apply_diffs(&diffs);
        assert!(guard.get(pos).unwrap().is_modified());

        let committed = guard.commit_changes();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].0, pos);
        assert_eq!(committed[0].1.get(0, ' '), 'a');
        assert!(!guard.get(pos).unwrap().is_modified());
        assert_eq!(guard.get(pos).unwrap().content().get(0, ' '), 'a');
    }

    #[test]
    fn commit_diffs_adopts_authoritative_state_and_strips_deletions() {
        let pool = ChunkPool::new();
        let pos = ChunkPos::new(0, 0);
        let diffs = vec![(pos, diff_with(&[(0, 0, 'x'), (1, 0, ' ')]))];

        let mut guard = pool.lock();
        guard.commit_diffs(&diffs);
        let chunk = guard.get(pos).unwrap();
        assert_eq!(chunk.content().get(0, ' '), 'x');
        assert_eq!(chunk.content().get_opt(1), None);
    }

    #[test]
    fn clean_up_respects_except_for() {
        let pool = ChunkPool::new();
        let keep = ChunkPos::new(0, 0);
        let drop = ChunkPos::new(1, 0);

        let mut guard = pool.lock();
        guard.create(keep);
        guard.create(drop);

        let mut except_for = HashSet::new();
        except_for.insert(keep);
        guard.clean_up(&except_for, |_, _| true);

        assert!(guard.get(keep).is_some());
        assert!(guard.get(drop).is_none());
    }

    #[test]
    fn evict_stale_unloads_only_old_chunks() {
        let pool = ChunkPool::new();
        let pos = ChunkPos::new(0, 0);
        pool.lock().create(pos);

        let now = Instant::now() + Duration::from_secs(120);
        pool.lock().evict_stale(now, Duration::from_secs(60));
        assert!(pool.lock().get(pos).is_none());
    }

    #[test]
    fn unload_list_drops_multiple_positions() {
        let pool = ChunkPool::new();
        let a = ChunkPos::new(0, 0);
        let b = ChunkPos::new(1, 1);
        let mut guard = pool.lock();
        guard.create(a);
        guard.create(b);
        guard.unload_list(&[a, b]);
        assert!(guard.is_empty());
    }
}
