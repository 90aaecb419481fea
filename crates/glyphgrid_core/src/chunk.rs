//! A chunk's committed content paired with its in-flight pending modifications.

use std::time::{Duration, Instant};

use crate::diff::ChunkDiff;

/// Pair `(content, pending)` plus a `last_modified` timestamp.
///
/// `content` is authoritative and holds no space entries. `pending` is the in-flight
/// modification diff; space is allowed there, encoding deletion. Keeping them separate
/// lets the server validate a submitted diff against current content without
/// prematurely mutating it.
#[derive(Debug, Clone)]
pub struct Chunk {
    content: ChunkDiff,
    pending: ChunkDiff,
    last_modified: Instant,
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk {
    pub fn new() -> Self {
        Self {
            content: ChunkDiff::new(),
            pending: ChunkDiff::new(),
            last_modified: Instant::now(),
        }
    }

    /// Rehydrates a chunk from a full, dense committed content image (e.g. a store row).
    pub fn from_content(content: ChunkDiff) -> Self {
        Self {
            content,
            pending: ChunkDiff::new(),
            last_modified: Instant::now(),
        }
    }

    /// `true` iff both `content` and `pending` are empty.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.pending.is_empty()
    }

    /// `true` iff `pending` is nonempty.
    pub fn is_modified(&self) -> bool {
        !self.pending.is_empty()
    }

    /// `content.combine(pending)`, the combined view exposed to the outside world.
    pub fn as_diff(&self) -> ChunkDiff {
        self.content.combine(&self.pending)
    }

    pub fn content(&self) -> &ChunkDiff {
        &self.content
    }

    pub fn pending(&self) -> &ChunkDiff {
        &self.pending
    }

    pub fn set(&mut self, x: i64, y: i64, c: char) {
        self.pending.set(x, y, c);
        self.touch();
    }

    pub fn delete(&mut self, x: i64, y: i64) {
        self.pending.delete(x, y);
        self.touch();
    }

    /// Folds `d` into `pending` (`d` wins on overlap). Used for locally queued edits.
    pub fn apply_pending(&mut self, d: &ChunkDiff) {
        self.pending.apply(d);
        self.touch();
    }

    /// Folds `d` into `content` and strips space entries. Used to adopt authoritative state.
    pub fn commit_content(&mut self, d: &ChunkDiff) {
        self.content.apply(d);
        self.content.clear_deletions();
        self.touch();
    }

    /// Folds `pending` into `content`, strips space entries, and empties `pending`.
    /// Returns the diff that was just committed.
    pub fn commit_changes(&mut self) -> ChunkDiff {
        let pending = std::mem::take(&mut self.pending);
        self.content.apply(&pending);
        self.content.clear_deletions();
        self.touch();
        pending
    }

    /// A dense `W·H`-character image of `content`, space-padded, for persistence.
    pub fn content_image(&self) -> String {
        self.content.lines().concat()
    }

    pub fn touch(&mut self) {
        self.last_modified = Instant::now();
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_changes_leaves_no_space_entries_in_content() {
        let mut chunk = Chunk::new();
        chunk.set(0, 0, 'a');
        chunk.set(1, 0, ' ');
        chunk.commit_changes();
        assert_eq!(chunk.content().get_opt(0), Some('a'));
        assert_eq!(chunk.content().get_opt(1), None);
        assert!(!chunk.is_modified());
    }

    #[test]
    fn commit_content_also_strips_space_entries() {
        let mut chunk = Chunk::new();
        chunk.commit_content(&{
            let mut d = crate::diff::ChunkDiff::new();
            d.set_index(0, 'a');
            d.set_index(1, ' ');
            d
        });
        assert_eq!(chunk.content().get_opt(0), Some('a'));
        assert_eq!(chunk.content().get_opt(1), None);
    }

    #[test]
    fn as_diff_overlays_pending_over_content() {
        let mut chunk = Chunk::new();
        chunk.set(0, 0, 'a');
        chunk.commit_changes();
        chunk.set(0, 0, 'b');
        let view = chunk.as_diff();
        assert_eq!(view.get(0, ' '), 'b');
    }

    #[test]
    fn empty_and_modified_flags() {
        let mut chunk = Chunk::new();
        assert!(chunk.is_empty());
        assert!(!chunk.is_modified());
        chunk.set(0, 0, 'a');
        assert!(!chunk.is_empty());
        assert!(chunk.is_modified());
    }
}
