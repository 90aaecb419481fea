//! The sparse per-tile overlay exchanged between client and server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::char_rule::{is_legitimate, EMPTY};
use crate::coord::{linear_index, CHUNK_CELLS, H, W};

/// A sparse mapping from linear in-chunk index to character.
///
/// Absent indices mean "no change". A space value means "delete this cell" while the
/// diff is in flight (pending); once folded into committed content, space entries are
/// purged so committed content is dense only with non-empty characters.
///
/// Serializes as a JSON object of `{index: char}`, with indices round-tripping through
/// their string form on the wire (`ChunkDiff::from_dict(d.to_dict()) == d`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkDiff(BTreeMap<u16, char>);

impl ChunkDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `c` at the linear index of world cell `(x, y)`. No legitimacy validation.
    pub fn set(&mut self, x: i64, y: i64, c: char) {
        self.0.insert(linear_index(x, y), c);
    }

    /// Equivalent to `set(x, y, ' ')`.
    pub fn delete(&mut self, x: i64, y: i64) {
        self.set(x, y, EMPTY);
    }

    pub fn set_index(&mut self, index: u16, c: char) {
        self.0.insert(index, c);
    }

    pub fn get(&self, index: u16, default: char) -> char {
        self.0.get(&index).copied().unwrap_or(default)
    }

    pub fn get_opt(&self, index: u16) -> Option<char> {
        self.0.get(&index).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, char)> + '_ {
        self.0.iter().map(|(&i, &c)| (i, c))
    }

    /// `true` iff every entry satisfies [`is_legitimate`].
    pub fn is_legitimate(&self) -> bool {
        self.0.values().all(|&c| is_legitimate(c))
    }

    /// Splits `self` into `(legit, illegit)` by per-entry legitimacy: every index whose
    /// character satisfies [`is_legitimate`] goes to `legit`, every other index to
    /// `illegit`. Unlike [`ChunkDiff::is_legitimate`], which judges a diff as a whole,
    /// this lets a single submitted diff that mixes legal and illegal indices have its
    /// legal portion applied while only the illegal portion is rejected.
    pub fn partition_legitimacy(&self) -> (ChunkDiff, ChunkDiff) {
        let mut legit = ChunkDiff::new();
        let mut illegit = ChunkDiff::new();
        for (&i, &c) in &self.0 {
            if is_legitimate(c) {
                legit.set_index(i, c);
            } else {
                illegit.set_index(i, c);
            }
        }
        (legit, illegit)
    }

    /// Pointwise overwrites entries with `other`'s entries; `other` wins on overlap.
    pub fn apply(&mut self, other: &ChunkDiff) {
        for (&i, &c) in &other.0 {
            self.0.insert(i, c);
        }
    }

    /// A new diff equal to `self` then `self.apply(other)`.
    pub fn combine(&self, other: &ChunkDiff) -> ChunkDiff {
        let mut out = self.clone();
        out.apply(other);
        out
    }

    /// Removes every entry whose value is [`EMPTY`].
    pub fn clear_deletions(&mut self) {
        self.0.retain(|_, &mut c| c != EMPTY);
    }

    /// Renders the tile as `H` strings of length `W`, space-filled and overlaid with entries.
    pub fn lines(&self) -> Vec<String> {
        let mut buf = vec![EMPTY; CHUNK_CELLS];
        for (&i, &c) in &self.0 {
            buf[i as usize] = c;
        }
        buf.chunks(W as usize)
            .take(H as usize)
            .map(|row| row.iter().collect())
            .collect()
    }

    /// A compensating diff: for each index present in `self`, the entry is
    /// `other.get(index, ' ')`.
    ///
    /// Applying `self` then the result over any chunk state recovers `other`'s state at
    /// exactly the indices touched by `self` (the reverse-diff law).
    pub fn diff(&self, other: &ChunkDiff) -> ChunkDiff {
        let mut out = ChunkDiff::new();
        for &i in self.0.keys() {
            out.set_index(i, other.get(i, EMPTY));
        }
        out
    }
}
