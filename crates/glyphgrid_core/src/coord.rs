//! World ⇄ chunk coordinate arithmetic for a fixed-size tile.

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Tile width, in cells.
pub const W: i64 = 16;

/// Tile height, in cells.
pub const H: i64 = 8;

/// Number of cells in a chunk.
pub const CHUNK_CELLS: usize = (W * H) as usize;

/// Coordinate of a chunk on the infinite plane.
///
/// Encodes on the wire as a `[x, y]` integer pair, per the wire protocol's position
/// encoding, rather than as a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkPos {
    pub x: i64,
    pub y: i64,
}

impl Serialize for ChunkPos {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.x)?;
        tup.serialize_element(&self.y)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for ChunkPos {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChunkPosVisitor;

        impl<'de> Visitor<'de> for ChunkPosVisitor {
            type Value = ChunkPos;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a [x, y] integer pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ChunkPos, A::Error> {
                let x = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let y = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                Ok(ChunkPos::new(x, y))
            }
        }

        deserializer.deserialize_tuple(2, ChunkPosVisitor)
    }
}

impl ChunkPos {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// The chunk containing world cell `(x, y)`.
    pub fn of_world(x: i64, y: i64) -> Self {
        Self::new(chunk_of(x, W), chunk_of(y, H))
    }
}

impl From<(i64, i64)> for ChunkPos {
    fn from((x, y): (i64, i64)) -> Self {
        Self::new(x, y)
    }
}

impl From<ChunkPos> for (i64, i64) {
    fn from(pos: ChunkPos) -> Self {
        (pos.x, pos.y)
    }
}

/// Floor division: `⌊v / size⌋`, correct for negative `v`.
pub fn chunk_of(v: i64, size: i64) -> i64 {
    v.div_euclid(size)
}

/// The non-negative residue of `v` modulo `size` (i.e. `v − size·chunk_of(v, size)`).
pub fn in_chunk(v: i64, size: i64) -> i64 {
    v.rem_euclid(size)
}

/// The linear in-chunk index for world cell `(x, y)`: `ix + iy·W`.
///
/// Always in `[0, W·H)`, even for negative `x`/`y`.
pub fn linear_index(x: i64, y: i64) -> u16 {
    let ix = in_chunk(x, W);
    let iy = in_chunk(y, H);
    (ix + iy * W) as u16
}
