//! The chunked grid data model shared by server and client: coordinate arithmetic,
//! the [`ChunkDiff`] algebra and the [`Chunk`] type that pairs committed content with
//! in-flight pending modifications.

mod char_rule;
mod chunk;
mod coord;
mod diff;

pub use char_rule::{is_legitimate, EMPTY};
pub use chunk::Chunk;
pub use coord::{chunk_of, in_chunk, linear_index, ChunkPos, CHUNK_CELLS, H, W};
pub use diff::ChunkDiff;
