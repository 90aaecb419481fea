//! The keyed chunk pool shared by the server's persistent pool and the client's pool,
//! plus the SQLite-backed store adapter the server specialization uses.

mod persistent;
mod pool;
mod sqlite;

pub use persistent::{PersistentPool, DEFAULT_MAX_AGE, DEFAULT_SAVE_PERIOD};
pub use pool::{ChangeSet, ChunkPool, PoolGuard};
pub use sqlite::{Store, StoreError};
