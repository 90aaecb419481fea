//! SQLite-backed chunk store: the `chunks(x, y, content)` table from spec.md §6.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use glyphgrid_core::{ChunkDiff, ChunkPos, CHUNK_CELLS, EMPTY};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A keyed store over chunk coordinates, backed by a single SQLite connection.
///
/// `rusqlite::Connection` is `!Sync`, so access is serialized through a mutex; callers
/// invoke its blocking methods from inside `tokio::task::spawn_blocking`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if necessary) the database at `path` and ensures the schema
    /// exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_table()?;
        Ok(store)
    }

    /// An in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_table()?;
        Ok(store)
    }

    fn create_table(&self) -> Result<(), StoreError> {
        self.conn.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                content TEXT NOT NULL,
                PRIMARY KEY (x, y)
            )",
        )?;
        Ok(())
    }

    /// Loads the committed content image for each of `positions`, omitting any
    /// position with no row.
    pub fn load_many(
        &self,
        positions: &[ChunkPos],
    ) -> Result<HashMap<ChunkPos, ChunkDiff>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT content FROM chunks WHERE x = ?1 AND y = ?2")?;

        let mut out = HashMap::new();
        for &pos in positions {
            let content: Option<String> = stmt
                .query_row(params![pos.x, pos.y], |row| row.get(0))
                .optional()?;
            if let Some(content) = content {
                out.insert(pos, decode_image(&content));
            }
        }
        Ok(out)
    }

    /// Upserts the dense `W·H`-character image for each `(pos, image)` pair.
    pub fn save_many(&self, rows: &[(ChunkPos, String)]) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("INSERT OR REPLACE INTO chunks (x, y, content) VALUES (?1, ?2, ?3)")?;
        for (pos, content) in rows {
            stmt.execute(params![pos.x, pos.y, content])?;
        }
        Ok(())
    }

    /// Deletes every row whose content image is entirely spaces.
    pub fn remove_empty(&self) -> Result<usize, StoreError> {
        let empty_image: String = EMPTY.to_string().repeat(CHUNK_CELLS);
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM chunks WHERE content = ?1",
            params![empty_image],
        )?;
        Ok(deleted)
    }
}

/// Decodes a dense `W·H`-character row into a committed-content diff (non-space
/// characters only, per the committed-content invariant).
fn decode_image(image: &str) -> ChunkDiff {
    let mut diff = ChunkDiff::new();
    for (i, c) in image.chars().enumerate() {
        if c != EMPTY {
            diff.set_index(i as u16, c);
        }
    }
    diff
}
