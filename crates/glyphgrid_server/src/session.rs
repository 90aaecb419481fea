//! Per-connection server state: subscription set, the three client-message handlers,
//! legitimacy partitioning, reverse-diff computation, and the fan-out filter.
//!
//! Grounded on `original_source/server.py`'s `WotServer` (`handle_request_chunks`,
//! `handle_unload_chunks`, `handle_save_changes`, `send_changes`).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use glyphgrid_core::ChunkPos;
use glyphgrid_log::warn;
use glyphgrid_proto::ServerMessage;
use glyphgrid_store::{ChangeSet, PersistentPool};

use crate::registry::Registry;

/// The subscription set and outgoing-message sender for one connection.
///
/// Held by the connection task (which mutates `loaded_chunks` as its own messages
/// arrive) and by the [`Registry`] (whose broadcasts read `loaded_chunks` from other
/// sessions' handler contexts), hence `Mutex` rather than a plain `HashSet`.
pub struct SessionHandle {
    loaded_chunks: Mutex<HashSet<ChunkPos>>,
    outgoing: mpsc::UnboundedSender<ServerMessage>,
}

impl SessionHandle {
    pub fn new(outgoing: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            loaded_chunks: Mutex::new(HashSet::new()),
            outgoing,
        }
    }

    pub fn add_loaded(&self, positions: &[ChunkPos]) {
        self.loaded_chunks.lock().extend(positions.iter().copied());
    }

    pub fn remove_loaded(&self, positions: &[ChunkPos]) {
        let mut loaded = self.loaded_chunks.lock();
        for pos in positions {
            loaded.remove(pos);
        }
    }

    /// Filters `diffs` to keys in `loaded_chunks` and sends the remainder as
    /// `apply-changes`, if non-empty. The fan-out filter (spec.md §4.7).
    pub fn send_changes(&self, diffs: &ChangeSet) {
        let loaded = self.loaded_chunks.lock();
        let filtered: ChangeSet = diffs
            .iter()
            .filter(|(pos, _)| loaded.contains(pos))
            .cloned()
            .collect();
        drop(loaded);
        if !filtered.is_empty() {
            self.reply(ServerMessage::ApplyChanges(filtered));
        }
    }

    /// Sends `msg` to this session only. Silently dropped if the connection task has
    /// already gone away (it will be removed from the registry shortly).
    pub fn reply(&self, msg: ServerMessage) {
        let _ = self.outgoing.send(msg);
    }
}

/// Per-connection handler state, composing a [`SessionHandle`] with access to the
/// shared persistent pool and broadcast registry.
pub struct Session {
    handle: Arc<SessionHandle>,
    pool: Arc<PersistentPool>,
    registry: Arc<Registry>,
}

impl Session {
    pub fn new(
        pool: Arc<PersistentPool>,
        registry: Arc<Registry>,
        outgoing: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            handle: Arc::new(SessionHandle::new(outgoing)),
            pool,
            registry,
        }
    }

    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// `request-chunks`: load, subscribe, and reply with the committed state of
    /// every requested position.
    pub async fn handle_request_chunks(&self, positions: Vec<ChunkPos>) -> anyhow::Result<()> {
        self.pool.load_list(positions.clone()).await?;

        let diffs: ChangeSet = {
            let guard = self.pool.lock();
            positions
                .iter()
                .map(|&pos| {
                    let diff = guard
                        .get(pos)
                        .expect("load_list guarantees residency")
                        .as_diff();
                    (pos, diff)
                })
                .collect()
        };

        self.handle.add_loaded(&positions);
        self.handle.reply(ServerMessage::ApplyChanges(diffs));
        Ok(())
    }

    /// `unload-chunks`: drop the positions from this session's subscription. No
    /// effect on pool residency.
    pub fn handle_unload_chunks(&self, positions: &[ChunkPos]) {
        self.handle.remove_loaded(positions);
    }

    /// `save-changes`: splits each submitted diff by per-index legitimacy (a single
    /// diff may mix legal and illegal indices), applies+broadcasts the legitimate
    /// portions, and replies with a reverse diff for the illegitimate ones.
    pub async fn handle_save_changes(&self, changes: ChangeSet) -> anyhow::Result<()> {
        let mut legit: ChangeSet = Vec::new();
        let mut illegit: ChangeSet = Vec::new();
        for (pos, diff) in changes {
            let (legit_diff, illegit_diff) = diff.partition_legitimacy();
            if !legit_diff.is_empty() {
                legit.push((pos, legit_diff));
            }
            if !illegit_diff.is_empty() {
                illegit.push((pos, illegit_diff));
            }
        }

        if !legit.is_empty() {
            let positions: Vec<ChunkPos> = legit.iter().map(|(pos, _)| *pos).collect();
            self.pool.load_list(positions).await?;
            self.pool.lock().apply_diffs(&legit);
            self.registry.broadcast(&legit);
        }

        if !illegit.is_empty() {
            warn!(count = illegit.len(), "rejecting illegitimate cells in save-changes");
            let positions: Vec<ChunkPos> = illegit.iter().map(|(pos, _)| *pos).collect();
            self.pool.load_list(positions).await?;

            let reverse: ChangeSet = {
                let guard = self.pool.lock();
                illegit
                    .iter()
                    .map(|(pos, diff)| {
                        let authoritative = guard
                            .get(*pos)
                            .expect("load_list guarantees residency")
                            .as_diff();
                        (*pos, diff.diff(&authoritative))
                    })
                    .collect()
            };
            self.handle.reply(ServerMessage::ApplyChanges(reverse));
        }

        Ok(())
    }
}
