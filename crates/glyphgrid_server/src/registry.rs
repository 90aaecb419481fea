//! The set of active sessions: fan-out of applied changes to every subscriber.
//!
//! Grounded on `original_source/server.py`'s module-level `clients` list: insert
//! reuses the first `None` slot or appends; removal nulls the slot and trims trailing
//! `None`s. Order is only used for human-readable logging, never for correctness.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::session::SessionHandle;
use glyphgrid_store::ChangeSet;

/// An ordered sequence of session slots with "hole" semantics.
#[derive(Default)]
pub struct Registry {
    slots: Mutex<Vec<Option<Arc<SessionHandle>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `handle`, reusing the first empty slot if one exists, else appending.
    /// Returns the slot index (used only for the connect/disconnect log line).
    pub fn insert(&self, handle: Arc<SessionHandle>) -> usize {
        let mut slots = self.slots.lock();
        if let Some(hole) = slots.iter().position(Option::is_none) {
            slots[hole] = Some(handle);
            hole
        } else {
            slots.push(Some(handle));
            slots.len() - 1
        }
    }

    /// Nulls the slot at `index` and trims any trailing `None`s.
    pub fn remove(&self, index: usize) {
        let mut slots = self.slots.lock();
        if index < slots.len() {
            slots[index] = None;
        }
        while matches!(slots.last(), Some(None)) {
            slots.pop();
        }
    }

    /// Renders the connection graph line printed on connect/disconnect (`┯`/`┷` at
    /// `active_index`, `│` for other live slots).
    pub fn graph_line(&self, active_index: usize, connecting: bool) -> String {
        let slots = self.slots.lock();
        let marker = if connecting { '┯' } else { '┷' };
        slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                if i == active_index {
                    marker
                } else if slot.is_some() {
                    '│'
                } else {
                    ' '
                }
            })
            .collect()
    }

    /// Sends `diffs` to every session whose `loaded_chunks` overlaps them, skipping
    /// empty slots.
    pub fn broadcast(&self, diffs: &ChangeSet) {
        let handles: Vec<Arc<SessionHandle>> =
            self.slots.lock().iter().flatten().cloned().collect();
        for handle in handles {
            handle.send_changes(diffs);
        }
    }
}
