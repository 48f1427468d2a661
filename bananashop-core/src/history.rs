//! Snapshot-based undo/redo for Bananashop
//!
//! ## Architecture
//!
//! - `HistoryEntry`: an independent copy of the scene plus a description
//! - `History`: two bounded stacks (past, future) of entries
//! - `HistoryToken`: identifies one pushed entry so a gesture can retract
//!   exactly its own snapshot
//! - The store decides *when* to snapshot; this module only keeps the stacks
//!
//! ## Memory Model
//!
//! Entries hold a [`Scene`], which is two `Arc` clones. Because the live scene
//! only mutates through `Arc::make_mut`, a stored entry is never affected by
//! later edits, while unchanged layers and all pixel sources stay shared
//! between the live scene and every entry that references them.
//!
//! ## Policy
//!
//! Discrete operations snapshot as their first effect. Continuous gestures
//! snapshot once at the start, keep the returned token, and retract with it
//! if the gesture ends with no net change. A retract whose entry is no longer
//! the newest (undone, or buried under a later push) does nothing.

use crate::scene::Scene;
use std::collections::VecDeque;

/// Default number of undo steps kept
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Identity of a pushed past entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HistoryToken(u64);

/// One undo/redo step
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    /// Scene state to restore
    pub scene: Scene,

    /// Human-readable name of the step (for UI display)
    pub description: String,
}

impl HistoryEntry {
    pub fn new(scene: Scene, description: impl Into<String>) -> Self {
        Self {
            scene,
            description: description.into(),
        }
    }
}

/// Past and future snapshot stacks
#[derive(Debug)]
pub struct History {
    /// Snapshots to restore on undo, oldest first
    past: VecDeque<(HistoryToken, HistoryEntry)>,

    /// Snapshots to restore on redo, most recent last
    future: Vec<HistoryEntry>,

    /// Maximum number of entries in the past stack
    capacity: usize,

    next_token: u64,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            past: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            future: Vec::new(),
            capacity,
            next_token: 0,
        }
    }

    fn push_past(&mut self, entry: HistoryEntry) -> HistoryToken {
        self.next_token += 1;
        let token = HistoryToken(self.next_token);
        self.past.push_back((token, entry));
        while self.past.len() > self.capacity {
            self.past.pop_front();
        }
        token
    }

    /// Record a snapshot
    ///
    /// This clears the future stack since a new step starts a new timeline
    /// branch. The oldest entry is evicted past capacity.
    pub fn push(&mut self, entry: HistoryEntry) -> HistoryToken {
        self.future.clear();
        self.push_past(entry)
    }

    /// Drop the entry pushed under `token` if it is still the newest past
    /// entry, without touching the future stack
    ///
    /// Used when a gesture that snapshotted at its start made no change.
    pub fn retract(&mut self, token: HistoryToken) -> Option<HistoryEntry> {
        if !self.is_newest(token) {
            return None;
        }
        self.past.pop_back().map(|(_, entry)| entry)
    }

    /// Whether the entry pushed under `token` is the next one to undo
    pub fn is_newest(&self, token: HistoryToken) -> bool {
        self.past.back().is_some_and(|(newest, _)| *newest == token)
    }

    /// Step back: returns the scene to restore, storing `current` for redo
    ///
    /// Returns `None` (and keeps `current` untouched) when there is nothing to
    /// undo.
    pub fn undo(&mut self, current: Scene) -> Option<Scene> {
        let (_, entry) = self.past.pop_back()?;
        self.future.push(HistoryEntry::new(current, entry.description));
        Some(entry.scene)
    }

    /// Step forward: returns the scene to restore, storing `current` for undo
    pub fn redo(&mut self, current: Scene) -> Option<Scene> {
        let entry = self.future.pop()?;
        self.push_past(HistoryEntry::new(current, entry.description));
        Some(entry.scene)
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// The entry the next undo would restore
    pub fn peek(&self) -> Option<&HistoryEntry> {
        self.past.back().map(|(_, entry)| entry)
    }

    /// Get the description of the next step to undo
    pub fn undo_description(&self) -> Option<&str> {
        self.past.back().map(|(_, e)| e.description.as_str())
    }

    /// Get the description of the next step to redo
    pub fn redo_description(&self) -> Option<&str> {
        self.future.last().map(|e| e.description.as_str())
    }

    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    /// Set the maximum undo depth, trimming the oldest entries if needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        if self.past.len() > capacity {
            let remove_count = self.past.len() - capacity;
            self.past.drain(0..remove_count);
        }
    }
}
