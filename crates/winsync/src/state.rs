//! Shared registry snapshot and the per-context view of it

use serde::{Deserialize, Serialize};

use crate::window::WindowRecord;

/// Cross-context source of truth, persisted under the registry key
///
/// `windows` holds at most one record per id; every mutation goes through
/// [`SharedState::upsert`] and [`SharedState::remove`] to keep it that way.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedState<M> {
    pub active_window: Option<WindowRecord>,
    pub windows: Vec<WindowRecord>,
    pub meta: M,
}

impl<M> SharedState<M> {
    /// Empty registry seeded with `meta`
    pub fn new(meta: M) -> Self {
        Self {
            active_window: None,
            windows: Vec::new(),
            meta,
        }
    }

    /// Get a window by ID
    pub fn find(&self, id: &str) -> Option<&WindowRecord> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// ID of the active window, if any
    pub fn active_id(&self) -> Option<&str> {
        self.active_window.as_ref().map(|w| w.id.as_str())
    }

    /// Replace the record with the same id in place, or append it
    ///
    /// Returns `true` if the record was appended.
    pub fn upsert(&mut self, record: WindowRecord) -> bool {
        match self.windows.iter_mut().find(|w| w.id == record.id) {
            Some(existing) => {
                *existing = record;
                false
            }
            None => {
                self.windows.push(record);
                true
            }
        }
    }

    /// Remove a window by ID, clearing the active window if it was this one
    pub fn remove(&mut self, id: &str) -> Option<WindowRecord> {
        if self.active_id() == Some(id) {
            self.active_window = None;
        }
        let index = self.windows.iter().position(|w| w.id == id)?;
        Some(self.windows.remove(index))
    }

    /// Drop repeated ids, keeping the first occurrence
    ///
    /// Returns the number of records dropped. Only needed for snapshots
    /// written by something other than this engine.
    pub fn dedupe(&mut self) -> usize {
        let before = self.windows.len();
        let mut seen: Vec<String> = Vec::with_capacity(before);
        self.windows.retain(|w| {
            if seen.contains(&w.id) {
                false
            } else {
                seen.push(w.id.clone());
                true
            }
        });
        before - self.windows.len()
    }
}

/// Snapshot returned by `get_current_state`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentState<M> {
    pub active_window: Option<WindowRecord>,
    pub windows: Vec<WindowRecord>,
    /// `None` only before initialization
    pub this_window: Option<WindowRecord>,
    pub meta: M,
}
