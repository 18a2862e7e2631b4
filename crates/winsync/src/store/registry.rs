//! Shared registry store
//!
//! The whole `SharedState` is one JSON value in shared storage. Every write
//! replaces the full snapshot; there is no compare-and-swap, so concurrent
//! writers race and the last write wins.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use winsync_hal::Host;

use crate::error::SyncError;
use crate::state::SharedState;
use crate::window::WindowRecord;

/// Persisted shape, tolerant of missing fields
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState<M> {
    #[serde(default)]
    active_window: Option<WindowRecord>,
    #[serde(default)]
    windows: Vec<WindowRecord>,
    meta: Option<M>,
}

/// Reads and writes the shared registry under one key
#[derive(Clone, Debug)]
pub struct RegistryStore {
    key: String,
}

impl RegistryStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the current snapshot
    ///
    /// Absent, unreadable or unparsable state yields the default
    /// `{activeWindow: null, windows: [], meta: initial_meta}`; a missing or
    /// null `meta` falls back to `initial_meta`. Duplicate window ids left by
    /// a foreign writer are collapsed.
    pub fn read<H, M>(&self, host: &H, initial_meta: &M) -> SharedState<M>
    where
        H: Host,
        M: DeserializeOwned + Clone,
    {
        let json = match host.shared_get(&self.key) {
            Ok(Some(json)) => json,
            Ok(None) => return SharedState::new(initial_meta.clone()),
            Err(e) => {
                host.debug_write(&format!("[winsync] registry read failed: {}", e));
                return SharedState::new(initial_meta.clone());
            }
        };

        let stored: StoredState<M> = match serde_json::from_str(&json) {
            Ok(stored) => stored,
            Err(e) => {
                host.debug_write(&format!("[winsync] ignoring malformed registry: {}", e));
                return SharedState::new(initial_meta.clone());
            }
        };

        let mut state = SharedState {
            active_window: stored.active_window,
            windows: stored.windows,
            meta: stored.meta.unwrap_or_else(|| initial_meta.clone()),
        };
        let dropped = state.dedupe();
        if dropped > 0 {
            host.debug_write(&format!(
                "[winsync] dropped {} duplicate window record(s) from registry",
                dropped
            ));
        }
        state
    }

    /// Persist the full snapshot
    pub fn write<H, M>(&self, host: &H, state: &SharedState<M>) -> Result<(), SyncError>
    where
        H: Host,
        M: Serialize,
    {
        let json = serde_json::to_string(state)?;
        host.shared_set(&self.key, &json)?;
        Ok(())
    }

    /// Remove the registry key entirely
    pub fn clear<H: Host>(&self, host: &H) -> Result<(), SyncError> {
        host.shared_remove(&self.key)?;
        Ok(())
    }
}
