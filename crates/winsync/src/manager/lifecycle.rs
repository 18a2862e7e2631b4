//! Manager lifecycle: init and teardown

use std::fmt;

use winsync_hal::Host;

use super::{Payload, WindowManager};
use crate::error::SyncError;
use crate::store::load_identity;
use crate::window::{RectTracker, WindowRecord};

/// Manager lifecycle state
///
/// `Constructed → Initializing → Active → Unloading → Terminated`. A
/// manager torn down before init goes straight to `Terminated`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    Initializing,
    Active,
    Unloading,
    Terminated,
}

impl Lifecycle {
    pub fn is_active(self) -> bool {
        self == Lifecycle::Active
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Constructed => "constructed",
            Lifecycle::Initializing => "initializing",
            Lifecycle::Active => "active",
            Lifecycle::Unloading => "unloading",
            Lifecycle::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

impl<H: Host, M: Payload, P: Payload> WindowManager<H, M, P> {
    /// Join the registry
    ///
    /// Loads (or creates) this context's identity, joins the channel, inserts
    /// itself into the registry, persists, arms the geometry poll and emits
    /// the first state-changed notification.
    ///
    /// Calling it again while initialized is a no-op. Calling it after
    /// teardown fails with [`SyncError::Lifecycle`]. A failed init leaves the
    /// manager `Constructed` with nothing shared written.
    pub fn init(&mut self) -> Result<(), SyncError> {
        match self.lifecycle {
            Lifecycle::Constructed => {}
            Lifecycle::Initializing | Lifecycle::Active => {
                self.log("init ignored: already initialized");
                return Ok(());
            }
            state => return Err(SyncError::Lifecycle(state)),
        }
        self.lifecycle = Lifecycle::Initializing;

        let me = match self.join() {
            Ok(me) => me,
            Err(e) => {
                self.bus.close(&self.host);
                self.lifecycle = Lifecycle::Constructed;
                self.log(&format!("init failed: {}", e));
                return Err(e);
            }
        };

        let mut state = self.registry.read(&self.host, &self.initial_meta);
        state.upsert(me.clone());
        self.mirror = state;
        self.persist();

        let mut tracker = RectTracker::new(me.rect(), self.poll_interval_ms);
        if let Err(e) = tracker.arm(&self.host) {
            self.log(&format!("geometry poll unavailable: {}", e));
        }
        self.tracker = Some(tracker);

        self.log(&format!(
            "initialized {} ({} window(s) in registry)",
            me.id,
            self.mirror.windows.len()
        ));
        self.this_window = Some(me);
        self.lifecycle = Lifecycle::Active;
        self.observe();
        self.emit_state();
        Ok(())
    }

    /// Fallible part of init, before anything shared is written
    fn join(&mut self) -> Result<WindowRecord, SyncError> {
        let me = load_identity(&self.host, self.registry.key())?;
        self.bus.open(&self.host)?;
        Ok(me)
    }

    /// Leave the registry
    ///
    /// Removes this context from the current shared windows (and from the
    /// active window if it was this one), cancels the poll timer and leaves
    /// the channel. When no windows remain the registry key is removed. Safe to
    /// call any number of times; also runs on drop.
    pub fn teardown(&mut self) {
        match self.lifecycle {
            Lifecycle::Active => {}
            Lifecycle::Constructed => {
                self.lifecycle = Lifecycle::Terminated;
                return;
            }
            _ => return,
        }
        self.lifecycle = Lifecycle::Unloading;

        if let Some(tracker) = self.tracker.as_mut() {
            tracker.disarm(&self.host);
        }
        self.bus.close(&self.host);

        if let Some(me) = self.this_window.as_ref() {
            // Fresh read: the mirror may lag behind contexts not yet pumped
            let mut next = self.registry.read(&self.host, &self.initial_meta);
            next.remove(&me.id);
            let result = if next.windows.is_empty() {
                self.registry.clear(&self.host)
            } else {
                self.registry.write(&self.host, &next)
            };
            self.mirror = next;
            self.observe();
            if let Err(e) = result {
                self.log(&format!("registry update on unload failed: {}", e));
            }
            self.log(&format!("unloaded {}", me.id));
        }

        self.lifecycle = Lifecycle::Terminated;
    }
}

impl<H: Host, M: Payload, P: Payload> Drop for WindowManager<H, M, P> {
    fn drop(&mut self) {
        self.teardown();
    }
}
