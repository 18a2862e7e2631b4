//! Inbound event handling
//!
//! Everything another context does reaches this one as a `HostEvent`:
//! storage notifications, channel messages, and this context's own focus,
//! resize, poll tick and unload signals.

use winsync_hal::{Host, HostEvent};

use super::{Payload, WindowManager};
use crate::reconcile::{reconcile, Change};
use crate::store::save_identity;

impl<H: Host, M: Payload, P: Payload> WindowManager<H, M, P> {
    /// Drain the host's queue and dispatch each event in order
    ///
    /// Returns the number of events drained.
    pub fn pump(&mut self) -> usize {
        let events = self.host.poll_events();
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    /// Handle one inbound event
    ///
    /// Ignored unless the manager is active. Storage notifications for other
    /// keys, messages on other channels and ticks from foreign timers are
    /// dropped.
    pub fn dispatch(&mut self, event: HostEvent) {
        if !self.lifecycle.is_active() {
            return;
        }
        match event {
            HostEvent::StorageChanged { key } => {
                // `None` means the whole storage area was cleared
                if key.as_deref().map_or(true, |k| k == self.registry.key()) {
                    self.on_registry_changed();
                }
            }
            HostEvent::Message { channel, data } => {
                if channel == self.bus.channel() {
                    self.on_message(&data);
                }
            }
            HostEvent::Focus => self.on_focus(),
            HostEvent::Resize => self.on_geometry_check(),
            HostEvent::Tick(handle) => {
                if self.tracker.as_ref().is_some_and(|t| t.owns(handle)) {
                    self.on_geometry_check();
                }
            }
            HostEvent::Unload => self.teardown(),
        }
    }

    /// Another context rewrote the registry
    fn on_registry_changed(&mut self) {
        let mut next = self.registry.read(&self.host, &self.initial_meta);

        // A concurrent writer may have clobbered our own record
        if let Some(me) = self.this_window.as_ref() {
            if !next.contains(&me.id) {
                next.upsert(me.clone());
                self.log(&format!("re-registered {} after concurrent write", me.id));
                if let Err(e) = self.registry.write(&self.host, &next) {
                    self.log(&format!("registry write failed: {}", e));
                }
            }
        }

        let changes = reconcile(&self.mirror, &next);
        self.mirror = next;
        self.observe();
        self.emit_changes(changes);
        self.emit_state();
    }

    fn on_message(&mut self, data: &str) {
        let envelope = match self.bus.decode::<P>(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.log(&format!("dropping undecodable message: {}", e));
                return;
            }
        };
        if self.this_window.as_ref().is_some_and(|me| me.id == envelope.from) {
            return;
        }
        let faults = self.listeners.message.emit(&envelope);
        self.report(faults);
    }

    /// This context gained focus and becomes the active window
    fn on_focus(&mut self) {
        let Some(me) = self.this_window.clone() else {
            return;
        };
        let changes = self.commit(|state| state.active_window = Some(me));
        if changes.is_empty() {
            return;
        }
        self.emit_changes(changes);
        self.emit_state();
    }

    /// Resize or poll tick: publish our rect if it moved
    fn on_geometry_check(&mut self) {
        let Some(sample) = self.tracker.as_mut().and_then(|t| t.check(&self.host)) else {
            return;
        };
        let Some(me) = self.this_window.as_mut() else {
            return;
        };
        me.apply(sample);
        let me = me.clone();

        if let Err(e) = save_identity(&self.host, self.registry.key(), &me) {
            self.log(&format!("failed to persist identity: {}", e));
        }
        let id = me.id.clone();
        let mut changes = self.commit(|state| {
            if state.active_id() == Some(me.id.as_str()) {
                state.active_window = Some(me.clone());
            }
            state.upsert(me);
        });
        // Own moves are reported through state-changed only
        changes.retain(|change| !matches!(change, Change::UpdatedWindow(w) if w.id == id));
        self.emit_changes(changes);
        self.emit_state();
    }
}
