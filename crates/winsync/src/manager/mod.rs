//! Window manager
//!
//! Owns the in-memory mirror of the shared registry for one context and
//! composes identity, registry, bus, rect tracker and listeners. Local
//! mutations re-read the shared registry, apply their one change, write it
//! back and fan out to listeners before returning; changes made by other
//! contexts arrive as host events (see [`WindowManager::pump`]) and are
//! reconciled.

mod events;
mod lifecycle;

pub use lifecycle::Lifecycle;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use winsync_hal::Host;

use crate::bus::MessageBus;
use crate::config::ManagerConfig;
use crate::error::SyncError;
use crate::listener::{Category, ListenerFault, Listeners, Subscription};
use crate::reconcile::{reconcile, Change};
use crate::state::{CurrentState, SharedState};
use crate::store::RegistryStore;
use crate::window::{RectTracker, WindowRecord};

/// Values that can be shared as meta or sent as messages
pub trait Payload: Serialize + DeserializeOwned + Clone + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + 'static {}

/// Per-context synchronization engine
pub struct WindowManager<H: Host, M: Payload = Value, P: Payload = Value> {
    host: H,
    lifecycle: Lifecycle,
    registry: RegistryStore,
    bus: MessageBus,
    /// Created at init from this context's stored rect
    tracker: Option<RectTracker>,
    poll_interval_ms: u32,
    this_window: Option<WindowRecord>,
    mirror: SharedState<M>,
    initial_meta: M,
    listeners: Listeners<M, P>,
    /// Sees each new state ahead of its listeners
    observer: Option<Box<dyn Fn(&CurrentState<M>)>>,
}

impl<H: Host, M: Payload, P: Payload> WindowManager<H, M, P> {
    /// Create a manager without touching the host
    ///
    /// Callbacks in `config` are subscribed immediately. Call
    /// [`WindowManager::init`] to join the registry.
    pub fn new(host: H, mut config: ManagerConfig<M, P>) -> Self {
        let listeners = Listeners::new();
        config.subscribe_callbacks(&listeners);
        Self {
            host,
            lifecycle: Lifecycle::Constructed,
            registry: RegistryStore::new(config.key.clone()),
            bus: MessageBus::new(config.key),
            tracker: None,
            poll_interval_ms: config.poll_interval_ms,
            this_window: None,
            mirror: SharedState::new(config.initial_meta.clone()),
            initial_meta: config.initial_meta,
            listeners,
            observer: None,
        }
    }

    /// Create and initialize a manager
    pub fn start(host: H, config: ManagerConfig<M, P>) -> Result<Self, SyncError> {
        let mut manager = Self::new(host, config);
        manager.init()?;
        Ok(manager)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Registry key and channel name
    pub fn key(&self) -> &str {
        self.registry.key()
    }

    /// This context's record (`None` before init)
    pub fn this_window(&self) -> Option<&WindowRecord> {
        self.this_window.as_ref()
    }

    /// Handle to the listener lists, shareable with callbacks
    pub fn listeners(&self) -> &Listeners<M, P> {
        &self.listeners
    }

    /// Install a hook called with the new state whenever the mirror or this
    /// context's record changes, before any listener of that change runs
    ///
    /// Lets an embedding answer state queries from inside a listener while
    /// the manager itself is borrowed. Replaces any previous hook.
    pub fn set_state_observer(&mut self, f: impl Fn(&CurrentState<M>) + 'static) {
        self.observer = Some(Box::new(f));
    }

    /// Snapshot of the mirror plus this context's record
    pub fn get_current_state(&self) -> CurrentState<M> {
        CurrentState {
            active_window: self.mirror.active_window.clone(),
            windows: self.mirror.windows.clone(),
            this_window: self.this_window.clone(),
            meta: self.mirror.meta.clone(),
        }
    }

    // =========================================================================
    // Local mutations
    // =========================================================================

    /// Replace the shared meta
    ///
    /// Re-reads the registry, replaces its meta and persists the full
    /// snapshot, then notifies meta listeners and state listeners in this
    /// context. Window and active-window changes written by other contexts
    /// since the last notification are delivered first. Other contexts
    /// observe the new meta through their storage notification.
    pub fn update_meta(&mut self, meta: M) {
        if !self.lifecycle.is_active() {
            self.log(&format!("update_meta ignored while {}", self.lifecycle));
            return;
        }
        let mut changes = self.commit(|state| state.meta = meta);
        // Superseded by the value just written
        changes.retain(|change| !matches!(change, Change::MetaChanged(_)));
        self.emit_changes(changes);
        let faults = self.listeners.meta.emit(&self.mirror.meta);
        self.report(faults);
        self.emit_state();
    }

    /// Broadcast a payload to every other context
    pub fn send_message(&mut self, message: &P) {
        if !self.lifecycle.is_active() {
            self.log(&format!("send_message ignored while {}", self.lifecycle));
            return;
        }
        let Some(from) = self.this_window.as_ref().map(|w| w.id.as_str()) else {
            return;
        };
        if let Err(e) = self.bus.send(&self.host, from, message) {
            self.log(&format!("send failed: {}", e));
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn add_state_listener(&self, f: impl Fn(&CurrentState<M>) + 'static) -> Subscription {
        self.listeners.add_state_listener(f)
    }

    pub fn remove_state_listener(&self, subscription: &Subscription) -> bool {
        self.listeners.remove_state_listener(subscription)
    }

    pub fn add_message_listener(&self, f: impl Fn(&P, &str) + 'static) -> Subscription {
        self.listeners.add_message_listener(f)
    }

    pub fn remove_message_listener(&self, subscription: &Subscription) -> bool {
        self.listeners.remove_message_listener(subscription)
    }

    pub fn add_new_window_listener(&self, f: impl Fn(&WindowRecord) + 'static) -> Subscription {
        self.listeners.add_new_window_listener(f)
    }

    pub fn remove_new_window_listener(&self, subscription: &Subscription) -> bool {
        self.listeners.remove_new_window_listener(subscription)
    }

    pub fn add_remove_window_listener(&self, f: impl Fn(&WindowRecord) + 'static) -> Subscription {
        self.listeners.add_remove_window_listener(f)
    }

    pub fn remove_remove_window_listener(&self, subscription: &Subscription) -> bool {
        self.listeners.remove_remove_window_listener(subscription)
    }

    pub fn add_window_update_listener(&self, f: impl Fn(&WindowRecord) + 'static) -> Subscription {
        self.listeners.add_window_update_listener(f)
    }

    pub fn remove_window_update_listener(&self, subscription: &Subscription) -> bool {
        self.listeners.remove_window_update_listener(subscription)
    }

    pub fn add_active_window_listener(
        &self,
        f: impl Fn(Option<&WindowRecord>) + 'static,
    ) -> Subscription {
        self.listeners.add_active_window_listener(f)
    }

    pub fn remove_active_window_listener(&self, subscription: &Subscription) -> bool {
        self.listeners.remove_active_window_listener(subscription)
    }

    pub fn add_meta_listener(&self, f: impl Fn(&M) + 'static) -> Subscription {
        self.listeners.add_meta_listener(f)
    }

    pub fn remove_meta_listener(&self, subscription: &Subscription) -> bool {
        self.listeners.remove_meta_listener(subscription)
    }

    pub fn add_error_listener(&self, f: impl Fn(&ListenerFault) + 'static) -> Subscription {
        self.listeners.add_error_listener(f)
    }

    pub fn remove_error_listener(&self, subscription: &Subscription) -> bool {
        self.listeners.remove_error_listener(subscription)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn log(&self, msg: &str) {
        self.host.debug_write(&format!("[winsync] {}", msg));
    }

    /// Write the mirror to shared storage; failures are logged only
    fn persist(&self) {
        if let Err(e) = self.registry.write(&self.host, &self.mirror) {
            self.log(&format!("registry write failed: {}", e));
        }
    }

    /// Read-modify-write of the shared registry
    ///
    /// Reads the current snapshot, re-inserts this context if a concurrent
    /// writer dropped it, applies `edit`, persists the result and makes it
    /// the new mirror. Returns the differences from the previous mirror,
    /// including anything other contexts wrote that has not been pumped yet.
    fn commit(&mut self, edit: impl FnOnce(&mut SharedState<M>)) -> Vec<Change<M>> {
        let mut next = self.registry.read(&self.host, &self.initial_meta);
        if let Some(me) = self.this_window.as_ref() {
            if !next.contains(&me.id) {
                next.upsert(me.clone());
                self.log(&format!("re-registered {} after concurrent write", me.id));
            }
        }
        edit(&mut next);
        if let Err(e) = self.registry.write(&self.host, &next) {
            self.log(&format!("registry write failed: {}", e));
        }
        let changes = reconcile(&self.mirror, &next);
        self.mirror = next;
        self.observe();
        changes
    }

    fn observe(&self) {
        if let Some(observer) = self.observer.as_ref() {
            observer(&self.get_current_state());
        }
    }

    /// Fan reconciled changes out to their listeners, in order
    fn emit_changes(&self, changes: Vec<Change<M>>) {
        for change in changes {
            let faults = match &change {
                Change::NewWindow(window) => self.listeners.new_window.emit(window),
                Change::RemovedWindow(window) => self.listeners.removed_window.emit(window),
                Change::UpdatedWindow(window) => self.listeners.updated_window.emit(window),
                Change::ActiveWindowChanged(window) => self.listeners.active_window.emit(window),
                Change::MetaChanged(meta) => self.listeners.meta.emit(meta),
            };
            self.report(faults);
        }
    }

    fn emit_state(&self) {
        let state = self.get_current_state();
        let faults = self.listeners.state.emit(&state);
        self.report(faults);
    }

    /// Log listener faults and forward them to error listeners
    ///
    /// Faults raised by error listeners themselves are only logged.
    fn report(&self, faults: Vec<ListenerFault>) {
        for fault in faults {
            self.log(&format!("{} listener panicked: {}", fault.category, fault.message));
            if fault.category == Category::Error {
                continue;
            }
            for nested in self.listeners.error.emit(&fault) {
                self.log(&format!("error listener panicked: {}", nested.message));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use winsync_hal_mock::MockOrigin;

    #[test]
    fn test_get_current_state_before_init() {
        let origin = MockOrigin::new();
        let manager: WindowManager<_> =
            WindowManager::new(origin.open_context(), ManagerConfig::new(json!({"a": 1})));

        let state = manager.get_current_state();

        assert_eq!(manager.lifecycle(), Lifecycle::Constructed);
        assert!(state.this_window.is_none());
        assert!(state.windows.is_empty());
        assert_eq!(state.meta, json!({"a": 1}));
        assert_eq!(origin.shared_value("winsync"), None);
    }

    #[test]
    fn test_update_meta_fans_out_meta_then_state() {
        let origin = MockOrigin::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut manager: WindowManager<_> =
            WindowManager::start(origin.open_context(), ManagerConfig::new(json!(0))).unwrap();
        let o = order.clone();
        manager.add_meta_listener(move |m| o.borrow_mut().push(format!("meta:{}", m)));
        let o = order.clone();
        manager.add_state_listener(move |s| o.borrow_mut().push(format!("state:{}", s.meta)));

        manager.update_meta(json!(7));

        assert_eq!(*order.borrow(), vec!["meta:7", "state:7"]);
        let stored: Value = serde_json::from_str(&origin.shared_value("winsync").unwrap()).unwrap();
        assert_eq!(stored["meta"], json!(7));
    }

    #[test]
    fn test_state_observer_runs_before_listeners() {
        let origin = MockOrigin::new();
        let mut manager: WindowManager<_> =
            WindowManager::new(origin.open_context(), ManagerConfig::new(json!(0)));
        let latest = Rc::new(RefCell::new(None::<CurrentState<Value>>));
        let l = latest.clone();
        manager.set_state_observer(move |state| *l.borrow_mut() = Some(state.clone()));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (l, s) = (latest.clone(), seen.clone());
        manager.add_state_listener(move |_| {
            let state = l.borrow().clone().unwrap();
            s.borrow_mut().push(format!("state:{}", state.this_window.is_some()))
        });
        let (l, s) = (latest.clone(), seen.clone());
        manager.add_meta_listener(move |_| {
            let meta = l.borrow().as_ref().unwrap().meta.clone();
            s.borrow_mut().push(format!("meta:{}", meta))
        });

        manager.init().unwrap();
        manager.update_meta(json!(5));

        assert_eq!(*seen.borrow(), vec!["state:true", "meta:5", "state:true"]);
    }

    #[test]
    fn test_update_meta_before_init_is_ignored() {
        let origin = MockOrigin::new();
        let host = origin.open_context();
        let mut manager: WindowManager<_> = WindowManager::new(host, ManagerConfig::new(json!(0)));

        manager.update_meta(json!(1));

        assert_eq!(manager.get_current_state().meta, json!(0));
        assert!(manager.host().has_log_containing("update_meta ignored while constructed"));
    }

    #[test]
    fn test_panicking_listener_reported_to_error_listeners() {
        let origin = MockOrigin::new();
        let mut manager: WindowManager<_> =
            WindowManager::start(origin.open_context(), ManagerConfig::new(json!(0))).unwrap();
        let faults = Rc::new(RefCell::new(Vec::new()));
        let f = faults.clone();
        manager.add_error_listener(move |fault| f.borrow_mut().push(fault.clone()));
        manager.add_meta_listener(|_| panic!("bad meta handler"));
        let reached = Rc::new(RefCell::new(false));
        let r = reached.clone();
        manager.add_state_listener(move |_| *r.borrow_mut() = true);

        manager.update_meta(json!(1));

        assert!(*reached.borrow());
        assert_eq!(
            *faults.borrow(),
            vec![ListenerFault {
                category: Category::Meta,
                message: "bad meta handler".to_string(),
            }]
        );
        assert!(manager.host().has_log_containing("meta listener panicked: bad meta handler"));
    }

    #[test]
    fn test_panicking_error_listener_is_only_logged() {
        let origin = MockOrigin::new();
        let mut manager: WindowManager<_> =
            WindowManager::start(origin.open_context(), ManagerConfig::new(json!(0))).unwrap();
        let calls = Rc::new(RefCell::new(0));
        let c = calls.clone();
        manager.add_error_listener(move |_| {
            *c.borrow_mut() += 1;
            panic!("error handler broke");
        });
        manager.add_state_listener(|_| panic!("state handler broke"));

        manager.update_meta(json!(1));

        assert_eq!(*calls.borrow(), 1);
        assert!(manager.host().has_log_containing("error listener panicked: error handler broke"));
    }

    #[test]
    fn test_config_callbacks_are_subscribed() {
        let origin = MockOrigin::new();
        let seen = Rc::new(RefCell::new(0));
        let s = seen.clone();
        let config = ManagerConfig::new(json!(null)).on_state_change(move |_| *s.borrow_mut() += 1);

        let _manager: WindowManager<_> = WindowManager::start(origin.open_context(), config).unwrap();

        assert_eq!(*seen.borrow(), 1);
    }
}
