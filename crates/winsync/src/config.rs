//! Manager configuration

use crate::listener::Listeners;
use crate::state::CurrentState;
use crate::window::{WindowRecord, DEFAULT_POLL_INTERVAL_MS};

/// Default registry key and channel name
pub const DEFAULT_KEY: &str = "winsync";

type StateFn<M> = Box<dyn Fn(&CurrentState<M>)>;
type MessageFn<P> = Box<dyn Fn(&P, &str)>;
type WindowFn = Box<dyn Fn(&WindowRecord)>;
type ActiveFn = Box<dyn Fn(Option<&WindowRecord>)>;
type MetaFn<M> = Box<dyn Fn(&M)>;

/// Construction options for a `WindowManager`
///
/// Each `on_*` callback is subscribed once, before initialization, so it
/// also sees the first state-changed emission.
pub struct ManagerConfig<M, P> {
    /// Shared storage key, context storage key and channel name
    pub key: String,
    /// Geometry poll period in milliseconds
    pub poll_interval_ms: u32,
    /// Meta used until (and unless) the registry supplies one
    pub initial_meta: M,
    pub on_state_change: Option<StateFn<M>>,
    pub on_message: Option<MessageFn<P>>,
    pub on_new_window: Option<WindowFn>,
    pub on_remove_window: Option<WindowFn>,
    pub on_window_update: Option<WindowFn>,
    pub on_active_window_change: Option<ActiveFn>,
    pub on_meta_change: Option<MetaFn<M>>,
}

impl<M, P> ManagerConfig<M, P> {
    pub fn new(initial_meta: M) -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            initial_meta,
            on_state_change: None,
            on_message: None,
            on_new_window: None,
            on_remove_window: None,
            on_window_update: None,
            on_active_window_change: None,
            on_meta_change: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set the geometry poll period (clamped to at least 1 ms)
    pub fn with_poll_interval(mut self, period_ms: u32) -> Self {
        self.poll_interval_ms = period_ms.max(1);
        self
    }

    pub fn on_state_change(mut self, f: impl Fn(&CurrentState<M>) + 'static) -> Self {
        self.on_state_change = Some(Box::new(f));
        self
    }

    pub fn on_message(mut self, f: impl Fn(&P, &str) + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    pub fn on_new_window(mut self, f: impl Fn(&WindowRecord) + 'static) -> Self {
        self.on_new_window = Some(Box::new(f));
        self
    }

    pub fn on_remove_window(mut self, f: impl Fn(&WindowRecord) + 'static) -> Self {
        self.on_remove_window = Some(Box::new(f));
        self
    }

    pub fn on_window_update(mut self, f: impl Fn(&WindowRecord) + 'static) -> Self {
        self.on_window_update = Some(Box::new(f));
        self
    }

    pub fn on_active_window_change(mut self, f: impl Fn(Option<&WindowRecord>) + 'static) -> Self {
        self.on_active_window_change = Some(Box::new(f));
        self
    }

    pub fn on_meta_change(mut self, f: impl Fn(&M) + 'static) -> Self {
        self.on_meta_change = Some(Box::new(f));
        self
    }

    /// Move the callbacks into `listeners`, leaving the options behind
    pub(crate) fn subscribe_callbacks(&mut self, listeners: &Listeners<M, P>)
    where
        M: 'static,
        P: 'static,
    {
        if let Some(f) = self.on_state_change.take() {
            listeners.add_state_listener(f);
        }
        if let Some(f) = self.on_message.take() {
            listeners.add_message_listener(f);
        }
        if let Some(f) = self.on_new_window.take() {
            listeners.add_new_window_listener(f);
        }
        if let Some(f) = self.on_remove_window.take() {
            listeners.add_remove_window_listener(f);
        }
        if let Some(f) = self.on_window_update.take() {
            listeners.add_window_update_listener(f);
        }
        if let Some(f) = self.on_active_window_change.take() {
            listeners.add_active_window_listener(f);
        }
        if let Some(f) = self.on_meta_change.take() {
            listeners.add_meta_listener(f);
        }
    }
}

impl<M: Default, P> Default for ManagerConfig<M, P> {
    fn default() -> Self {
        Self::new(M::default())
    }
}
