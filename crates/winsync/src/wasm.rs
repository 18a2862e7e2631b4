//! WASM exports for the window manager
//!
//! `WindowSync` wraps a `WindowManager<WebHost>` with a JS-friendly API.
//! Meta, messages and records cross the boundary as plain JS values
//! (round-tripped through JSON).
//!
//! The manager is borrowed mutably while it dispatches, and JS listeners
//! may call back into `WindowSync` from inside a dispatch. Mutating calls
//! are therefore queued and drained as soon as the manager is free, and
//! state queries are answered from a snapshot the manager refreshes before
//! any listener of a change runs.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

use js_sys::{Function, Reflect};
use serde::Serialize;
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::config::ManagerConfig;
use crate::listener::{Category, ListenerFault, ListenerList, Listeners, Subscription};
use crate::manager::WindowManager;
use crate::web::{log, WebHost};

type Manager = WindowManager<WebHost, Value, Value>;

/// Constructor options that register a listener, and their category
const OPTION_CALLBACKS: [(&str, Category); 8] = [
    ("onStateChange", Category::State),
    ("onMessage", Category::Message),
    ("onNewWindow", Category::NewWindow),
    ("onRemoveWindow", Category::RemovedWindow),
    ("onWindowUpdate", Category::UpdatedWindow),
    ("onActiveWindowChange", Category::ActiveWindow),
    ("onMetaChange", Category::Meta),
    ("onError", Category::Error),
];

/// Mutation queued while the manager was busy
enum Deferred {
    Meta(Value),
    Message(Value),
    Teardown,
}

/// Window sync controller for WASM
#[wasm_bindgen]
pub struct WindowSync {
    manager: Rc<RefCell<Manager>>,
    pending: Rc<RefCell<VecDeque<Deferred>>>,
    listeners: Listeners<Value, Value>,
    /// Latest state published by the manager, served while it is busy
    last_state: Rc<RefCell<JsValue>>,
    subscriptions: RefCell<BTreeMap<u32, Subscription>>,
    next_subscription: Cell<u32>,
}

/// Pump host events and apply queued mutations until both are empty
///
/// Returns immediately if the manager is already borrowed; the outer frame
/// holding the borrow drives the rest.
fn drive(manager: &Rc<RefCell<Manager>>, pending: &Rc<RefCell<VecDeque<Deferred>>>) {
    loop {
        let Ok(mut manager) = manager.try_borrow_mut() else {
            return;
        };
        manager.pump();
        let next = pending.borrow_mut().pop_front();
        match next {
            Some(Deferred::Meta(meta)) => manager.update_meta(meta),
            Some(Deferred::Message(message)) => manager.send_message(&message),
            Some(Deferred::Teardown) => manager.teardown(),
            None => return,
        }
    }
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> JsValue {
    serde_json::to_string(value)
        .ok()
        .and_then(|json| js_sys::JSON::parse(&json).ok())
        .unwrap_or(JsValue::NULL)
}

fn from_js(value: &JsValue) -> Result<Value, JsValue> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let json: String = js_sys::JSON::stringify(value)?.into();
    serde_json::from_str(&json).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Read an option, treating `undefined` and `null` as absent
fn option(options: &JsValue, name: &str) -> Option<JsValue> {
    if options.is_undefined() || options.is_null() {
        return None;
    }
    Reflect::get(options, &JsValue::from_str(name))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

fn callback(options: &JsValue, name: &str) -> Option<Function> {
    option(options, name).and_then(|v| v.dyn_into::<Function>().ok())
}

/// Text of a thrown JS value
fn describe(thrown: &JsValue) -> String {
    if let Some(error) = thrown.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    thrown.as_string().unwrap_or_else(|| format!("{:?}", thrown))
}

/// A JS function subscribed to one category
///
/// Exceptions are logged and reported to the error listeners as a
/// `ListenerFault`; they never propagate into the manager.
struct JsListener {
    f: Function,
    category: Category,
    /// `None` for error listeners themselves
    errors: Option<ListenerList<ListenerFault>>,
}

impl JsListener {
    fn call(&self, args: &[JsValue]) {
        let this = JsValue::NULL;
        let result = match args {
            [] => self.f.call0(&this),
            [a] => self.f.call1(&this, a),
            [a, b, ..] => self.f.call2(&this, a, b),
        };
        let Err(thrown) = result else {
            return;
        };
        let fault = ListenerFault {
            category: self.category,
            message: describe(&thrown),
        };
        log(&format!("[winsync] {} listener threw: {}", fault.category, fault.message));
        if let Some(errors) = self.errors.as_ref() {
            let _ = errors.emit(&fault);
        }
    }
}

/// Subscribe a JS function to `category`
fn subscribe(listeners: &Listeners<Value, Value>, category: Category, f: Function) -> Subscription {
    let js = JsListener {
        f,
        category,
        errors: (category != Category::Error).then(|| listeners.error.clone()),
    };
    match category {
        Category::State => listeners.add_state_listener(move |state| js.call(&[to_js(state)])),
        Category::Message => listeners.add_message_listener(move |message, from| {
            js.call(&[to_js(message), JsValue::from_str(from)])
        }),
        Category::NewWindow => listeners.add_new_window_listener(move |w| js.call(&[to_js(w)])),
        Category::RemovedWindow => {
            listeners.add_remove_window_listener(move |w| js.call(&[to_js(w)]))
        }
        Category::UpdatedWindow => {
            listeners.add_window_update_listener(move |w| js.call(&[to_js(w)]))
        }
        Category::ActiveWindow => {
            listeners.add_active_window_listener(move |w| js.call(&[to_js(&w)]))
        }
        Category::Meta => listeners.add_meta_listener(move |meta| js.call(&[to_js(meta)])),
        Category::Error => listeners.add_error_listener(move |fault| {
            js.call(&[to_js(&json!({
                "category": fault.category.to_string(),
                "message": fault.message,
            }))])
        }),
    }
}

fn build_config(options: &JsValue) -> Result<ManagerConfig<Value, Value>, JsValue> {
    let initial_meta = match option(options, "initialMeta") {
        Some(meta) => from_js(&meta)?,
        None => Value::Null,
    };
    let mut config = ManagerConfig::new(initial_meta);

    if let Some(key) = option(options, "key").and_then(|v| v.as_string()) {
        config = config.with_key(key);
    }
    if let Some(ms) = option(options, "pollInterval").and_then(|v| v.as_f64()) {
        config = config.with_poll_interval(ms as u32);
    }
    Ok(config)
}

#[wasm_bindgen]
impl WindowSync {
    /// Create a controller and join the registry
    ///
    /// `options` may carry `key`, `pollInterval`, `initialMeta` and the
    /// `on*` callbacks (`onStateChange`, `onMessage`, `onNewWindow`,
    /// `onRemoveWindow`, `onWindowUpdate`, `onActiveWindowChange`,
    /// `onMetaChange`, `onError`).
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<WindowSync, JsValue> {
        console_error_panic_hook::set_once();

        let config = build_config(&options)?;
        let host = WebHost::new().map_err(|e| JsValue::from_str(&e.to_string()))?;
        let manager = Rc::new(RefCell::new(WindowManager::new(host, config)));
        let pending = Rc::new(RefCell::new(VecDeque::new()));

        let listeners = manager.borrow().listeners().clone();
        for (name, category) in OPTION_CALLBACKS {
            if let Some(f) = callback(&options, name) {
                subscribe(&listeners, category, f);
            }
        }

        let last_state = Rc::new(RefCell::new(JsValue::NULL));
        let cache = last_state.clone();
        manager
            .borrow_mut()
            .set_state_observer(move |state| *cache.borrow_mut() = to_js(state));

        let weak: Weak<RefCell<Manager>> = Rc::downgrade(&manager);
        let queue = pending.clone();
        manager.borrow().host().set_waker(move || {
            if let Some(manager) = weak.upgrade() {
                drive(&manager, &queue);
            }
        });

        manager
            .borrow_mut()
            .init()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        // Anything queued by listeners during init
        drive(&manager, &pending);

        Ok(Self {
            manager,
            pending,
            listeners,
            last_state,
            subscriptions: RefCell::new(BTreeMap::new()),
            next_subscription: Cell::new(1),
        })
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Get `{activeWindow, windows, thisWindow, meta}`
    #[wasm_bindgen(js_name = getCurrentState)]
    pub fn get_current_state(&self) -> JsValue {
        match self.manager.try_borrow() {
            Ok(manager) => to_js(&manager.get_current_state()),
            Err(_) => self.last_state.borrow().clone(),
        }
    }

    /// Replace the shared meta
    #[wasm_bindgen(js_name = updateMeta)]
    pub fn update_meta(&self, meta: JsValue) -> Result<(), JsValue> {
        let meta = from_js(&meta)?;
        self.enqueue(Deferred::Meta(meta));
        Ok(())
    }

    /// Broadcast a message to every other context
    #[wasm_bindgen(js_name = sendMessage)]
    pub fn send_message(&self, message: JsValue) -> Result<(), JsValue> {
        let message = from_js(&message)?;
        self.enqueue(Deferred::Message(message));
        Ok(())
    }

    /// Leave the registry; the controller stays inert afterwards
    #[wasm_bindgen]
    pub fn destroy(&self) {
        self.enqueue(Deferred::Teardown);
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    #[wasm_bindgen(js_name = addStateListener)]
    pub fn add_state_listener(&self, f: Function) -> u32 {
        self.track(Category::State, f)
    }

    #[wasm_bindgen(js_name = removeStateListener)]
    pub fn remove_state_listener(&self, id: u32) -> bool {
        self.untrack(Category::State, id)
    }

    /// Listener receives `(message, fromId)`
    #[wasm_bindgen(js_name = addMessageListener)]
    pub fn add_message_listener(&self, f: Function) -> u32 {
        self.track(Category::Message, f)
    }

    #[wasm_bindgen(js_name = removeMessageListener)]
    pub fn remove_message_listener(&self, id: u32) -> bool {
        self.untrack(Category::Message, id)
    }

    #[wasm_bindgen(js_name = addNewWindowListener)]
    pub fn add_new_window_listener(&self, f: Function) -> u32 {
        self.track(Category::NewWindow, f)
    }

    #[wasm_bindgen(js_name = removeNewWindowListener)]
    pub fn remove_new_window_listener(&self, id: u32) -> bool {
        self.untrack(Category::NewWindow, id)
    }

    #[wasm_bindgen(js_name = addRemoveWindowListener)]
    pub fn add_remove_window_listener(&self, f: Function) -> u32 {
        self.track(Category::RemovedWindow, f)
    }

    #[wasm_bindgen(js_name = removeRemoveWindowListener)]
    pub fn remove_remove_window_listener(&self, id: u32) -> bool {
        self.untrack(Category::RemovedWindow, id)
    }

    #[wasm_bindgen(js_name = addWindowUpdateListener)]
    pub fn add_window_update_listener(&self, f: Function) -> u32 {
        self.track(Category::UpdatedWindow, f)
    }

    #[wasm_bindgen(js_name = removeWindowUpdateListener)]
    pub fn remove_window_update_listener(&self, id: u32) -> bool {
        self.untrack(Category::UpdatedWindow, id)
    }

    /// Listener receives the active window record or `null`
    #[wasm_bindgen(js_name = addActiveWindowChangeListener)]
    pub fn add_active_window_listener(&self, f: Function) -> u32 {
        self.track(Category::ActiveWindow, f)
    }

    #[wasm_bindgen(js_name = removeActiveWindowChangeListener)]
    pub fn remove_active_window_listener(&self, id: u32) -> bool {
        self.untrack(Category::ActiveWindow, id)
    }

    #[wasm_bindgen(js_name = addMetaChangeListener)]
    pub fn add_meta_listener(&self, f: Function) -> u32 {
        self.track(Category::Meta, f)
    }

    #[wasm_bindgen(js_name = removeMetaChangeListener)]
    pub fn remove_meta_listener(&self, id: u32) -> bool {
        self.untrack(Category::Meta, id)
    }

    /// Listener receives `{category, message}` for every listener that threw
    #[wasm_bindgen(js_name = addErrorListener)]
    pub fn add_error_listener(&self, f: Function) -> u32 {
        self.track(Category::Error, f)
    }

    #[wasm_bindgen(js_name = removeErrorListener)]
    pub fn remove_error_listener(&self, id: u32) -> bool {
        self.untrack(Category::Error, id)
    }
}

impl WindowSync {
    fn enqueue(&self, deferred: Deferred) {
        self.pending.borrow_mut().push_back(deferred);
        drive(&self.manager, &self.pending);
    }

    fn track(&self, category: Category, f: Function) -> u32 {
        let subscription = subscribe(&self.listeners, category, f);
        let id = self.next_subscription.get();
        self.next_subscription.set(id + 1);
        self.subscriptions.borrow_mut().insert(id, subscription);
        id
    }

    /// Remove a tracked subscription if it belongs to `category`
    fn untrack(&self, category: Category, id: u32) -> bool {
        let subscription = match self.subscriptions.borrow().get(&id) {
            Some(subscription) if subscription.category() == category => subscription.clone(),
            _ => return false,
        };
        let removed = self.listeners.remove(&subscription);
        if removed {
            self.subscriptions.borrow_mut().remove(&id);
        }
        removed
    }
}
