//! `WebHost`: the browser implementation of `Host`
//!
//! Browser callbacks never touch the engine directly. They push a
//! `HostEvent` onto the inbox and call the waker, and the owner drains the
//! inbox through `Host::poll_events` on its own stack.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use js_sys::Reflect;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{BroadcastChannel, Event, MessageEvent, Storage, StorageEvent, Window};
use winsync_hal::{GeometrySample, Host, HostError, HostEvent, ScreenInfo, TimerHandle, WindowRect};

use super::log;

type Inbox = Rc<RefCell<VecDeque<HostEvent>>>;
type Waker = Rc<RefCell<Option<Rc<dyn Fn()>>>>;

/// Window events the host subscribes to, and what they become
const WINDOW_EVENTS: [&str; 5] = ["storage", "focus", "resize", "pagehide", "beforeunload"];

/// A joined channel and its handler
struct JoinedChannel {
    channel: BroadcastChannel,
    /// Kept alive for as long as the channel is joined
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
}

/// An armed interval and its callback
struct ArmedTimer {
    interval: i32,
    _callback: Closure<dyn FnMut()>,
}

/// Browser host for one browsing context
pub struct WebHost {
    window: Window,
    inbox: Inbox,
    waker: Waker,
    /// Window event listeners, removed on drop
    listeners: Vec<(&'static str, Closure<dyn FnMut(Event)>)>,
    channels: RefCell<BTreeMap<String, JoinedChannel>>,
    timers: RefCell<BTreeMap<u32, ArmedTimer>>,
    next_timer: Cell<u32>,
}

fn push_and_wake(inbox: &Inbox, waker: &Waker, event: HostEvent) {
    inbox.borrow_mut().push_back(event);
    // Clone out so the waker may replace itself
    let wake = waker.borrow().clone();
    if let Some(wake) = wake {
        wake();
    }
}

/// Read a numeric property, `0` when absent
fn number(target: &JsValue, name: &str) -> f64 {
    Reflect::get(target, &JsValue::from_str(name))
        .ok()
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}

fn is_quota_error(err: &JsValue) -> bool {
    Reflect::get(err, &"name".into())
        .ok()
        .and_then(|v| v.as_string())
        .is_some_and(|name| name == "QuotaExceededError")
}

impl WebHost {
    /// Attach to the current window
    ///
    /// Fails with `HostError::NoWindow` outside a browsing context (e.g. in
    /// a worker).
    pub fn new() -> Result<Self, HostError> {
        let window = web_sys::window().ok_or(HostError::NoWindow)?;
        let mut host = Self {
            window,
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            waker: Rc::new(RefCell::new(None)),
            listeners: Vec::new(),
            channels: RefCell::new(BTreeMap::new()),
            timers: RefCell::new(BTreeMap::new()),
            next_timer: Cell::new(1),
        };
        for name in WINDOW_EVENTS {
            host.listen(name)?;
        }
        Ok(host)
    }

    /// Register the function called after every queued event
    pub fn set_waker(&self, wake: impl Fn() + 'static) {
        *self.waker.borrow_mut() = Some(Rc::new(wake));
    }

    fn listen(&mut self, name: &'static str) -> Result<(), HostError> {
        let inbox = self.inbox.clone();
        let waker = self.waker.clone();
        let closure = Closure::wrap(Box::new(move |event: Event| {
            let event = match name {
                "storage" => HostEvent::StorageChanged {
                    key: event.dyn_ref::<StorageEvent>().and_then(|e| e.key()),
                },
                "focus" => HostEvent::Focus,
                "resize" => HostEvent::Resize,
                _ => HostEvent::Unload,
            };
            push_and_wake(&inbox, &waker, event);
        }) as Box<dyn FnMut(Event)>);

        self.window
            .add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())
            .map_err(|e| {
                log(&format!("[web-host] Failed to listen for {}: {:?}", name, e));
                HostError::NotSupported
            })?;
        self.listeners.push((name, closure));
        Ok(())
    }

    fn local(&self) -> Result<Storage, HostError> {
        self.window
            .local_storage()
            .ok()
            .flatten()
            .ok_or(HostError::StorageUnavailable)
    }

    fn session(&self) -> Result<Storage, HostError> {
        self.window
            .session_storage()
            .ok()
            .flatten()
            .ok_or(HostError::StorageUnavailable)
    }
}

fn write_item(storage: &Storage, key: &str, value: &str) -> Result<(), HostError> {
    storage.set_item(key, value).map_err(|e| {
        if is_quota_error(&e) {
            HostError::QuotaExceeded
        } else {
            HostError::StorageUnavailable
        }
    })
}

impl Host for WebHost {
    fn shared_get(&self, key: &str) -> Result<Option<String>, HostError> {
        self.local()?
            .get_item(key)
            .map_err(|_| HostError::StorageUnavailable)
    }

    fn shared_set(&self, key: &str, value: &str) -> Result<(), HostError> {
        write_item(&self.local()?, key, value)
    }

    fn shared_remove(&self, key: &str) -> Result<(), HostError> {
        self.local()?
            .remove_item(key)
            .map_err(|_| HostError::StorageUnavailable)
    }

    fn context_get(&self, key: &str) -> Result<Option<String>, HostError> {
        self.session()?
            .get_item(key)
            .map_err(|_| HostError::StorageUnavailable)
    }

    fn context_set(&self, key: &str, value: &str) -> Result<(), HostError> {
        write_item(&self.session()?, key, value)
    }

    fn join_channel(&self, name: &str) -> Result<(), HostError> {
        if self.channels.borrow().contains_key(name) {
            return Ok(());
        }
        let channel = BroadcastChannel::new(name).map_err(|e| {
            log(&format!("[web-host] Failed to open channel {}: {:?}", name, e));
            HostError::ChannelUnavailable
        })?;

        let inbox = self.inbox.clone();
        let waker = self.waker.clone();
        let channel_name = name.to_string();
        let onmessage = Closure::wrap(Box::new(move |event: MessageEvent| {
            // Envelopes travel as structured objects, the engine reads JSON
            let data = match js_sys::JSON::stringify(&event.data()) {
                Ok(json) => String::from(json),
                Err(_) => return,
            };
            push_and_wake(
                &inbox,
                &waker,
                HostEvent::Message {
                    channel: channel_name.clone(),
                    data,
                },
            );
        }) as Box<dyn FnMut(MessageEvent)>);
        channel.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        self.channels.borrow_mut().insert(
            name.to_string(),
            JoinedChannel {
                channel,
                _onmessage: onmessage,
            },
        );
        Ok(())
    }

    fn leave_channel(&self, name: &str) {
        if let Some(joined) = self.channels.borrow_mut().remove(name) {
            joined.channel.set_onmessage(None);
            joined.channel.close();
        }
    }

    fn broadcast(&self, name: &str, data: &str) -> Result<(), HostError> {
        let channels = self.channels.borrow();
        let joined = channels.get(name).ok_or(HostError::ChannelUnavailable)?;
        let value = js_sys::JSON::parse(data).map_err(|_| HostError::InvalidArgument)?;
        joined
            .channel
            .post_message(&value)
            .map_err(|_| HostError::ChannelUnavailable)
    }

    fn sample_geometry(&self) -> Result<GeometrySample, HostError> {
        let screen: JsValue = self.window.screen().map_err(|_| HostError::NoWindow)?.into();
        let window: &JsValue = self.window.as_ref();
        let rect = WindowRect {
            screen_top: number(window, "screenTop"),
            screen_left: number(window, "screenLeft"),
            screen_x: number(window, "screenX"),
            screen_y: number(window, "screenY"),
            scroll_x: number(window, "scrollX"),
            scroll_y: number(window, "scrollY"),
        };
        let info = ScreenInfo {
            width: number(&screen, "width"),
            height: number(&screen, "height"),
            avail_width: number(&screen, "availWidth"),
            avail_height: number(&screen, "availHeight"),
            avail_top: number(&screen, "availTop"),
            avail_left: number(&screen, "availLeft"),
            color_depth: number(&screen, "colorDepth"),
            pixel_depth: number(&screen, "pixelDepth"),
        };
        Ok(GeometrySample::new(rect, info))
    }

    fn set_interval(&self, period_ms: u32) -> Result<TimerHandle, HostError> {
        let timeout = i32::try_from(period_ms).map_err(|_| HostError::InvalidArgument)?;
        if timeout == 0 {
            return Err(HostError::InvalidArgument);
        }
        let handle = TimerHandle::new(self.next_timer.get());
        self.next_timer.set(handle.id() + 1);

        let inbox = self.inbox.clone();
        let waker = self.waker.clone();
        let callback = Closure::wrap(Box::new(move || {
            push_and_wake(&inbox, &waker, HostEvent::Tick(handle));
        }) as Box<dyn FnMut()>);

        let interval = self
            .window
            .set_interval_with_callback_and_timeout_and_arguments_0(
                callback.as_ref().unchecked_ref(),
                timeout,
            )
            .map_err(|_| HostError::TimerUnavailable)?;

        self.timers.borrow_mut().insert(
            handle.id(),
            ArmedTimer {
                interval,
                _callback: callback,
            },
        );
        Ok(handle)
    }

    fn clear_interval(&self, handle: TimerHandle) {
        if let Some(timer) = self.timers.borrow_mut().remove(&handle.id()) {
            self.window.clear_interval_with_handle(timer.interval);
        }
    }

    fn wallclock_ms(&self) -> u64 {
        js_sys::Date::now() as u64
    }

    fn random_bytes(&self, buf: &mut [u8]) -> Result<(), HostError> {
        self.window
            .crypto()
            .map_err(|_| HostError::NotSupported)?
            .get_random_values_with_u8_array(buf)
            .map_err(|_| HostError::NotSupported)?;
        Ok(())
    }

    fn debug_write(&self, msg: &str) {
        log(msg);
    }

    fn poll_events(&self) -> Vec<HostEvent> {
        self.inbox.borrow_mut().drain(..).collect()
    }
}

impl Drop for WebHost {
    fn drop(&mut self) {
        for (name, closure) in self.listeners.drain(..) {
            let _ = self
                .window
                .remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
        }
        for (_, timer) in std::mem::take(&mut *self.timers.borrow_mut()) {
            self.window.clear_interval_with_handle(timer.interval);
        }
        for (_, joined) in std::mem::take(&mut *self.channels.borrow_mut()) {
            joined.channel.set_onmessage(None);
            joined.channel.close();
        }
        self.waker.borrow_mut().take();
    }
}
