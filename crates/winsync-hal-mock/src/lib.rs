//! Mock host implementation for testing winsync
//!
//! A [`MockOrigin`] simulates one web origin with any number of browsing
//! contexts. Each context gets a [`MockHost`] that implements the `Host`
//! trait against the shared in-memory origin, with the delivery rules a
//! browser applies:
//!
//! - shared storage writes that change a value notify every *other* context
//! - broadcasts reach every other context that joined the channel
//! - context storage survives [`MockOrigin::reload`]
//! - timers fire only when simulated time is advanced
//!
//! Nothing is delivered synchronously; tests drain each context's queue
//! explicitly, which makes interleavings between contexts deterministic.

#![no_std]
extern crate alloc;

use alloc::collections::{BTreeMap, VecDeque};
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use winsync_hal::{
    GeometrySample, Host, HostError, HostEvent, ScreenInfo, TimerHandle, WindowRect,
};

/// Simulated origin shared by several contexts
#[derive(Clone)]
pub struct MockOrigin {
    inner: Rc<RefCell<OriginState>>,
}

struct OriginState {
    /// Origin-wide storage (`localStorage`)
    shared: BTreeMap<String, String>,
    /// Contexts by ID
    contexts: BTreeMap<u64, MockContext>,
    /// Next context ID to assign
    next_context: u64,
    /// Simulated wall-clock time in milliseconds
    time_ms: u64,
    /// Random seed for deterministic entropy
    random_seed: u64,
    /// Reject shared writes with `QuotaExceeded`
    fail_shared_writes: bool,
}

/// Simulated browsing context state
struct MockContext {
    alive: bool,
    /// Context-scoped storage (`sessionStorage`)
    session: BTreeMap<String, String>,
    channels: Vec<String>,
    inbox: VecDeque<HostEvent>,
    geometry: GeometrySample,
    timers: BTreeMap<u32, MockTimer>,
    next_timer: u32,
    debug_log: Vec<String>,
}

struct MockTimer {
    period_ms: u32,
    next_due: u64,
}

impl MockContext {
    fn new(geometry: GeometrySample) -> Self {
        Self {
            alive: true,
            session: BTreeMap::new(),
            channels: Vec::new(),
            inbox: VecDeque::new(),
            geometry,
            timers: BTreeMap::new(),
            next_timer: 1,
            debug_log: Vec::new(),
        }
    }

    /// Drop everything a page load owns, keep context storage
    fn reset_page(&mut self) {
        self.channels.clear();
        self.inbox.clear();
        self.timers.clear();
    }
}

impl OriginState {
    fn notify_storage(&mut self, writer: Option<u64>, key: Option<&str>) {
        for (id, ctx) in self.contexts.iter_mut() {
            if Some(*id) == writer || !ctx.alive {
                continue;
            }
            ctx.inbox.push_back(HostEvent::StorageChanged {
                key: key.map(|k| k.to_string()),
            });
        }
    }
}

impl MockOrigin {
    /// Create a new origin at time zero
    pub fn new() -> Self {
        Self::with_time(0)
    }

    /// Create an origin with a specific starting wall-clock time
    pub fn with_time(ms: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(OriginState {
                shared: BTreeMap::new(),
                contexts: BTreeMap::new(),
                next_context: 1,
                time_ms: ms,
                random_seed: 12345, // Deterministic seed
                fail_shared_writes: false,
            })),
        }
    }

    /// Open a new context with a default geometry
    ///
    /// Contexts are laid out side by side so each starts at a distinct rect.
    pub fn open_context(&self) -> MockHost {
        let offset = self.inner.borrow().next_context as f64 * 100.0;
        self.open_context_at(GeometrySample::new(
            WindowRect::at(offset, 100.0),
            ScreenInfo::new(1920.0, 1080.0),
        ))
    }

    /// Open a new context with a specific geometry
    pub fn open_context_at(&self, geometry: GeometrySample) -> MockHost {
        let mut origin = self.inner.borrow_mut();
        let id = origin.next_context;
        origin.next_context += 1;
        origin.contexts.insert(id, MockContext::new(geometry));
        MockHost {
            origin: self.inner.clone(),
            context: id,
        }
    }

    /// Reload a context: page state is discarded, context storage is kept
    pub fn reload(&self, host: &MockHost) -> MockHost {
        if let Some(ctx) = self.inner.borrow_mut().contexts.get_mut(&host.context) {
            ctx.reset_page();
            ctx.alive = true;
        }
        MockHost {
            origin: self.inner.clone(),
            context: host.context,
        }
    }

    /// Close a context without running its unload path
    pub fn close(&self, host: &MockHost) {
        if let Some(ctx) = self.inner.borrow_mut().contexts.get_mut(&host.context) {
            ctx.reset_page();
            ctx.alive = false;
        }
    }

    /// Advance simulated time, queueing a tick for every timer that comes due
    pub fn advance_time(&self, ms: u64) {
        let mut origin = self.inner.borrow_mut();
        origin.time_ms += ms;
        let now = origin.time_ms;
        for ctx in origin.contexts.values_mut().filter(|c| c.alive) {
            for (id, timer) in ctx.timers.iter_mut() {
                while timer.next_due <= now {
                    ctx.inbox.push_back(HostEvent::Tick(TimerHandle::new(*id)));
                    timer.next_due += u64::from(timer.period_ms);
                }
            }
        }
    }

    /// Current simulated time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.inner.borrow().time_ms
    }

    /// Raw shared storage value (for assertions)
    pub fn shared_value(&self, key: &str) -> Option<String> {
        self.inner.borrow().shared.get(key).cloned()
    }

    /// Write shared storage as a foreign writer, notifying every context
    pub fn set_shared_raw(&self, key: &str, value: &str) {
        let mut origin = self.inner.borrow_mut();
        origin.shared.insert(key.to_string(), value.to_string());
        origin.notify_storage(None, Some(key));
    }

    /// Clear all shared storage as a foreign writer, notifying every context
    pub fn clear_shared(&self) {
        let mut origin = self.inner.borrow_mut();
        origin.shared.clear();
        origin.notify_storage(None, None);
    }

    /// Make every shared write fail with `QuotaExceeded`
    pub fn set_fail_shared_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_shared_writes = fail;
    }

    /// Set the random seed for deterministic testing
    pub fn set_random_seed(&self, seed: u64) {
        self.inner.borrow_mut().random_seed = seed;
    }

    /// Number of contexts still alive
    pub fn alive_context_count(&self) -> usize {
        self.inner.borrow().contexts.values().filter(|c| c.alive).count()
    }
}

impl Default for MockOrigin {
    fn default() -> Self {
        Self::new()
    }
}

/// Host handle for one simulated context
pub struct MockHost {
    origin: Rc<RefCell<OriginState>>,
    context: u64,
}

impl MockHost {
    /// Simulated context ID
    pub fn context_id(&self) -> u64 {
        self.context
    }

    fn with_ctx<R>(&self, f: impl FnOnce(&mut MockContext) -> R) -> Option<R> {
        self.origin.borrow_mut().contexts.get_mut(&self.context).map(f)
    }

    fn push(&self, event: HostEvent) {
        self.with_ctx(|ctx| {
            if ctx.alive {
                ctx.inbox.push_back(event);
            }
        });
    }

    /// Move the context on screen (no event; the host has no "moved" event)
    pub fn move_to(&self, x: f64, y: f64) {
        self.with_ctx(|ctx| {
            let scroll = (ctx.geometry.rect.scroll_x, ctx.geometry.rect.scroll_y);
            ctx.geometry.rect = WindowRect::at(x, y).scrolled(scroll.0, scroll.1);
        });
    }

    /// Change scroll offsets (no event)
    pub fn scroll_to(&self, x: f64, y: f64) {
        self.with_ctx(|ctx| ctx.geometry.rect = ctx.geometry.rect.scrolled(x, y));
    }

    /// Replace the whole geometry (no event)
    pub fn set_geometry(&self, geometry: GeometrySample) {
        self.with_ctx(|ctx| ctx.geometry = geometry);
    }

    /// Current simulated geometry
    pub fn geometry(&self) -> GeometrySample {
        self.with_ctx(|ctx| ctx.geometry).unwrap_or_default()
    }

    /// Queue a focus event
    pub fn focus(&self) {
        self.push(HostEvent::Focus);
    }

    /// Queue a resize event
    pub fn resize(&self) {
        self.push(HostEvent::Resize);
    }

    /// Queue an unload event
    pub fn unload(&self) {
        self.push(HostEvent::Unload);
    }

    /// Queue an arbitrary event
    pub fn inject(&self, event: HostEvent) {
        self.push(event);
    }

    /// Number of queued, undrained events
    pub fn pending_event_count(&self) -> usize {
        self.with_ctx(|ctx| ctx.inbox.len()).unwrap_or(0)
    }

    /// Number of armed timers
    pub fn armed_timer_count(&self) -> usize {
        self.with_ctx(|ctx| ctx.timers.len()).unwrap_or(0)
    }

    /// Channels this context has joined
    pub fn joined_channels(&self) -> Vec<String> {
        self.with_ctx(|ctx| ctx.channels.clone()).unwrap_or_default()
    }

    /// Raw context storage value (for assertions)
    pub fn context_value(&self, key: &str) -> Option<String> {
        self.with_ctx(|ctx| ctx.session.get(key).cloned()).flatten()
    }

    /// Get all captured debug messages
    pub fn get_debug_log(&self) -> Vec<String> {
        self.with_ctx(|ctx| ctx.debug_log.clone()).unwrap_or_default()
    }

    /// Check if a specific message was logged
    pub fn has_log_containing(&self, substr: &str) -> bool {
        self.with_ctx(|ctx| ctx.debug_log.iter().any(|msg| msg.contains(substr)))
            .unwrap_or(false)
    }

    /// Clear the debug log
    pub fn clear_debug_log(&self) {
        self.with_ctx(|ctx| ctx.debug_log.clear());
    }
}

impl Host for MockHost {
    fn shared_get(&self, key: &str) -> Result<Option<String>, HostError> {
        Ok(self.origin.borrow().shared.get(key).cloned())
    }

    fn shared_set(&self, key: &str, value: &str) -> Result<(), HostError> {
        let mut origin = self.origin.borrow_mut();
        if origin.fail_shared_writes {
            return Err(HostError::QuotaExceeded);
        }
        let previous = origin.shared.insert(key.to_string(), value.to_string());
        // Browsers only raise storage events for actual changes
        if previous.as_deref() != Some(value) {
            origin.notify_storage(Some(self.context), Some(key));
        }
        Ok(())
    }

    fn shared_remove(&self, key: &str) -> Result<(), HostError> {
        let mut origin = self.origin.borrow_mut();
        if origin.shared.remove(key).is_some() {
            origin.notify_storage(Some(self.context), Some(key));
        }
        Ok(())
    }

    fn context_get(&self, key: &str) -> Result<Option<String>, HostError> {
        self.with_ctx(|ctx| ctx.session.get(key).cloned())
            .ok_or(HostError::StorageUnavailable)
    }

    fn context_set(&self, key: &str, value: &str) -> Result<(), HostError> {
        self.with_ctx(|ctx| {
            ctx.session.insert(key.to_string(), value.to_string());
        })
        .ok_or(HostError::StorageUnavailable)
    }

    fn join_channel(&self, channel: &str) -> Result<(), HostError> {
        self.with_ctx(|ctx| {
            if !ctx.channels.iter().any(|c| c == channel) {
                ctx.channels.push(channel.to_string());
            }
        })
        .ok_or(HostError::ChannelUnavailable)
    }

    fn leave_channel(&self, channel: &str) {
        self.with_ctx(|ctx| ctx.channels.retain(|c| c != channel));
    }

    fn broadcast(&self, channel: &str, data: &str) -> Result<(), HostError> {
        let mut origin = self.origin.borrow_mut();
        let joined = origin
            .contexts
            .get(&self.context)
            .map(|ctx| ctx.channels.iter().any(|c| c == channel))
            .unwrap_or(false);
        if !joined {
            return Err(HostError::ChannelUnavailable);
        }
        for (id, ctx) in origin.contexts.iter_mut() {
            if *id == self.context || !ctx.alive || !ctx.channels.iter().any(|c| c == channel) {
                continue;
            }
            ctx.inbox.push_back(HostEvent::Message {
                channel: channel.to_string(),
                data: data.to_string(),
            });
        }
        Ok(())
    }

    fn sample_geometry(&self) -> Result<GeometrySample, HostError> {
        self.with_ctx(|ctx| ctx.geometry).ok_or(HostError::NoWindow)
    }

    fn set_interval(&self, period_ms: u32) -> Result<TimerHandle, HostError> {
        if period_ms == 0 {
            return Err(HostError::InvalidArgument);
        }
        let mut origin = self.origin.borrow_mut();
        let now = origin.time_ms;
        let ctx = origin
            .contexts
            .get_mut(&self.context)
            .ok_or(HostError::TimerUnavailable)?;
        let id = ctx.next_timer;
        ctx.next_timer += 1;
        ctx.timers.insert(
            id,
            MockTimer {
                period_ms,
                next_due: now + u64::from(period_ms),
            },
        );
        Ok(TimerHandle::new(id))
    }

    fn clear_interval(&self, handle: TimerHandle) {
        self.with_ctx(|ctx| ctx.timers.remove(&handle.id()));
    }

    fn wallclock_ms(&self) -> u64 {
        self.origin.borrow().time_ms
    }

    fn random_bytes(&self, buf: &mut [u8]) -> Result<(), HostError> {
        // Simple LCG for deterministic "random" bytes in tests
        let mut origin = self.origin.borrow_mut();
        let mut seed = origin.random_seed;
        for byte in buf.iter_mut() {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            *byte = (seed >> 33) as u8;
        }
        origin.random_seed = seed;
        Ok(())
    }

    fn debug_write(&self, msg: &str) {
        self.with_ctx(|ctx| ctx.debug_log.push(String::from(msg)));
    }

    fn poll_events(&self) -> Vec<HostEvent> {
        self.with_ctx(|ctx| ctx.inbox.drain(..).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_shared_write_notifies_other_contexts_only() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        let b = origin.open_context();
        let c = origin.open_context();

        a.shared_set("k", "1").unwrap();

        assert!(a.poll_events().is_empty());
        let expected = vec![HostEvent::StorageChanged {
            key: Some("k".to_string()),
        }];
        assert_eq!(b.poll_events(), expected);
        assert_eq!(c.poll_events(), expected);
    }

    #[test]
    fn test_unchanged_write_is_silent() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        let b = origin.open_context();

        a.shared_set("k", "same").unwrap();
        b.poll_events();
        a.shared_set("k", "same").unwrap();

        assert!(b.poll_events().is_empty());
    }

    #[test]
    fn test_broadcast_requires_join_and_skips_sender() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        let b = origin.open_context();
        let c = origin.open_context();

        assert_eq!(a.broadcast("ch", "x"), Err(HostError::ChannelUnavailable));

        a.join_channel("ch").unwrap();
        b.join_channel("ch").unwrap();
        a.broadcast("ch", "hello").unwrap();

        assert!(a.poll_events().is_empty());
        assert!(c.poll_events().is_empty());
        assert_eq!(
            b.poll_events(),
            vec![HostEvent::Message {
                channel: "ch".to_string(),
                data: "hello".to_string(),
            }]
        );
    }

    #[test]
    fn test_timers_fire_on_advance() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        let handle = a.set_interval(300).unwrap();

        origin.advance_time(299);
        assert!(a.poll_events().is_empty());

        origin.advance_time(601);
        assert_eq!(
            a.poll_events(),
            vec![HostEvent::Tick(handle), HostEvent::Tick(handle), HostEvent::Tick(handle)]
        );

        a.clear_interval(handle);
        origin.advance_time(1000);
        assert!(a.poll_events().is_empty());
        assert_eq!(a.armed_timer_count(), 0);
    }

    #[test]
    fn test_zero_period_rejected() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        assert_eq!(a.set_interval(0), Err(HostError::InvalidArgument));
    }

    #[test]
    fn test_reload_keeps_context_storage() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        a.context_set("id", "abc").unwrap();
        a.join_channel("ch").unwrap();
        a.set_interval(100).unwrap();

        let reloaded = origin.reload(&a);

        assert_eq!(reloaded.context_id(), a.context_id());
        assert_eq!(reloaded.context_get("id").unwrap().as_deref(), Some("abc"));
        assert!(reloaded.joined_channels().is_empty());
        assert_eq!(reloaded.armed_timer_count(), 0);
    }

    #[test]
    fn test_context_storage_is_private() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        let b = origin.open_context();
        a.context_set("id", "abc").unwrap();
        assert_eq!(b.context_get("id").unwrap(), None);
    }

    #[test]
    fn test_closed_context_receives_nothing() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        let b = origin.open_context();
        origin.close(&b);

        a.shared_set("k", "1").unwrap();

        assert_eq!(b.pending_event_count(), 0);
        assert_eq!(origin.alive_context_count(), 1);
    }

    #[test]
    fn test_foreign_writer_notifies_everyone() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        origin.set_shared_raw("k", "garbage");
        assert_eq!(a.pending_event_count(), 1);
        assert_eq!(origin.shared_value("k").as_deref(), Some("garbage"));
    }

    #[test]
    fn test_fail_shared_writes() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        origin.set_fail_shared_writes(true);
        assert_eq!(a.shared_set("k", "v"), Err(HostError::QuotaExceeded));
        assert_eq!(origin.shared_value("k"), None);
    }

    #[test]
    fn test_random_bytes_deterministic() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        origin.set_random_seed(42);
        let mut buf1 = [0u8; 8];
        a.random_bytes(&mut buf1).unwrap();

        origin.set_random_seed(42);
        let mut buf2 = [0u8; 8];
        a.random_bytes(&mut buf2).unwrap();

        assert_eq!(buf1, buf2);
    }

    #[test]
    fn test_move_keeps_scroll() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        a.scroll_to(0.0, 40.0);
        a.move_to(500.0, 20.0);

        let rect = a.sample_geometry().unwrap().rect;
        assert_eq!(rect.screen_x, 500.0);
        assert_eq!(rect.scroll_y, 40.0);
    }

    #[test]
    fn test_debug_log() {
        let origin = MockOrigin::new();
        let a = origin.open_context();
        a.debug_write("Hello");
        a.debug_write("World");

        assert_eq!(a.get_debug_log().len(), 2);
        assert!(a.has_log_containing("Hello"));
        assert!(!a.has_log_containing("Foo"));

        a.clear_debug_log();
        assert!(a.get_debug_log().is_empty());
    }
}
