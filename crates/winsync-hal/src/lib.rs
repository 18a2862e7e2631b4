//! Host Abstraction Layer trait for winsync
//!
//! This crate defines the `Host` trait that lets the synchronization engine
//! run on different platforms (browser, simulated origin for tests) by
//! abstracting every capability a browsing context offers the engine.
//!
//! # Platform Implementations
//!
//! - **Browser**: `localStorage` for the shared registry, `sessionStorage` for
//!   the per-context identity, `BroadcastChannel` for messages, `setInterval`
//!   for the geometry poll, `crypto.getRandomValues()` for entropy
//! - **Mock**: an in-memory origin shared by several simulated contexts

#![no_std]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

/// Host trait
///
/// Implementations provide platform-specific functionality for:
/// - Shared storage (visible to every context of the origin)
/// - Context storage (scoped to one context, survives a reload)
/// - Broadcast channels
/// - Geometry sampling
/// - Interval timers
/// - Time and entropy
/// - Debug output
/// - Inbound event polling
///
/// All methods take `&self`; the engine runs on a single-threaded event
/// loop and implementations use interior mutability where they need it.
pub trait Host: 'static {
    // === Shared Storage ===

    /// Read a value from origin-wide storage
    ///
    /// # Returns
    /// * `Ok(Some(value))` - Key is present
    /// * `Ok(None)` - Key is absent
    /// * `Err(HostError::StorageUnavailable)` - Storage cannot be reached
    fn shared_get(&self, key: &str) -> Result<Option<String>, HostError>;

    /// Write a value to origin-wide storage
    ///
    /// A write that changes the stored value raises
    /// `HostEvent::StorageChanged` in every *other* context of the origin,
    /// never in the writer.
    ///
    /// # Returns
    /// * `Ok(())` - Value stored
    /// * `Err(HostError::QuotaExceeded)` - Storage is full
    /// * `Err(HostError::StorageUnavailable)` - Storage cannot be reached
    fn shared_set(&self, key: &str, value: &str) -> Result<(), HostError>;

    /// Remove a key from origin-wide storage
    fn shared_remove(&self, key: &str) -> Result<(), HostError>;

    // === Context Storage ===

    /// Read a value from storage scoped to this context
    fn context_get(&self, key: &str) -> Result<Option<String>, HostError>;

    /// Write a value to storage scoped to this context
    ///
    /// The value outlives a reload of the same context but is never visible
    /// to other contexts.
    fn context_set(&self, key: &str, value: &str) -> Result<(), HostError>;

    // === Broadcast ===

    /// Join a broadcast channel
    ///
    /// After joining, messages other contexts post to `channel` arrive as
    /// `HostEvent::Message`. Joining twice is a no-op.
    fn join_channel(&self, channel: &str) -> Result<(), HostError>;

    /// Leave a broadcast channel (no-op if not joined)
    fn leave_channel(&self, channel: &str);

    /// Post a message to every other context that joined `channel`
    ///
    /// Delivery is asynchronous, never loops back to the sender, and is not
    /// persisted.
    fn broadcast(&self, channel: &str, data: &str) -> Result<(), HostError>;

    // === Geometry ===

    /// Sample the current on-screen position, scroll offsets and screen
    fn sample_geometry(&self) -> Result<GeometrySample, HostError>;

    // === Timers ===

    /// Arm a periodic timer
    ///
    /// Every `period_ms` the host raises `HostEvent::Tick` carrying the
    /// returned handle until the timer is cleared.
    fn set_interval(&self, period_ms: u32) -> Result<TimerHandle, HostError>;

    /// Cancel a periodic timer (no-op for unknown handles)
    fn clear_interval(&self, handle: TimerHandle);

    // === Time & Entropy ===

    /// Get wall-clock time in milliseconds since Unix epoch
    ///
    /// On the browser: `Date.now()`
    fn wallclock_ms(&self) -> u64;

    /// Fill buffer with random bytes
    ///
    /// # Returns
    /// * `Ok(())` - Buffer filled successfully
    /// * `Err(HostError::NotSupported)` - Entropy source not available
    fn random_bytes(&self, buf: &mut [u8]) -> Result<(), HostError>;

    // === Debug ===

    /// Write a debug message to the platform's console/log
    ///
    /// On the browser: `console.log()`
    fn debug_write(&self, msg: &str);

    // === Event Reception ===

    /// Drain inbound events (non-blocking), oldest first
    fn poll_events(&self) -> Vec<HostEvent>;
}

/// Host errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostError {
    /// No window object (not running in a browsing context)
    NoWindow,
    /// Storage area missing or access denied
    StorageUnavailable,
    /// Storage write rejected because the area is full
    QuotaExceeded,
    /// Broadcast channel could not be opened or is closed
    ChannelUnavailable,
    /// Timer could not be armed
    TimerUnavailable,
    /// Operation not supported on this platform
    NotSupported,
    /// Invalid argument
    InvalidArgument,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            HostError::NoWindow => "no window object",
            HostError::StorageUnavailable => "storage unavailable",
            HostError::QuotaExceeded => "storage quota exceeded",
            HostError::ChannelUnavailable => "broadcast channel unavailable",
            HostError::TimerUnavailable => "timer unavailable",
            HostError::NotSupported => "operation not supported",
            HostError::InvalidArgument => "invalid argument",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for HostError {}

/// Inbound events delivered by the host, in arrival order
#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    /// Another context changed shared storage
    ///
    /// `key` is `None` when the whole storage area was cleared.
    StorageChanged { key: Option<String> },
    /// Another context posted to a joined channel
    Message { channel: String, data: String },
    /// This context gained focus
    Focus,
    /// This context was resized
    Resize,
    /// A periodic timer fired
    Tick(TimerHandle),
    /// This context is about to unload
    Unload,
}

/// Handle to an armed periodic timer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u32);

impl TimerHandle {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u32 {
        self.0
    }
}

/// Position and scroll offsets of a context
///
/// Compared field by field to detect moves; the host offers no native
/// "moved" event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRect {
    pub screen_top: f64,
    pub screen_left: f64,
    pub screen_x: f64,
    pub screen_y: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl WindowRect {
    /// Rect at a screen position with no scroll
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            screen_top: y,
            screen_left: x,
            screen_x: x,
            screen_y: y,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }

    /// Same rect with different scroll offsets
    pub fn scrolled(self, scroll_x: f64, scroll_y: f64) -> Self {
        Self {
            scroll_x,
            scroll_y,
            ..self
        }
    }
}

/// Description of the screen a context is displayed on
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    pub width: f64,
    pub height: f64,
    pub avail_width: f64,
    pub avail_height: f64,
    pub avail_top: f64,
    pub avail_left: f64,
    pub color_depth: f64,
    pub pixel_depth: f64,
}

impl ScreenInfo {
    /// Screen with the given size, fully available, 24-bit color
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            avail_width: width,
            avail_height: height,
            avail_top: 0.0,
            avail_left: 0.0,
            color_depth: 24.0,
            pixel_depth: 24.0,
        }
    }
}

/// One geometry reading
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GeometrySample {
    pub rect: WindowRect,
    pub screen: ScreenInfo,
}

impl GeometrySample {
    pub fn new(rect: WindowRect, screen: ScreenInfo) -> Self {
        Self { rect, screen }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_at_mirrors_screen_aliases() {
        let rect = WindowRect::at(120.0, 40.0);
        assert_eq!(rect.screen_x, rect.screen_left);
        assert_eq!(rect.screen_y, rect.screen_top);
        assert_eq!(rect.scroll_x, 0.0);
    }

    #[test]
    fn test_rect_scroll_is_a_difference() {
        let rect = WindowRect::at(0.0, 0.0);
        assert_ne!(rect, rect.scrolled(0.0, 15.0));
    }

    #[test]
    fn test_rect_json_uses_camel_case() {
        let json = serde_json::to_string(&WindowRect::at(1.0, 2.0)).unwrap();
        assert!(json.contains("\"screenTop\""));
        assert!(json.contains("\"scrollX\""));
        assert!(!json.contains("screen_top"));
    }

    #[test]
    fn test_screen_info_json_field_names() {
        let json = serde_json::to_string(&ScreenInfo::new(1920.0, 1080.0)).unwrap();
        assert!(json.contains("\"availWidth\""));
        assert!(json.contains("\"pixelDepth\""));
    }

    #[test]
    fn test_host_error_display() {
        assert_eq!(
            alloc::format!("{}", HostError::QuotaExceeded),
            "storage quota exceeded"
        );
    }
}
