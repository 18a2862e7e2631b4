//! Geometry tracker
//!
//! Browsers raise `resize` but have no "moved" event, so the tracker also
//! samples on a fixed-interval timer and compares against the last rect.

use winsync_hal::{GeometrySample, Host, HostError, TimerHandle, WindowRect};

/// Default geometry poll period in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 300;

/// Poll timer state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerState {
    Disarmed,
    Armed(TimerHandle),
}

/// Tracks this context's rect and owns the poll timer
#[derive(Debug)]
pub struct RectTracker {
    last: WindowRect,
    period_ms: u32,
    timer: TimerState,
}

impl RectTracker {
    /// Create a disarmed tracker starting from a known rect
    pub fn new(initial: WindowRect, period_ms: u32) -> Self {
        Self {
            last: initial,
            period_ms,
            timer: TimerState::Disarmed,
        }
    }

    /// Last rect seen
    pub fn last_rect(&self) -> WindowRect {
        self.last
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.timer, TimerState::Armed(_))
    }

    /// Whether a tick came from this tracker's timer
    pub fn owns(&self, handle: TimerHandle) -> bool {
        self.timer == TimerState::Armed(handle)
    }

    /// Start the poll timer (no-op if already armed)
    pub fn arm<H: Host>(&mut self, host: &H) -> Result<(), HostError> {
        if self.is_armed() {
            return Ok(());
        }
        let handle = host.set_interval(self.period_ms)?;
        self.timer = TimerState::Armed(handle);
        Ok(())
    }

    /// Cancel the poll timer
    ///
    /// Returns `true` if a timer was cancelled. Later calls return `false`
    /// and never touch the host.
    pub fn disarm<H: Host>(&mut self, host: &H) -> bool {
        match self.timer {
            TimerState::Armed(handle) => {
                host.clear_interval(handle);
                self.timer = TimerState::Disarmed;
                true
            }
            TimerState::Disarmed => false,
        }
    }

    /// Sample geometry and report it if any tracked field changed
    pub fn check<H: Host>(&mut self, host: &H) -> Option<GeometrySample> {
        let sample = match host.sample_geometry() {
            Ok(sample) => sample,
            Err(e) => {
                host.debug_write(&format!("[winsync] geometry sample failed: {}", e));
                return None;
            }
        };
        if sample.rect == self.last {
            return None;
        }
        self.last = sample.rect;
        Some(sample)
    }
}
