//! Window records and geometry tracking
//!
//! Provides the per-context `WindowRecord` and the `RectTracker` that
//! detects moves by polling.

mod record;
mod tracker;

pub use record::{WindowId, WindowRecord};
pub use tracker::{RectTracker, DEFAULT_POLL_INTERVAL_MS};
