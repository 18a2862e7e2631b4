//! Cross-context window synchronization
//!
//! Lets independent same-origin browsing contexts (tabs, windows, popups)
//! discover each other, share a small piece of mutable state ("meta"),
//! track which context has focus and exchange ad-hoc messages, without a
//! server.
//!
//! ## Architecture
//!
//! - [`window`]: Window records and the geometry tracker
//! - [`state`]: The shared registry snapshot
//! - [`store`]: Per-context identity and the shared registry store
//! - [`bus`]: Message envelopes over a broadcast channel
//! - [`reconcile`]: Snapshot diffing into ordered change events
//! - [`listener`]: Per-category subscriber lists
//! - [`manager`]: The per-context engine tying it together
//!
//! Every platform capability goes through the [`Host`] trait, so the
//! engine runs unchanged against the browser (`wasm` feature) or the
//! simulated origin in `winsync-hal-mock`.
//!
//! ## Example
//!
//! ```rust
//! use winsync::{ManagerConfig, WindowManager};
//! use winsync_hal_mock::MockOrigin;
//!
//! let origin = MockOrigin::new();
//! let mut a: WindowManager<_> =
//!     WindowManager::start(origin.open_context(), ManagerConfig::default()).unwrap();
//! let mut b: WindowManager<_> =
//!     WindowManager::start(origin.open_context(), ManagerConfig::default()).unwrap();
//!
//! b.update_meta(serde_json::json!({"level": 2}));
//! a.pump();
//!
//! assert_eq!(a.get_current_state().meta["level"], 2);
//! assert_eq!(a.get_current_state().windows.len(), 2);
//! ```

pub mod bus;
pub mod listener;
pub mod reconcile;
pub mod state;
pub mod store;
pub mod window;

mod config;
mod error;
mod manager;

// Browser host (only available with "wasm" feature)
#[cfg(feature = "wasm")]
pub mod web;

// WASM exports (only available with "wasm" feature)
#[cfg(feature = "wasm")]
mod wasm;
#[cfg(feature = "wasm")]
pub use wasm::*;

// Re-export core types for convenience
pub use bus::{Envelope, MessageBus};
pub use config::{ManagerConfig, DEFAULT_KEY};
pub use error::SyncError;
pub use listener::{Category, ListenerFault, Listeners, Subscription};
pub use manager::{Lifecycle, Payload, WindowManager};
pub use reconcile::{reconcile, Change};
pub use state::{CurrentState, SharedState};
pub use store::RegistryStore;
pub use window::{RectTracker, WindowId, WindowRecord, DEFAULT_POLL_INTERVAL_MS};

pub use winsync_hal::{GeometrySample, Host, HostError, HostEvent, ScreenInfo, TimerHandle, WindowRect};
