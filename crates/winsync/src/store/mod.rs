//! Persistence: per-context identity and the shared registry

mod identity;
mod registry;

pub use identity::{generate_window_id, load_identity, save_identity};
pub use registry::RegistryStore;
