//! Browser host
//!
//! `Host` implementation over `web-sys`: `localStorage` for the shared
//! registry, `sessionStorage` for the identity, `BroadcastChannel` for
//! messages and `setInterval` for the geometry poll.

use wasm_bindgen::prelude::*;

mod host;

pub use host::WebHost;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    pub(crate) fn log(s: &str);
}
