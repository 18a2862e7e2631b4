//! Per-context identity
//!
//! The record lives in context storage under the registry key, so a reload
//! of the same tab keeps its id while a new tab gets a fresh one.

use winsync_hal::Host;

use crate::error::SyncError;
use crate::window::{WindowId, WindowRecord};

/// Load this context's record, or create and persist a new one
///
/// An unreadable stored record is replaced. A failure to persist the new
/// record is logged and the record is still returned; it only costs a new
/// id on the next reload.
pub fn load_identity<H: Host>(host: &H, key: &str) -> Result<WindowRecord, SyncError> {
    match host.context_get(key) {
        Ok(Some(json)) => match serde_json::from_str::<WindowRecord>(&json) {
            Ok(record) => {
                host.debug_write(&format!("[winsync] restored identity {}", record.id));
                return Ok(record);
            }
            Err(e) => {
                host.debug_write(&format!("[winsync] discarding unreadable identity: {}", e));
            }
        },
        Ok(None) => {}
        Err(e) => {
            host.debug_write(&format!("[winsync] context storage read failed: {}", e));
        }
    }

    let sample = host.sample_geometry()?;
    let record = WindowRecord::new(generate_window_id(host)?, sample);
    if let Err(e) = save_identity(host, key, &record) {
        host.debug_write(&format!("[winsync] failed to persist identity: {}", e));
    }
    host.debug_write(&format!("[winsync] created identity {}", record.id));
    Ok(record)
}

/// Persist this context's record to context storage
pub fn save_identity<H: Host>(host: &H, key: &str, record: &WindowRecord) -> Result<(), SyncError> {
    let json = serde_json::to_string(record)?;
    host.context_set(key, &json)?;
    Ok(())
}

/// Generate a time-salted random window ID
///
/// Format: `<wall-clock ms in base 36>-<uuid v4, simple form>`.
pub fn generate_window_id<H: Host>(host: &H) -> Result<WindowId, SyncError> {
    let mut bytes = [0u8; 16];
    host.random_bytes(&mut bytes)?;
    let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
    Ok(format!("{}-{}", to_base36(host.wallclock_ms()), uuid.simple()))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
