//! Reconciliation of registry snapshots
//!
//! Turns "the shared registry changed" into the semantic changes listeners
//! care about. Output order is fixed:
//!
//! 1. new windows (in `next` order)
//! 2. removed windows (in `previous` order)
//! 3. updated windows (in `next` order)
//! 4. active window change
//! 5. meta change
//!
//! The trailing state-changed notification is emitted by the manager after
//! it has applied `next` to its mirror.

use serde::Serialize;

use crate::state::SharedState;
use crate::window::WindowRecord;

/// One semantic difference between two snapshots
#[derive(Clone, Debug)]
pub enum Change<M> {
    NewWindow(WindowRecord),
    RemovedWindow(WindowRecord),
    /// Carries the `next` version of the record
    UpdatedWindow(WindowRecord),
    /// Carries the `next` active window (`None` when cleared)
    ActiveWindowChanged(Option<WindowRecord>),
    MetaChanged(M),
}

/// Compute the changes between `previous` and `next`
///
/// Windows are matched by id. Records and meta are compared as whole
/// serialized values; there is no field-level diffing.
pub fn reconcile<M>(previous: &SharedState<M>, next: &SharedState<M>) -> Vec<Change<M>>
where
    M: Serialize + Clone,
{
    let mut changes = Vec::new();

    for window in &next.windows {
        if !previous.contains(&window.id) {
            changes.push(Change::NewWindow(window.clone()));
        }
    }

    for window in &previous.windows {
        if !next.contains(&window.id) {
            changes.push(Change::RemovedWindow(window.clone()));
        }
    }

    for window in &next.windows {
        if let Some(old) = previous.find(&window.id) {
            if !same_value(old, window) {
                changes.push(Change::UpdatedWindow(window.clone()));
            }
        }
    }

    if previous.active_id() != next.active_id() {
        changes.push(Change::ActiveWindowChanged(next.active_window.clone()));
    }

    if !same_value(&previous.meta, &next.meta) {
        changes.push(Change::MetaChanged(next.meta.clone()));
    }

    changes
}

/// Deep structural equality through the JSON data model
///
/// Object key order does not matter. Values that fail to serialize are
/// treated as different from everything, so a change is never swallowed.
pub(crate) fn same_value<T: Serialize + ?Sized>(a: &T, b: &T) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use winsync_hal::{GeometrySample, ScreenInfo, WindowRect};

    fn window(id: &str, x: f64) -> WindowRecord {
        WindowRecord::new(
            id,
            GeometrySample::new(WindowRect::at(x, 0.0), ScreenInfo::new(1920.0, 1080.0)),
        )
    }

    fn state(windows: &[WindowRecord], active: Option<&WindowRecord>, meta: Value) -> SharedState<Value> {
        SharedState {
            active_window: active.cloned(),
            windows: windows.to_vec(),
            meta,
        }
    }

    fn describe(changes: &[Change<Value>]) -> Vec<String> {
        changes
            .iter()
            .map(|c| match c {
                Change::NewWindow(w) => format!("new:{}", w.id),
                Change::RemovedWindow(w) => format!("removed:{}", w.id),
                Change::UpdatedWindow(w) => format!("updated:{}", w.id),
                Change::ActiveWindowChanged(w) => format!(
                    "active:{}",
                    w.as_ref().map(|w| w.id.as_str()).unwrap_or("none")
                ),
                Change::MetaChanged(m) => format!("meta:{}", m),
            })
            .collect()
    }

    #[test]
    fn test_identical_snapshots_yield_nothing() {
        let a = window("a", 0.0);
        let s = state(&[a.clone()], Some(&a), json!({"n": 1}));
        assert!(reconcile(&s, &s.clone()).is_empty());
    }

    #[test]
    fn test_window_swap_and_focus_move() {
        let (a, b, c) = (window("a", 0.0), window("b", 100.0), window("c", 200.0));
        let m1 = json!({"level": 1});
        let previous = state(&[a.clone(), b.clone()], Some(&a), m1.clone());
        let next = state(&[b, c.clone()], Some(&c), m1);

        let changes = reconcile(&previous, &next);

        assert_eq!(describe(&changes), vec!["new:c", "removed:a", "active:c"]);
    }

    #[test]
    fn test_geometry_change_is_update_with_next_version() {
        let previous = state(&[window("a", 0.0)], None, Value::Null);
        let next = state(&[window("a", 75.0)], None, Value::Null);

        let changes = reconcile(&previous, &next);

        assert_eq!(describe(&changes), vec!["updated:a"]);
        match &changes[0] {
            Change::UpdatedWindow(w) => assert_eq!(w.screen_x, 75.0),
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn test_screen_info_change_is_update() {
        let mut moved = window("a", 0.0);
        moved.screen_info.avail_height = 900.0;
        let previous = state(&[window("a", 0.0)], None, Value::Null);
        let next = state(&[moved], None, Value::Null);

        assert_eq!(describe(&reconcile(&previous, &next)), vec!["updated:a"]);
    }

    #[test]
    fn test_active_compared_by_id_only() {
        let a = window("a", 0.0);
        let stale_a = window("a", 999.0);
        let previous = state(&[a.clone()], Some(&stale_a), Value::Null);
        let next = state(&[a.clone()], Some(&a), Value::Null);

        assert!(reconcile(&previous, &next).is_empty());
    }

    #[test]
    fn test_active_cleared() {
        let a = window("a", 0.0);
        let previous = state(&[a.clone()], Some(&a), Value::Null);
        let next = state(&[a], None, Value::Null);

        assert_eq!(describe(&reconcile(&previous, &next)), vec!["active:none"]);
    }

    #[test]
    fn test_meta_deep_equality_ignores_key_order() {
        let previous = state(&[], None, json!({"a": 1, "b": [1, 2, {"c": true}]}));
        let next: SharedState<Value> = SharedState {
            meta: serde_json::from_str(r#"{"b":[1,2,{"c":true}],"a":1}"#).unwrap(),
            ..previous.clone()
        };
        assert!(reconcile(&previous, &next).is_empty());
    }

    #[test]
    fn test_nested_meta_change_is_whole_replacement() {
        let previous = state(&[], None, json!({"a": {"deep": [1, 2]}}));
        let next = state(&[], None, json!({"a": {"deep": [1, 3]}}));

        let changes = reconcile(&previous, &next);

        assert_eq!(describe(&changes), vec![r#"meta:{"a":{"deep":[1,3]}}"#]);
    }

    #[test]
    fn test_full_order() {
        let (a, b, c) = (window("a", 0.0), window("b", 0.0), window("c", 0.0));
        let moved_b = window("b", 10.0);
        let previous = state(&[a.clone(), b], Some(&a), json!(1));
        let next = state(&[moved_b.clone(), c], Some(&moved_b), json!(2));

        assert_eq!(
            describe(&reconcile(&previous, &next)),
            vec!["new:c", "removed:a", "updated:b", "active:b", "meta:2"]
        );
    }

    #[test]
    fn test_same_value_typed_meta() {
        #[derive(Clone, Serialize)]
        struct Meta {
            count: u32,
        }
        assert!(same_value(&Meta { count: 1 }, &Meta { count: 1 }));
        assert!(!same_value(&Meta { count: 1 }, &Meta { count: 2 }));
    }
}
