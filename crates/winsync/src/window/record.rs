//! Window record type

use serde::{Deserialize, Serialize};
use winsync_hal::{GeometrySample, ScreenInfo, WindowRect};

/// Unique context identifier (time-salted random string)
pub type WindowId = String;

/// One browsing context and its last known geometry
///
/// Serialized with camelCase keys, the same shape every context of the
/// origin reads from shared storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRecord {
    pub id: WindowId,
    pub screen_top: f64,
    pub screen_left: f64,
    pub screen_x: f64,
    pub screen_y: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub screen_info: ScreenInfo,
}

impl WindowRecord {
    /// Create a record from a geometry reading
    pub fn new(id: impl Into<WindowId>, sample: GeometrySample) -> Self {
        let mut record = Self {
            id: id.into(),
            screen_top: 0.0,
            screen_left: 0.0,
            screen_x: 0.0,
            screen_y: 0.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
            screen_info: sample.screen,
        };
        record.apply(sample);
        record
    }

    /// Position and scroll as a rect
    pub fn rect(&self) -> WindowRect {
        WindowRect {
            screen_top: self.screen_top,
            screen_left: self.screen_left,
            screen_x: self.screen_x,
            screen_y: self.screen_y,
            scroll_x: self.scroll_x,
            scroll_y: self.scroll_y,
        }
    }

    /// Overwrite geometry with a new reading (the id never changes)
    pub fn apply(&mut self, sample: GeometrySample) {
        let rect = sample.rect;
        self.screen_top = rect.screen_top;
        self.screen_left = rect.screen_left;
        self.screen_x = rect.screen_x;
        self.screen_y = rect.screen_y;
        self.scroll_x = rect.scroll_x;
        self.scroll_y = rect.scroll_y;
        self.screen_info = sample.screen;
    }
}
