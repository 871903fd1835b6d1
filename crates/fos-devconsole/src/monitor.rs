//! System monitor
//!
//! Frame-rate sampling for the system tab.

use crate::store::Store;

/// Sampling window in milliseconds
pub const SAMPLE_WINDOW_MS: f64 = 1000.0;

/// Frame counter that publishes frames-per-window to the store
#[derive(Debug, Default)]
pub struct FrameMonitor {
    last_sample: Option<f64>,
    frames: u32,
}

impl FrameMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame. Once a full window has elapsed the count is
    /// published through [`Store::set_fps`] and the window restarts.
    ///
    /// Returns the published value, if any.
    pub fn tick(&mut self, now_ms: f64, store: &Store) -> Option<u32> {
        let last = *self.last_sample.get_or_insert(now_ms);
        self.frames += 1;

        if now_ms < last + SAMPLE_WINDOW_MS {
            return None;
        }
        let fps = self.frames;
        self.frames = 0;
        self.last_sample = Some(now_ms);
        store.set_fps(fps);
        Some(fps)
    }

    /// Frames counted in the current window
    pub fn pending_frames(&self) -> u32 {
        self.frames
    }
}
