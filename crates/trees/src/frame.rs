//! Frame timing and per-frame tree inputs.

use geometry::Size;
use layer::UpdateContext;

/// Monotonic frame clock. Priority updates use the tick timestamps to
/// extrapolate visible-rect motion.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    now_seconds: f64,
    interval_seconds: f64,
}

impl FrameClock {
    pub fn new(interval_seconds: f64) -> Self {
        assert!(
            interval_seconds > 0.0,
            "frame interval must be positive, got {interval_seconds}"
        );
        Self {
            now_seconds: 0.0,
            interval_seconds,
        }
    }

    pub fn now_seconds(&self) -> f64 {
        self.now_seconds
    }

    pub fn interval_seconds(&self) -> f64 {
        self.interval_seconds
    }

    /// Advances to the next frame and returns its timestamp.
    pub fn tick(&mut self) -> f64 {
        self.now_seconds += self.interval_seconds;
        self.now_seconds
    }
}

/// Tree-wide inputs for one update of either tree. Per-layer inputs live on
/// each layer's `DrawProperties`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub page_scale_factor: f32,
    pub device_scale_factor: f32,
    pub device_viewport: Size,
    pub pinch_gesture_active: bool,
    pub frame_time_seconds: f64,
}

impl FrameInputs {
    pub(crate) fn update_context(&self) -> UpdateContext {
        UpdateContext {
            page_scale_factor: self.page_scale_factor,
            device_scale_factor: self.device_scale_factor,
            device_viewport: self.device_viewport,
            pinch_gesture_active: self.pinch_gesture_active,
            frame_time_seconds: self.frame_time_seconds,
        }
    }
}
