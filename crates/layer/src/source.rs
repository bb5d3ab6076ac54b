//! Seams to the recording and occlusion collaborators.

use draw_protocol::Color;
use geometry::Rect;

/// The layer's recorded content. Rasterization itself happens behind this
/// seam (worker pool or on-demand renderer path); the layer only asks what
/// the recording can service.
pub trait RasterSource {
    fn has_recordings(&self) -> bool;

    /// Whether the recording can produce pixels for `content_rect` at
    /// `contents_scale`. Tile creation is refused where this is false.
    fn can_raster(&self, contents_scale: f32, content_rect: Rect) -> bool;

    /// Single color covering `content_rect`, when the recording is known to
    /// be flat there. Such tiles skip rasterization entirely.
    fn is_solid_color(&self, contents_scale: f32, content_rect: Rect) -> Option<Color>;
}

/// Screen-area occlusion, tracked by the frame assembler.
pub trait Occlusion {
    fn unoccluded_content_rect(&self, content_rect: Rect) -> Rect;
}

/// Occlusion tracker that occludes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOcclusion;

impl Occlusion for NoOcclusion {
    fn unoccluded_content_rect(&self, content_rect: Rect) -> Rect {
        content_rect
    }
}
