//! Tile model: content states, priorities, and the tile record itself.

use std::cmp::Ordering;

use draw_protocol::{Color, ResourceId};
use geometry::Rect;

/// Grid coordinate of a tile within its tiling. Ordered by row, then column,
/// so map iteration follows scanline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileIndex {
    pub i: i32,
    pub j: i32,
}

impl TileIndex {
    pub const fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }
}

impl Ord for TileIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.j, self.i).cmp(&(other.j, other.i))
    }
}

impl PartialOrd for TileIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Coarse bucket for how well a tiling's scale matches the ideal scale.
/// At most one tiling per set is `High` and at most one is `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileResolution {
    High,
    Low,
    NonIdeal,
}

/// Urgency bin: `Now` is visible, `Soon` is inside the skewport, and
/// `Eventually` is the rest of the interest area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityBin {
    Now,
    Soon,
    Eventually,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePriority {
    pub resolution: TileResolution,
    pub bin: PriorityBin,
    pub distance_to_visible: f32,
}

impl TilePriority {
    /// The priority consumers must assume for layers whose priorities are
    /// invalid (culled layers, layers with no tilings).
    pub fn lowest() -> Self {
        Self {
            resolution: TileResolution::NonIdeal,
            bin: PriorityBin::Eventually,
            distance_to_visible: f32::INFINITY,
        }
    }
}

impl Default for TilePriority {
    fn default() -> Self {
        Self::lowest()
    }
}

/// Exactly one representation is active per tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TileContent {
    /// No pixels yet; raster work is outstanding.
    Unavailable,
    /// The whole tile is a single color; no resource is held.
    SolidColor(Color),
    /// Pixel data lives in an external resource.
    Resource {
        id: ResourceId,
        swizzle: bool,
        is_opaque: bool,
    },
}

impl TileContent {
    pub fn is_ready_to_draw(&self) -> bool {
        !matches!(self, TileContent::Unavailable)
    }

    pub fn holds_resource(&self) -> bool {
        matches!(self, TileContent::Resource { .. })
    }
}

/// One rectangular unit of rasterized (or about-to-be-rasterized) content at
/// one contents scale. Owned by exactly one `Tiling`; immutable apart from
/// priority updates, the required-for-activation flag, and the asynchronous
/// content write.
#[derive(Debug, Clone)]
pub struct Tile {
    index: TileIndex,
    content_rect: Rect,
    contents_scale: f32,
    opaque_rect: Rect,
    priority: TilePriority,
    required_for_activation: bool,
    content: TileContent,
    content_key: u64,
    source_frame_number: u64,
}

impl Tile {
    pub(crate) fn new(
        index: TileIndex,
        content_rect: Rect,
        contents_scale: f32,
        opaque_rect: Rect,
        content: TileContent,
        content_key: u64,
        source_frame_number: u64,
    ) -> Self {
        Self {
            index,
            content_rect,
            contents_scale,
            opaque_rect,
            priority: TilePriority::lowest(),
            required_for_activation: false,
            content,
            content_key,
            source_frame_number,
        }
    }

    pub fn index(&self) -> TileIndex {
        self.index
    }

    pub fn content_rect(&self) -> Rect {
        self.content_rect
    }

    pub fn contents_scale(&self) -> f32 {
        self.contents_scale
    }

    pub fn opaque_rect(&self) -> Rect {
        self.opaque_rect
    }

    pub fn priority(&self) -> TilePriority {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: TilePriority) {
        self.priority = priority;
    }

    pub fn required_for_activation(&self) -> bool {
        self.required_for_activation
    }

    pub fn mark_required_for_activation(&mut self) {
        self.required_for_activation = true;
    }

    pub fn clear_required_for_activation(&mut self) {
        self.required_for_activation = false;
    }

    pub fn content(&self) -> &TileContent {
        &self.content
    }

    /// Written once per raster task by the worker pool.
    pub fn set_content(&mut self, content: TileContent) {
        self.content = content;
    }

    /// Releases a resource-backed representation, returning the resource so
    /// the caller can return it to its pool.
    pub fn take_resource(&mut self) -> Option<ResourceId> {
        if let TileContent::Resource { id, .. } = self.content {
            self.content = TileContent::Unavailable;
            return Some(id);
        }
        None
    }

    pub fn is_ready_to_draw(&self) -> bool {
        self.content.is_ready_to_draw()
    }

    pub fn needs_raster(&self) -> bool {
        !self.content.is_ready_to_draw()
    }

    /// Identity of the recorded content this tile was created from. Two tiles
    /// with equal keys hold (or will hold) identical pixels; a pending-tree
    /// tile mirrored from its active twin inherits the twin's key.
    pub fn content_key(&self) -> u64 {
        self.content_key
    }

    pub fn source_frame_number(&self) -> u64 {
        self.source_frame_number
    }
}
