//! Draw-primitive data model shared between the layer core and renderers.
//!
//! A layer's quad assembly emits an ordered list of typed draw primitives
//! into a `RenderPass`; the renderer binding that consumes them is out of
//! scope here.

use geometry::{Rect, RectF, Size};
use smallvec::SmallVec;

slotmap::new_key_type! {
    /// Handle into an externally owned resource pool (texture storage).
    pub struct ResourceId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_opaque(self) -> bool {
        self.a == 255
    }
}

/// State shared by every quad a single layer emits in one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharedQuadState {
    /// Scale from the quads' coverage space back to target space.
    pub content_to_target_scale: f32,
    pub visible_rect: Rect,
    pub opacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadMaterial {
    Texture {
        resource: ResourceId,
        texture_rect: RectF,
        texture_size: Size,
        swizzle: bool,
    },
    SolidColor {
        color: Color,
    },
    Checkerboard {
        color: Color,
    },
    /// Deferred raster: the renderer rasterizes the recording on demand.
    Picture {
        content_rect: Rect,
        contents_scale: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawQuad {
    pub shared_quad_state_index: usize,
    pub geometry_rect: Rect,
    pub visible_geometry_rect: Rect,
    pub material: QuadMaterial,
}

/// Ordered quad sink for one frame's output.
#[derive(Debug, Default)]
pub struct RenderPass {
    shared_quad_states: SmallVec<[SharedQuadState; 4]>,
    quads: Vec<DrawQuad>,
}

impl RenderPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_shared_quad_state(&mut self, state: SharedQuadState) -> usize {
        self.shared_quad_states.push(state);
        self.shared_quad_states.len() - 1
    }

    pub fn append_quad(&mut self, quad: DrawQuad) {
        assert!(
            quad.shared_quad_state_index < self.shared_quad_states.len(),
            "quad references a shared quad state that has not been appended"
        );
        self.quads.push(quad);
    }

    pub fn shared_quad_states(&self) -> &[SharedQuadState] {
        &self.shared_quad_states
    }

    pub fn quads(&self) -> &[DrawQuad] {
        &self.quads
    }
}

/// Aggregate completeness statistics for one quad-assembly walk. An external
/// quality-of-service consumer reads these to decide whether the current
/// scale is still acceptable.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AppendQuadsData {
    pub num_missing_tiles: u64,
    pub num_incomplete_tiles: u64,
    pub visible_content_area: i64,
    pub approximated_visible_content_area: i64,
    pub had_incomplete_tile: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_quad_requires_shared_state() {
        let mut pass = RenderPass::new();
        let state_index = pass.append_shared_quad_state(SharedQuadState {
            content_to_target_scale: 1.0,
            visible_rect: Rect::new(0, 0, 100, 100),
            opacity: 1.0,
        });
        pass.append_quad(DrawQuad {
            shared_quad_state_index: state_index,
            geometry_rect: Rect::new(0, 0, 50, 50),
            visible_geometry_rect: Rect::new(0, 0, 50, 50),
            material: QuadMaterial::SolidColor {
                color: Color::WHITE,
            },
        });
        assert_eq!(pass.quads().len(), 1);
        assert_eq!(pass.shared_quad_states().len(), 1);
    }

    #[test]
    #[should_panic(expected = "shared quad state")]
    fn append_quad_panics_without_shared_state() {
        let mut pass = RenderPass::new();
        pass.append_quad(DrawQuad {
            shared_quad_state_index: 0,
            geometry_rect: Rect::new(0, 0, 1, 1),
            visible_geometry_rect: Rect::new(0, 0, 1, 1),
            material: QuadMaterial::Checkerboard {
                color: Color::WHITE,
            },
        });
    }
}
