//! Quad assembly: one draw primitive per visible sub-rectangle, best
//! available representation per cell.

use draw_protocol::{
    AppendQuadsData, Color, DrawQuad, QuadMaterial, RenderPass, SharedQuadState,
};
use geometry::enclosing_scaled_rect;
use tiling::{TileContent, TileResolution};

use crate::layer::PictureLayer;
use crate::source::Occlusion;

/// Placeholder pattern color for missing tiles when checkerboarding is on.
const CHECKERBOARD_COLOR: Color = Color::rgba(204, 204, 204, 255);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Hardware,
    /// No resources available at all; the renderer rasterizes the whole
    /// visible recording on demand.
    ResourcelessSoftware,
}

impl PictureLayer {
    /// Walks the visible rect once at the maximum tiling scale and emits
    /// exactly one quad per uncovered piece. Returns the contents scales of
    /// the tilings that contributed at least one quad, in first-use order,
    /// for tiling retirement.
    pub fn append_quads(
        &self,
        draw_mode: DrawMode,
        occlusion: &dyn Occlusion,
        render_pass: &mut RenderPass,
        data: &mut AppendQuadsData,
    ) -> Vec<f32> {
        let visible = self.draw_properties.visible_layer_rect;
        if visible.is_empty() || self.tilings().num_tilings() == 0 {
            return Vec::new();
        }
        let ideal_scale = self.ideal_contents_scale();
        if ideal_scale <= 0.0 {
            return Vec::new();
        }

        let max_contents_scale = self.maximum_tiling_contents_scale();
        let scaled_visible = enclosing_scaled_rect(visible, 1.0, max_contents_scale);
        let shared_state = render_pass.append_shared_quad_state(SharedQuadState {
            content_to_target_scale: 1.0 / max_contents_scale,
            visible_rect: scaled_visible,
            opacity: self.draw_properties.opacity,
        });

        if draw_mode == DrawMode::ResourcelessSoftware {
            render_pass.append_quad(DrawQuad {
                shared_quad_state_index: shared_state,
                geometry_rect: scaled_visible,
                visible_geometry_rect: scaled_visible,
                material: QuadMaterial::Picture {
                    content_rect: scaled_visible,
                    contents_scale: max_contents_scale,
                },
            });
            return Vec::new();
        }

        let mut seen_tilings: Vec<f32> = Vec::new();
        for piece in self
            .tilings()
            .coverage(max_contents_scale, ideal_scale, scaled_visible)
        {
            let geometry_rect = piece.geometry_rect;
            let visible_geometry_rect = occlusion.unoccluded_content_rect(geometry_rect);
            if visible_geometry_rect.is_empty() {
                continue;
            }
            data.visible_content_area += visible_geometry_rect.area();

            let mut emitted_resolution = None;
            if let Some(source) = piece.source {
                match *source.tile.content() {
                    TileContent::Resource { id, swizzle, .. } => {
                        render_pass.append_quad(DrawQuad {
                            shared_quad_state_index: shared_state,
                            geometry_rect,
                            visible_geometry_rect,
                            material: QuadMaterial::Texture {
                                resource: id,
                                texture_rect: source.texture_rect,
                                texture_size: source.tile.content_rect().size(),
                                swizzle,
                            },
                        });
                        emitted_resolution = Some(source.resolution);
                    }
                    TileContent::SolidColor(color) => {
                        render_pass.append_quad(DrawQuad {
                            shared_quad_state_index: shared_state,
                            geometry_rect,
                            visible_geometry_rect,
                            material: QuadMaterial::SolidColor { color },
                        });
                        emitted_resolution = Some(source.resolution);
                    }
                    TileContent::Unavailable => {
                        // The recording exists (the tile was created), so the
                        // renderer may raster it on demand if it can.
                        if self.settings().allow_rasterize_on_demand {
                            render_pass.append_quad(DrawQuad {
                                shared_quad_state_index: shared_state,
                                geometry_rect,
                                visible_geometry_rect,
                                material: QuadMaterial::Picture {
                                    content_rect: source.tile.content_rect(),
                                    contents_scale: source.contents_scale,
                                },
                            });
                            emitted_resolution = Some(source.resolution);
                        }
                    }
                }
                // Any stand-in from a tiling away from the ideal scale is
                // incomplete, whatever its representation.
                if emitted_resolution.is_some() && source.contents_scale != ideal_scale {
                    data.num_incomplete_tiles += 1;
                    data.had_incomplete_tile = true;
                }
            }

            let Some(resolution) = emitted_resolution else {
                let material = if self.settings().draw_checkerboard_for_missing_tiles {
                    QuadMaterial::Checkerboard {
                        color: CHECKERBOARD_COLOR,
                    }
                } else {
                    QuadMaterial::SolidColor {
                        color: self.settings().background_color,
                    }
                };
                render_pass.append_quad(DrawQuad {
                    shared_quad_state_index: shared_state,
                    geometry_rect,
                    visible_geometry_rect,
                    material,
                });
                data.num_missing_tiles += 1;
                data.had_incomplete_tile = true;
                data.approximated_visible_content_area += visible_geometry_rect.area();
                continue;
            };

            if resolution != TileResolution::High {
                data.approximated_visible_content_area += visible_geometry_rect.area();
            }
            if let Some(source) = piece.source
                && !seen_tilings.contains(&source.contents_scale)
            {
                seen_tilings.push(source.contents_scale);
            }
        }
        seen_tilings
    }
}
