//! Tree-wide policy knobs. Every numeric constant the scale and priority
//! machinery consults lives here so hosts can tune them; the defaults are the
//! compatibility-preserving values.

use draw_protocol::Color;
use geometry::Size;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeSettings {
    pub default_tile_size: Size,
    pub max_untiled_layer_size: Size,
    pub max_texture_size: i32,
    /// Floor for the per-layer minimum contents scale.
    pub minimum_contents_scale: f32,
    pub low_res_contents_scale_factor: f32,
    /// Reuse an existing tiling when its scale is within this ratio of the
    /// desired one.
    pub tiling_snap_ratio: f32,
    /// During a pinch the raster scale moves by this multiple per step.
    pub pinch_zoom_scale_step: f32,
    pub tile_round_up_granularity: i32,
    pub avoid_pow2_round_up_granularity: i32,
    pub avoid_pow2_textures: bool,
    pub max_tiles_for_interest_area: i64,
    pub skewport_target_time_multiplier: f32,
    pub skewport_extrapolation_limit_in_content_pixels: i32,
    pub create_low_res_tiling: bool,
    pub allow_rasterize_on_demand: bool,
    pub use_gpu_rasterization: bool,
    pub draw_checkerboard_for_missing_tiles: bool,
    pub background_color: Color,
}

impl TreeSettings {
    pub fn tile_granularity(&self) -> i32 {
        if self.avoid_pow2_textures {
            self.avoid_pow2_round_up_granularity
        } else {
            self.tile_round_up_granularity
        }
    }
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            default_tile_size: Size::new(256, 256),
            max_untiled_layer_size: Size::new(512, 512),
            max_texture_size: 8192,
            minimum_contents_scale: 0.0625,
            low_res_contents_scale_factor: 0.25,
            tiling_snap_ratio: 1.2,
            pinch_zoom_scale_step: 2.0,
            tile_round_up_granularity: 64,
            avoid_pow2_round_up_granularity: 56,
            avoid_pow2_textures: false,
            max_tiles_for_interest_area: 512,
            skewport_target_time_multiplier: 60.0,
            skewport_extrapolation_limit_in_content_pixels: 2000,
            create_low_res_tiling: true,
            allow_rasterize_on_demand: true,
            use_gpu_rasterization: false,
            draw_checkerboard_for_missing_tiles: false,
            background_color: Color::WHITE,
        }
    }
}
