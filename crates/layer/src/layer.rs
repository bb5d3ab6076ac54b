//! The picture layer: tiling management and the ideal/raster scale state
//! machine.

use std::sync::Arc;

use geometry::{Rect, Region, Size, Vector, enclosing_scaled_rect, round_up, scale_size_ceil};
use log::debug;
use tiling::{
    TileContent, TileFactory, TileIndex, TileRequest, TileResolution, TileSeed, Tiling, TilingSet,
};

use crate::settings::TreeSettings;
use crate::source::RasterSource;

/// Uniform-scale screen placement. Twin layers are only compared for
/// activation when these match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenSpaceTransform {
    pub scale: f32,
    pub translation: Vector,
}

/// Per-frame inputs computed for this layer by the host's property trees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawProperties {
    pub visible_layer_rect: Rect,
    /// Scale that would produce pixel-perfect output right now.
    pub ideal_contents_scale: f32,
    pub screen_space_transform: ScreenSpaceTransform,
    pub screen_space_transform_is_animating: bool,
    /// Largest contents scale the running animation will reach, or zero when
    /// unknown.
    pub maximum_animation_contents_scale: f32,
    pub opacity: f32,
    pub is_drawn: bool,
}

impl Default for DrawProperties {
    fn default() -> Self {
        Self {
            visible_layer_rect: Rect::default(),
            ideal_contents_scale: 1.0,
            screen_space_transform: ScreenSpaceTransform {
                scale: 1.0,
                translation: Vector::default(),
            },
            screen_space_transform_is_animating: false,
            maximum_animation_contents_scale: 0.0,
            opacity: 1.0,
            is_drawn: false,
        }
    }
}

/// Tree-wide inputs for one update cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateContext {
    pub page_scale_factor: f32,
    pub device_scale_factor: f32,
    pub device_viewport: Size,
    pub pinch_gesture_active: bool,
    pub frame_time_seconds: f64,
}

/// One composited content layer and everything it rasterizes from: the
/// recording, its tilings at every kept scale, the pending invalidation, and
/// the ideal/raster scale bookkeeping.
pub struct PictureLayer {
    bounds: Size,
    raster_source: Arc<dyn RasterSource>,
    tilings: TilingSet,
    invalidation: Region,
    is_mask: bool,
    settings: TreeSettings,
    pub draw_properties: DrawProperties,

    ideal_page_scale: f32,
    ideal_device_scale: f32,
    ideal_source_scale: f32,
    ideal_contents_scale: f32,

    raster_page_scale: f32,
    raster_device_scale: f32,
    raster_source_scale: f32,
    raster_contents_scale: f32,
    low_res_raster_contents_scale: f32,
    raster_source_scale_is_fixed: bool,

    was_screen_space_transform_animating: bool,
    has_valid_tile_priorities: bool,
    source_frame_number: u64,
    next_content_key: u64,
}

impl PictureLayer {
    pub fn new(raster_source: Arc<dyn RasterSource>, bounds: Size, settings: TreeSettings) -> Self {
        Self::with_mask_flag(raster_source, bounds, settings, false)
    }

    pub fn new_mask(
        raster_source: Arc<dyn RasterSource>,
        bounds: Size,
        settings: TreeSettings,
    ) -> Self {
        Self::with_mask_flag(raster_source, bounds, settings, true)
    }

    fn with_mask_flag(
        raster_source: Arc<dyn RasterSource>,
        bounds: Size,
        settings: TreeSettings,
        is_mask: bool,
    ) -> Self {
        Self {
            bounds,
            raster_source,
            tilings: TilingSet::new(),
            invalidation: Region::new(),
            is_mask,
            settings,
            draw_properties: DrawProperties::default(),
            ideal_page_scale: 0.0,
            ideal_device_scale: 0.0,
            ideal_source_scale: 0.0,
            ideal_contents_scale: 0.0,
            raster_page_scale: 0.0,
            raster_device_scale: 0.0,
            raster_source_scale: 0.0,
            raster_contents_scale: 0.0,
            low_res_raster_contents_scale: 0.0,
            raster_source_scale_is_fixed: false,
            was_screen_space_transform_animating: false,
            has_valid_tile_priorities: false,
            source_frame_number: 0,
            next_content_key: 0,
        }
    }

    pub fn bounds(&self) -> Size {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Size) {
        self.bounds = bounds;
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    pub fn is_mask(&self) -> bool {
        self.is_mask
    }

    pub fn raster_source(&self) -> &Arc<dyn RasterSource> {
        &self.raster_source
    }

    pub fn set_raster_source(&mut self, raster_source: Arc<dyn RasterSource>) {
        self.raster_source = raster_source;
    }

    pub fn tilings(&self) -> &TilingSet {
        &self.tilings
    }

    pub fn tilings_mut(&mut self) -> &mut TilingSet {
        &mut self.tilings
    }

    pub fn invalidation(&self) -> &Region {
        &self.invalidation
    }

    pub fn union_invalidation(&mut self, layer_region: &Region) {
        self.invalidation.union_region(layer_region);
    }

    pub fn clear_invalidation(&mut self) {
        self.invalidation.clear();
    }

    pub fn source_frame_number(&self) -> u64 {
        self.source_frame_number
    }

    pub fn set_source_frame_number(&mut self, frame: u64) {
        self.source_frame_number = frame;
    }

    pub fn ideal_contents_scale(&self) -> f32 {
        self.ideal_contents_scale
    }

    pub fn ideal_source_scale(&self) -> f32 {
        self.ideal_source_scale
    }

    pub fn raster_contents_scale(&self) -> f32 {
        self.raster_contents_scale
    }

    pub fn raster_source_scale(&self) -> f32 {
        self.raster_source_scale
    }

    pub fn raster_source_scale_is_fixed(&self) -> bool {
        self.raster_source_scale_is_fixed
    }

    pub fn low_res_raster_contents_scale(&self) -> f32 {
        self.low_res_raster_contents_scale
    }

    pub fn has_valid_tile_priorities(&self) -> bool {
        self.has_valid_tile_priorities
    }

    pub fn set_has_valid_tile_priorities(&mut self, valid: bool) {
        self.has_valid_tile_priorities = valid;
    }

    pub fn can_have_tilings(&self) -> bool {
        self.raster_source.has_recordings() && self.draw_properties.is_drawn
    }

    /// Smallest contents scale that still yields at least one pixel of
    /// content on the layer's smaller axis.
    pub fn minimum_contents_scale(&self) -> f32 {
        let floor = self.settings.minimum_contents_scale;
        let min_dimension = self.bounds.min_dimension();
        if min_dimension <= 0 {
            return floor;
        }
        (1.0 / min_dimension as f32).max(floor)
    }

    pub fn calculate_tile_size(&self, content_bounds: Size) -> Size {
        calculate_tile_size(&self.settings, self.is_mask, content_bounds)
    }

    /// Runs one update cycle of the scale state machine: refresh ideal
    /// scales, decide whether the committed raster scales still hold, and
    /// re-derive the tiling set when they do not.
    pub fn update_tilings(&mut self, context: &UpdateContext) {
        if !self.can_have_tilings() {
            self.tilings.remove_all_tilings();
            self.reset_raster_scale();
            self.has_valid_tile_priorities = false;
            return;
        }
        self.update_ideal_scales(context);
        if self.tilings.num_tilings() == 0 || self.should_adjust_raster_scale(context) {
            self.recalculate_raster_scales(context);
            self.tilings.mark_all_non_ideal();
            self.add_tilings_for_raster_scale(context);
        }
        self.was_screen_space_transform_animating =
            self.draw_properties.screen_space_transform_is_animating;
    }

    fn update_ideal_scales(&mut self, context: &UpdateContext) {
        let minimum = self.minimum_contents_scale();
        self.ideal_page_scale = context.page_scale_factor;
        self.ideal_device_scale = context.device_scale_factor;
        self.ideal_contents_scale = self.draw_properties.ideal_contents_scale.max(minimum);
        self.ideal_source_scale =
            self.ideal_contents_scale / self.ideal_page_scale / self.ideal_device_scale;
    }

    fn should_adjust_raster_scale(&self, context: &UpdateContext) -> bool {
        let animating = self.draw_properties.screen_space_transform_is_animating;
        if self.was_screen_space_transform_animating != animating {
            return true;
        }
        if context.pinch_gesture_active && self.raster_page_scale > 0.0 {
            // Zoomed out below the rastered scale, or the raster scale is
            // lagging the gesture by more than one pinch step.
            if self.raster_page_scale > self.ideal_page_scale {
                return true;
            }
            if self.ideal_page_scale / self.raster_page_scale
                > self.settings.pinch_zoom_scale_step
            {
                return true;
            }
        } else if self.raster_page_scale != self.ideal_page_scale {
            return true;
        }
        if self.raster_device_scale != self.ideal_device_scale {
            return true;
        }
        if self.raster_source_scale != self.ideal_source_scale
            && !self.raster_source_scale_is_fixed
            && !animating
        {
            return true;
        }
        false
    }

    fn recalculate_raster_scales(&mut self, context: &UpdateContext) {
        let old_raster_contents_scale = self.raster_contents_scale;
        let old_raster_page_scale = self.raster_page_scale;
        let old_raster_source_scale = self.raster_source_scale;

        self.raster_device_scale = self.ideal_device_scale;
        self.raster_page_scale = self.ideal_page_scale;
        self.raster_source_scale = self.ideal_source_scale;
        self.raster_contents_scale = self.ideal_contents_scale;

        let animating = self.draw_properties.screen_space_transform_is_animating;

        // A source scale that changes outside of any animation is
        // unpredictable; pin it at 1 and absorb the factor into the contents
        // scale so it stops forcing re-rasters.
        if old_raster_source_scale != 0.0
            && !animating
            && !self.was_screen_space_transform_animating
            && old_raster_source_scale != self.ideal_source_scale
        {
            self.raster_source_scale_is_fixed = true;
        }
        if self.raster_source_scale_is_fixed {
            self.raster_contents_scale /= self.raster_source_scale;
            self.raster_source_scale = 1.0;
        }

        // During a pinch, step from the previous raster scale instead of
        // chasing the ideal, and snap onto a nearby existing tiling.
        if context.pinch_gesture_active && old_raster_contents_scale > 0.0 {
            let zooming_out = old_raster_page_scale > self.ideal_page_scale;
            let step = self.settings.pinch_zoom_scale_step;
            let desired = if zooming_out {
                old_raster_contents_scale / step
            } else {
                old_raster_contents_scale * step
            };
            self.raster_contents_scale = self
                .tilings
                .snapped_contents_scale(desired, self.settings.tiling_snap_ratio)
                .unwrap_or(desired);
            self.raster_page_scale =
                self.raster_contents_scale / self.raster_device_scale / self.raster_source_scale;
        }

        self.raster_contents_scale =
            self.raster_contents_scale.max(self.minimum_contents_scale());

        // While animating, raster at the animation's peak scale when the
        // layer stays within the viewport's pixel area at that scale;
        // otherwise fall back to page x device.
        if animating {
            let maximum_scale = self.draw_properties.maximum_animation_contents_scale;
            let can_raster_at_maximum = maximum_scale > 0.0
                && scale_size_ceil(self.bounds, maximum_scale).area()
                    <= context.device_viewport.area();
            if can_raster_at_maximum {
                self.raster_contents_scale = self.raster_contents_scale.max(maximum_scale);
            } else {
                self.raster_contents_scale = self
                    .raster_contents_scale
                    .max(self.ideal_page_scale * self.ideal_device_scale);
            }
        }

        // A layer that fits in one tile gets no separate low-res tiling.
        let content_bounds = scale_size_ceil(self.bounds, self.raster_contents_scale);
        let tile_size = self.calculate_tile_size(content_bounds);
        if tile_size.width >= content_bounds.width && tile_size.height >= content_bounds.height {
            self.low_res_raster_contents_scale = self.raster_contents_scale;
        } else {
            self.low_res_raster_contents_scale = (self.raster_contents_scale
                * self.settings.low_res_contents_scale_factor)
                .max(self.minimum_contents_scale());
        }

        debug!(
            "raster scales recalculated: contents {} (low res {}), page {}, source {} (fixed: {})",
            self.raster_contents_scale,
            self.low_res_raster_contents_scale,
            self.raster_page_scale,
            self.raster_source_scale,
            self.raster_source_scale_is_fixed,
        );
    }

    fn add_tilings_for_raster_scale(&mut self, context: &UpdateContext) {
        let minimum = self.minimum_contents_scale();
        let high_scale = self.raster_contents_scale;
        if self.tilings.tiling_at_scale(high_scale).is_none() {
            let content_bounds = scale_size_ceil(self.bounds, high_scale);
            let tile_size = self.calculate_tile_size(content_bounds);
            if let Err(refusal) = self
                .tilings
                .add_tiling(Tiling::new(high_scale, self.bounds, tile_size), minimum)
            {
                debug!("high-res tiling refused: {refusal}");
                return;
            }
        }
        self.tilings
            .tiling_at_scale_mut(high_scale)
            .unwrap_or_else(|| panic!("high-res tiling at scale {high_scale} missing"))
            .set_resolution(TileResolution::High);

        let low_scale = self.low_res_raster_contents_scale;
        if low_scale == high_scale {
            // Degenerate case: the high-res tiling serves both roles.
            return;
        }
        let animating = self.draw_properties.screen_space_transform_is_animating;
        if self.tilings.tiling_at_scale(low_scale).is_none()
            && self.settings.create_low_res_tiling
            && !context.pinch_gesture_active
            && !animating
        {
            let content_bounds = scale_size_ceil(self.bounds, low_scale);
            let tile_size = self.calculate_tile_size(content_bounds);
            if let Err(refusal) = self
                .tilings
                .add_tiling(Tiling::new(low_scale, self.bounds, tile_size), minimum)
            {
                debug!("low-res tiling refused: {refusal}");
            }
        }
        if let Some(tiling) = self.tilings.tiling_at_scale_mut(low_scale) {
            tiling.set_resolution(TileResolution::Low);
        }
    }

    /// Recomputes every resident tile's priority from the current visible
    /// rect, creating and pruning tiles as the interest area moved. `twin` is
    /// this layer's counterpart on the other tree; its tiles are inherited
    /// where the invalidation does not touch them.
    pub fn update_tile_priorities(&mut self, context: &UpdateContext, twin: Option<&PictureLayer>) {
        if !self.draw_properties.is_drawn || self.tilings.num_tilings() == 0 {
            self.has_valid_tile_priorities = false;
            return;
        }
        let inputs_template = tiling::PriorityUpdateInputs {
            visible_rect_in_layer_space: self.draw_properties.visible_layer_rect,
            frame_time_seconds: context.frame_time_seconds,
            skewport_target_time_multiplier: self.settings.skewport_target_time_multiplier,
            skewport_extrapolation_limit_in_content_pixels: self
                .settings
                .skewport_extrapolation_limit_in_content_pixels,
            skewport_enabled: !self.settings.use_gpu_rasterization,
            max_tiles_for_interest_area: self.settings.max_tiles_for_interest_area,
        };
        let Self {
            ref mut tilings,
            ref raster_source,
            ref invalidation,
            ref mut next_content_key,
            source_frame_number,
            ..
        } = *self;
        for own_tiling in tilings.tilings_mut() {
            let twin_tiling = twin
                .and_then(|layer| layer.tilings.tiling_at_scale(own_tiling.contents_scale()));
            let mut factory = LayerTileFactory {
                raster_source: raster_source.as_ref(),
                invalidation,
                twin_tiling,
                next_content_key,
                source_frame_number,
            };
            own_tiling.update_tile_priorities(&inputs_template, &mut factory);
        }
        self.has_valid_tile_priorities = true;
    }

    /// Mirrors the active twin's tilings into this (pending) layer so it does
    /// not rasterize from zero, and adopts the twin's raster-scale state when
    /// its high-res tiling carried over.
    pub fn sync_from_twin(&mut self, twin: &PictureLayer) {
        self.next_content_key = self.next_content_key.max(twin.next_content_key);
        self.raster_page_scale = twin.raster_page_scale;
        self.raster_device_scale = twin.raster_device_scale;
        self.raster_source_scale = twin.raster_source_scale;
        self.raster_contents_scale = twin.raster_contents_scale;
        self.low_res_raster_contents_scale = twin.low_res_raster_contents_scale;
        self.raster_source_scale_is_fixed = twin.raster_source_scale_is_fixed;

        let minimum = self.minimum_contents_scale();
        let settings = self.settings;
        let is_mask = self.is_mask;
        let Self {
            ref mut tilings,
            ref invalidation,
            bounds,
            ..
        } = *self;
        let synced_high_res = tilings.sync_tilings(
            &twin.tilings,
            bounds,
            invalidation,
            minimum,
            &mut |content_bounds| calculate_tile_size(&settings, is_mask, content_bounds),
        );
        if !synced_high_res {
            self.reset_raster_scale();
        }
    }

    /// Clears cached raster-scale state so the next update recomputes it
    /// from scratch.
    pub fn reset_raster_scale(&mut self) {
        self.raster_page_scale = 0.0;
        self.raster_device_scale = 0.0;
        self.raster_source_scale = 0.0;
        self.raster_contents_scale = 0.0;
        self.low_res_raster_contents_scale = 0.0;
        self.raster_source_scale_is_fixed = false;
    }

    /// Called on every layer of a tree the moment it becomes the active
    /// tree. Required-for-activation flags are only meaningful on a pending
    /// tree.
    pub fn did_become_active(&mut self) {
        for owned_tiling in self.tilings.tilings_mut() {
            for tile in owned_tiling.tiles_mut() {
                tile.clear_required_for_activation();
            }
        }
        self.clear_invalidation();
    }

    /// Drains the resources freed by tile and tiling removal since the last
    /// call, for return to the host's pool.
    pub fn take_released_resources(&mut self) -> Vec<draw_protocol::ResourceId> {
        self.tilings.take_released_resources()
    }

    /// Releases the resource behind one tile, returning it for the pool.
    pub fn evict_tile(
        &mut self,
        contents_scale: f32,
        index: TileIndex,
    ) -> Option<draw_protocol::ResourceId> {
        self.tilings
            .tiling_at_scale_mut(contents_scale)?
            .tile_at_mut(index)?
            .take_resource()
    }

    pub fn maximum_tiling_contents_scale(&self) -> f32 {
        self.tilings
            .tilings()
            .map(|owned_tiling| owned_tiling.contents_scale())
            .fold(1.0_f32, f32::max)
    }

    /// Drops tilings that fell outside the acceptable scale range, kept
    /// neither as low-res nor by the last draw. Active tree only. Returns
    /// the removed scales whose twin tilings are non-ideal, so the caller
    /// can drop them from the twin tree as well.
    pub fn cleanup_tilings_on_active_layer(
        &mut self,
        used_scales: &[f32],
        twin: Option<&PictureLayer>,
    ) -> Vec<f32> {
        if self.tilings.num_tilings() == 0 {
            return Vec::new();
        }
        let mut min_acceptable = self.raster_contents_scale.min(self.ideal_contents_scale);
        let mut max_acceptable = self.raster_contents_scale.max(self.ideal_contents_scale);
        let mut twin_low_res_scale = 0.0;
        if let Some(twin) = twin
            && twin.can_have_tilings()
        {
            min_acceptable =
                min_acceptable.min(twin.raster_contents_scale.min(twin.ideal_contents_scale));
            max_acceptable =
                max_acceptable.max(twin.raster_contents_scale.max(twin.ideal_contents_scale));
            if let Some(low) = twin.tilings.low_res_tiling() {
                twin_low_res_scale = low.contents_scale();
            }
        }

        let mut to_remove = Vec::new();
        for owned_tiling in self.tilings.tilings() {
            let scale = owned_tiling.contents_scale();
            if scale >= min_acceptable && scale <= max_acceptable {
                continue;
            }
            if self.settings.create_low_res_tiling
                && (owned_tiling.resolution() == TileResolution::Low
                    || scale == self.low_res_raster_contents_scale
                    || scale == twin_low_res_scale)
            {
                continue;
            }
            if used_scales.contains(&scale) {
                continue;
            }
            assert!(
                owned_tiling.resolution() != TileResolution::High,
                "high-res tiling at scale {scale} fell outside the acceptable range"
            );
            to_remove.push(scale);
        }

        let mut propagate_to_twin = Vec::new();
        for scale in to_remove {
            if let Some(twin) = twin
                && let Some(twin_tiling) = twin.tilings.tiling_at_scale(scale)
                && twin_tiling.resolution() == TileResolution::NonIdeal
            {
                propagate_to_twin.push(scale);
            }
            self.tilings.remove_tiling_at_scale(scale);
        }
        if self.tilings.num_tilings() == 0 {
            self.reset_raster_scale();
        }
        propagate_to_twin
    }
}

impl std::fmt::Debug for PictureLayer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PictureLayer")
            .field("bounds", &self.bounds)
            .field("num_tilings", &self.tilings.num_tilings())
            .field("ideal_contents_scale", &self.ideal_contents_scale)
            .field("raster_contents_scale", &self.raster_contents_scale)
            .finish_non_exhaustive()
    }
}

/// Per-axis: clamp the untiled maximum against the content, round up to the
/// granularity, and cap at the texture limit. Mask layers get one square
/// tile covering the whole mask.
pub fn calculate_tile_size(
    settings: &TreeSettings,
    is_mask: bool,
    content_bounds: Size,
) -> Size {
    if is_mask {
        let dimension = content_bounds
            .width
            .max(content_bounds.height)
            .min(settings.max_texture_size);
        return Size::new(dimension, dimension);
    }
    let granularity = settings.tile_granularity();
    let axis = |content: i32, untiled: i32, default: i32| -> i32 {
        let wanted = untiled.max(default).min(content.max(0));
        round_up(wanted, granularity).min(settings.max_texture_size)
    };
    Size::new(
        axis(
            content_bounds.width,
            settings.max_untiled_layer_size.width,
            settings.default_tile_size.width,
        ),
        axis(
            content_bounds.height,
            settings.max_untiled_layer_size.height,
            settings.default_tile_size.height,
        ),
    )
}

/// Tile creation on behalf of one tiling: refuse where the recording cannot
/// raster, inherit the twin's tile where the invalidation does not touch the
/// cell, collapse flat cells to solid color, and mint a fresh content key
/// otherwise.
struct LayerTileFactory<'a> {
    raster_source: &'a dyn RasterSource,
    invalidation: &'a Region,
    twin_tiling: Option<&'a Tiling>,
    next_content_key: &'a mut u64,
    source_frame_number: u64,
}

impl TileFactory for LayerTileFactory<'_> {
    fn create_tile(&mut self, request: &TileRequest) -> Option<TileSeed> {
        if !self
            .raster_source
            .can_raster(request.contents_scale, request.content_rect)
        {
            return None;
        }
        let layer_rect =
            enclosing_scaled_rect(request.content_rect, request.contents_scale, 1.0);
        if let Some(twin_tiling) = self.twin_tiling
            && let Some(twin_tile) = twin_tiling.tile_at(request.index)
            && twin_tile.content_rect() == request.content_rect
            && !self.invalidation.intersects(layer_rect)
        {
            return Some(TileSeed {
                opaque_rect: twin_tile.opaque_rect(),
                content: *twin_tile.content(),
                content_key: twin_tile.content_key(),
                source_frame_number: twin_tile.source_frame_number(),
            });
        }
        *self.next_content_key += 1;
        let content_key = (self.source_frame_number << 32) | *self.next_content_key;
        if let Some(color) = self
            .raster_source
            .is_solid_color(request.contents_scale, request.content_rect)
        {
            let opaque_rect = if color.is_opaque() {
                request.content_rect
            } else {
                Rect::default()
            };
            return Some(TileSeed {
                opaque_rect,
                content: TileContent::SolidColor(color),
                content_key,
                source_frame_number: self.source_frame_number,
            });
        }
        Some(TileSeed {
            opaque_rect: Rect::default(),
            content: TileContent::Unavailable,
            content_key,
            source_frame_number: self.source_frame_number,
        })
    }
}
