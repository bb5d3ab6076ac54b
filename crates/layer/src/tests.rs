use super::*;

use std::sync::Arc;

use draw_protocol::{AppendQuadsData, Color, QuadMaterial, RenderPass, ResourceId};
use geometry::{Rect, Region, Size, enclosing_scaled_rect};
use slotmap::SlotMap;
use tiling::{PriorityBin, TileContent, TileIndex, TileResolution};

#[derive(Default)]
struct FakeRecording {
    no_recordings: bool,
    refuse_layer_rect: Option<Rect>,
    solid: Option<(Rect, Color)>,
}

impl RasterSource for FakeRecording {
    fn has_recordings(&self) -> bool {
        !self.no_recordings
    }

    fn can_raster(&self, contents_scale: f32, content_rect: Rect) -> bool {
        let layer_rect = enclosing_scaled_rect(content_rect, contents_scale, 1.0);
        match self.refuse_layer_rect {
            Some(refuse) => !refuse.intersects(layer_rect),
            None => true,
        }
    }

    fn is_solid_color(&self, contents_scale: f32, content_rect: Rect) -> Option<Color> {
        let layer_rect = enclosing_scaled_rect(content_rect, contents_scale, 1.0);
        match self.solid {
            Some((solid_rect, color)) if solid_rect.contains_rect(layer_rect) => Some(color),
            _ => None,
        }
    }
}

fn plain_recording() -> Arc<dyn RasterSource> {
    Arc::new(FakeRecording::default())
}

fn context() -> UpdateContext {
    UpdateContext {
        page_scale_factor: 1.0,
        device_scale_factor: 1.0,
        device_viewport: Size::new(1000, 1000),
        pinch_gesture_active: false,
        frame_time_seconds: 1.0,
    }
}

fn drawn_layer(bounds: Size) -> PictureLayer {
    let mut layer = PictureLayer::new(plain_recording(), bounds, TreeSettings::default());
    layer.draw_properties.is_drawn = true;
    layer.draw_properties.visible_layer_rect = Rect::from_size(bounds);
    layer
}

fn update(layer: &mut PictureLayer, ctx: &UpdateContext) {
    layer.update_tilings(ctx);
    layer.update_tile_priorities(ctx, None);
}

fn set_ideal(layer: &mut PictureLayer, scale: f32) {
    layer.draw_properties.ideal_contents_scale = scale;
    layer.draw_properties.screen_space_transform.scale = scale;
}

#[test]
fn tile_size_rounds_up_to_granularity() {
    let settings = TreeSettings::default();
    // Wide, short content: the width clamps at the untiled maximum, the
    // height rounds 12 up to one granule.
    assert_eq!(
        calculate_tile_size(&settings, false, Size::new(1000, 12)),
        Size::new(512, 64)
    );
    assert_eq!(
        calculate_tile_size(&settings, false, Size::new(300, 300)),
        Size::new(320, 320)
    );
    let mut odd = settings;
    odd.avoid_pow2_textures = true;
    assert_eq!(
        calculate_tile_size(&odd, false, Size::new(1000, 12)),
        Size::new(560, 56)
    );
}

#[test]
fn mask_layers_use_one_square_tile() {
    let settings = TreeSettings::default();
    assert_eq!(
        calculate_tile_size(&settings, true, Size::new(300, 500)),
        Size::new(500, 500)
    );
    assert_eq!(
        calculate_tile_size(&settings, true, Size::new(20000, 100)),
        Size::new(8192, 8192)
    );
}

#[test]
fn minimum_contents_scale_floors_and_shrinks_with_bounds() {
    let settings = TreeSettings::default();
    let layer = PictureLayer::new(plain_recording(), Size::new(4, 400), settings);
    assert_eq!(layer.minimum_contents_scale(), 0.25);

    let large = PictureLayer::new(plain_recording(), Size::new(2000, 1000), settings);
    assert_eq!(large.minimum_contents_scale(), settings.minimum_contents_scale);

    let degenerate = PictureLayer::new(plain_recording(), Size::new(0, 500), settings);
    assert_eq!(
        degenerate.minimum_contents_scale(),
        settings.minimum_contents_scale
    );
}

#[test]
fn first_update_creates_high_and_low_res_tilings() {
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &context());

    assert_eq!(layer.raster_contents_scale(), 1.0);
    assert_eq!(layer.low_res_raster_contents_scale(), 0.25);
    assert_eq!(layer.tilings().scales(), vec![1.0, 0.25]);
    assert_eq!(
        layer.tilings().high_res_tiling().unwrap().contents_scale(),
        1.0
    );
    assert_eq!(
        layer.tilings().low_res_tiling().unwrap().contents_scale(),
        0.25
    );
    assert!(layer.has_valid_tile_priorities());
}

#[test]
fn single_tile_layer_skips_low_res_tiling() {
    let mut layer = drawn_layer(Size::new(300, 300));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &context());

    assert_eq!(layer.low_res_raster_contents_scale(), 1.0);
    assert_eq!(layer.tilings().num_tilings(), 1);
    assert_eq!(
        layer.tilings().high_res_tiling().unwrap().contents_scale(),
        1.0
    );
}

#[test]
fn layer_without_recordings_or_not_drawn_loses_tilings() {
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &context());
    assert!(layer.tilings().num_tilings() > 0);

    layer.draw_properties.is_drawn = false;
    update(&mut layer, &context());
    assert_eq!(layer.tilings().num_tilings(), 0);
    assert_eq!(layer.raster_contents_scale(), 0.0);
    assert!(!layer.has_valid_tile_priorities());
    assert!(LayerRasterTileIterator::new(&layer, false).next().is_none());
    assert!(LayerEvictionTileIterator::new(&layer).next().is_none());
}

#[test]
fn device_scale_change_rebuilds_high_res_and_demotes_old_tilings() {
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &context());

    let mut ctx = context();
    ctx.device_scale_factor = 2.0;
    set_ideal(&mut layer, 2.0);
    update(&mut layer, &ctx);

    assert_eq!(layer.raster_contents_scale(), 2.0);
    assert_eq!(
        layer.tilings().high_res_tiling().unwrap().contents_scale(),
        2.0
    );
    assert_eq!(
        layer.tilings().low_res_tiling().unwrap().contents_scale(),
        0.5
    );
    assert_eq!(
        layer.tilings().tiling_at_scale(1.0).unwrap().resolution(),
        TileResolution::NonIdeal
    );
}

#[test]
fn pinch_steps_raster_scale_and_snaps_to_existing_tilings() {
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &context());
    assert_eq!(layer.raster_contents_scale(), 1.0);

    // A small pinch stays within one step: no re-raster.
    let mut ctx = context();
    ctx.pinch_gesture_active = true;
    ctx.page_scale_factor = 1.5;
    set_ideal(&mut layer, 1.5);
    update(&mut layer, &ctx);
    assert_eq!(layer.raster_contents_scale(), 1.0);

    // Past one step the scale doubles rather than chasing the ideal.
    ctx.page_scale_factor = 2.5;
    set_ideal(&mut layer, 2.5);
    update(&mut layer, &ctx);
    assert_eq!(layer.raster_contents_scale(), 2.0);

    // Zooming out steps down and snaps onto the nearby existing tiling.
    ctx.page_scale_factor = 0.9;
    set_ideal(&mut layer, 0.9);
    update(&mut layer, &ctx);
    assert_eq!(layer.raster_contents_scale(), 1.0);
}

#[test]
fn unexpected_source_scale_change_pins_the_source_scale() {
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 2.0);
    update(&mut layer, &context());
    assert_eq!(layer.raster_source_scale(), 2.0);
    assert!(!layer.raster_source_scale_is_fixed());

    set_ideal(&mut layer, 1.5);
    update(&mut layer, &context());
    assert!(layer.raster_source_scale_is_fixed());
    assert_eq!(layer.raster_source_scale(), 1.0);
    // Contents scale collapses to page x device once the source is pinned.
    assert_eq!(layer.raster_contents_scale(), 1.0);

    // Later source-scale changes no longer trigger a recalculation.
    set_ideal(&mut layer, 1.8);
    update(&mut layer, &context());
    assert_eq!(layer.raster_source_scale(), 1.0);
    assert_eq!(layer.raster_contents_scale(), 1.0);
}

#[test]
fn animation_rasters_at_peak_scale_when_it_fits_the_viewport() {
    let mut layer = drawn_layer(Size::new(500, 500));
    set_ideal(&mut layer, 1.0);
    layer.draw_properties.screen_space_transform_is_animating = true;
    layer.draw_properties.maximum_animation_contents_scale = 1.6;
    update(&mut layer, &context());

    // 800x800 at the peak fits the 1000x1000 viewport.
    assert_eq!(layer.raster_contents_scale(), 1.6);
    // No low-res churn while animating.
    assert!(layer.tilings().low_res_tiling().is_none());

    let mut big = drawn_layer(Size::new(2000, 2000));
    set_ideal(&mut big, 1.0);
    big.draw_properties.screen_space_transform_is_animating = true;
    big.draw_properties.maximum_animation_contents_scale = 1.6;
    update(&mut big, &context());
    // Too large at the peak: fall back to page x device.
    assert_eq!(big.raster_contents_scale(), 1.0);
}

#[test]
fn animation_end_restores_ideal_scale_and_low_res() {
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    layer.draw_properties.screen_space_transform_is_animating = true;
    layer.draw_properties.maximum_animation_contents_scale = 0.0;
    update(&mut layer, &context());
    assert!(layer.tilings().low_res_tiling().is_none());

    layer.draw_properties.screen_space_transform_is_animating = false;
    update(&mut layer, &context());
    assert_eq!(layer.raster_contents_scale(), 1.0);
    assert!(layer.tilings().low_res_tiling().is_some());
}

#[test]
fn recording_refusal_and_solid_analysis_flow_into_tiles() {
    let recording = Arc::new(FakeRecording {
        no_recordings: false,
        refuse_layer_rect: Some(Rect::new(0, 0, 100, 100)),
        solid: Some((Rect::new(512, 0, 488, 512), Color::WHITE)),
    });
    let mut layer = PictureLayer::new(recording, Size::new(1000, 1000), TreeSettings::default());
    layer.draw_properties.is_drawn = true;
    layer.draw_properties.visible_layer_rect = Rect::new(0, 0, 1000, 1000);
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &context());

    let high_res = layer.tilings().high_res_tiling().unwrap();
    // Cell (0, 0) overlaps the refused region: no tile at all.
    assert!(high_res.tile_at(TileIndex::new(0, 0)).is_none());
    // Cell (1, 0) is entirely flat: ready without rasterization.
    let solid_tile = high_res.tile_at(TileIndex::new(1, 0)).unwrap();
    assert_eq!(*solid_tile.content(), TileContent::SolidColor(Color::WHITE));
    assert!(solid_tile.is_ready_to_draw());
    assert_eq!(solid_tile.opaque_rect(), solid_tile.content_rect());
    // Cell (1, 1) needs raster work.
    assert!(
        high_res
            .tile_at(TileIndex::new(1, 1))
            .unwrap()
            .needs_raster()
    );
}

#[test]
fn raster_iterator_orders_stages_by_resolution_then_bin() {
    let mut layer = drawn_layer(Size::new(1000, 1000));
    layer.draw_properties.visible_layer_rect = Rect::new(0, 0, 200, 200);
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &context());

    let tiles: Vec<(f32, PriorityBin)> = LayerRasterTileIterator::new(&layer, true)
        .map(|tile| (tile.contents_scale(), tile.priority().bin))
        .collect();
    assert!(!tiles.is_empty());
    // Low-res first when prioritized, and it is visible.
    assert_eq!(tiles[0], (0.25, PriorityBin::Now));
    // High-res NOW tiles come before any EVENTUALLY tile.
    let first_eventually = tiles
        .iter()
        .position(|(_, bin)| *bin == PriorityBin::Eventually)
        .unwrap();
    for (scale, bin) in &tiles[1..first_eventually] {
        assert_eq!(*scale, 1.0);
        assert_eq!(*bin, PriorityBin::Now);
    }
    // Everything after the first EVENTUALLY tile stays EVENTUALLY high-res.
    for (scale, bin) in &tiles[first_eventually..] {
        assert_eq!(*scale, 1.0);
        assert_eq!(*bin, PriorityBin::Eventually);
    }
}

#[test]
fn eviction_iterator_releases_required_and_high_res_last() {
    let mut pool: SlotMap<ResourceId, ()> = SlotMap::with_key();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    layer.draw_properties.visible_layer_rect = Rect::new(0, 0, 200, 200);
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &context());

    let mut give_resource = |layer: &mut PictureLayer, scale: f32, index: TileIndex| {
        let id = pool.insert(());
        layer
            .tilings_mut()
            .tiling_at_scale_mut(scale)
            .unwrap()
            .tile_at_mut(index)
            .unwrap()
            .set_content(TileContent::Resource {
                id,
                swizzle: false,
                is_opaque: true,
            });
    };
    give_resource(&mut layer, 1.0, TileIndex::new(0, 0));
    give_resource(&mut layer, 1.0, TileIndex::new(1, 1));
    give_resource(&mut layer, 0.25, TileIndex::new(0, 0));
    layer
        .tilings_mut()
        .tiling_at_scale_mut(1.0)
        .unwrap()
        .tile_at_mut(TileIndex::new(0, 0))
        .unwrap()
        .mark_required_for_activation();

    let order: Vec<EvictionCandidate> = LayerEvictionTileIterator::new(&layer).collect();
    assert_eq!(order.len(), 3);
    // High-res EVENTUALLY tile goes first, the visible low-res tile next,
    // and the required visible high-res tile is the last resort.
    assert_eq!(
        (order[0].contents_scale, order[0].bin, order[0].required_for_activation),
        (1.0, PriorityBin::Eventually, false)
    );
    assert_eq!(
        (order[1].contents_scale, order[1].bin, order[1].required_for_activation),
        (0.25, PriorityBin::Now, false)
    );
    assert_eq!(
        (order[2].contents_scale, order[2].bin, order[2].required_for_activation),
        (1.0, PriorityBin::Now, true)
    );

    // Candidates identify tiles well enough to release their resources.
    let released = layer.evict_tile(order[0].contents_scale, order[0].index);
    assert!(released.is_some());
    assert!(
        layer
            .tilings()
            .tiling_at_scale(1.0)
            .unwrap()
            .tile_at(TileIndex::new(1, 1))
            .unwrap()
            .needs_raster()
    );
}

#[test]
fn unprioritized_layers_give_up_their_resources_first() {
    let mut pool: SlotMap<ResourceId, ()> = SlotMap::with_key();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &context());

    let mut give_resource = |layer: &mut PictureLayer, scale: f32, index: TileIndex| {
        let id = pool.insert(());
        layer
            .tilings_mut()
            .tiling_at_scale_mut(scale)
            .unwrap()
            .tile_at_mut(index)
            .unwrap()
            .set_content(TileContent::Resource {
                id,
                swizzle: false,
                is_opaque: true,
            });
    };
    give_resource(&mut layer, 1.0, TileIndex::new(0, 0));
    give_resource(&mut layer, 0.25, TileIndex::new(0, 0));
    layer
        .tilings_mut()
        .tiling_at_scale_mut(1.0)
        .unwrap()
        .tile_at_mut(TileIndex::new(0, 0))
        .unwrap()
        .mark_required_for_activation();

    // A culled layer no longer defends its tiles: everything it holds is up
    // for reclamation immediately, at the lowest possible priority.
    layer.set_has_valid_tile_priorities(false);
    let candidates: Vec<EvictionCandidate> = LayerEvictionTileIterator::new(&layer).collect();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].contents_scale, 0.25);
    assert_eq!(candidates[1].contents_scale, 1.0);
    for candidate in &candidates {
        assert_eq!(candidate.bin, PriorityBin::Eventually);
        assert!(!candidate.required_for_activation);
    }
    assert!(
        layer
            .evict_tile(candidates[0].contents_scale, candidates[0].index)
            .is_some()
    );
}

#[test]
fn losing_tilings_surfaces_held_resources() {
    let mut pool: SlotMap<ResourceId, ()> = SlotMap::with_key();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &context());
    let id = pool.insert(());
    layer
        .tilings_mut()
        .tiling_at_scale_mut(1.0)
        .unwrap()
        .tile_at_mut(TileIndex::new(0, 0))
        .unwrap()
        .set_content(TileContent::Resource {
            id,
            swizzle: false,
            is_opaque: true,
        });

    layer.draw_properties.is_drawn = false;
    update(&mut layer, &context());
    assert_eq!(layer.tilings().num_tilings(), 0);
    assert_eq!(layer.take_released_resources(), vec![id]);
    assert!(layer.take_released_resources().is_empty());
}

#[test]
fn pending_tiles_inherit_twin_content_outside_invalidation() {
    let ctx = context();
    let mut active = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut active, 1.0);
    update(&mut active, &ctx);
    let mut pool: SlotMap<ResourceId, ()> = SlotMap::with_key();
    let id = pool.insert(());
    active
        .tilings_mut()
        .tiling_at_scale_mut(1.0)
        .unwrap()
        .tile_at_mut(TileIndex::new(0, 0))
        .unwrap()
        .set_content(TileContent::Resource {
            id,
            swizzle: false,
            is_opaque: false,
        });

    let mut pending = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut pending, 1.0);
    pending.set_source_frame_number(1);
    pending.union_invalidation(&Region::from_rect(Rect::new(600, 0, 10, 10)));
    pending.sync_from_twin(&active);
    pending.update_tilings(&ctx);
    pending.update_tile_priorities(&ctx, Some(&active));

    let active_tiling = active.tilings().tiling_at_scale(1.0).unwrap();
    let pending_tiling = pending.tilings().tiling_at_scale(1.0).unwrap();

    // Cell (0, 0) is untouched by the invalidation: same content, same key.
    let inherited = pending_tiling.tile_at(TileIndex::new(0, 0)).unwrap();
    let twin_tile = active_tiling.tile_at(TileIndex::new(0, 0)).unwrap();
    assert_eq!(inherited.content_key(), twin_tile.content_key());
    assert_eq!(*inherited.content(), *twin_tile.content());

    // Cell (1, 0) intersects the invalidation: fresh tile, fresh key.
    let fresh = pending_tiling.tile_at(TileIndex::new(1, 0)).unwrap();
    let twin_fresh = active_tiling.tile_at(TileIndex::new(1, 0)).unwrap();
    assert_ne!(fresh.content_key(), twin_fresh.content_key());
    assert!(fresh.needs_raster());
}

#[test]
fn sync_from_twin_adopts_scales_or_resets_on_failure() {
    let ctx = context();
    let mut active = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut active, 2.0);
    update(&mut active, &ctx);

    let mut pending = drawn_layer(Size::new(1000, 1000));
    pending.sync_from_twin(&active);
    assert_eq!(pending.tilings().scales(), active.tilings().scales());
    assert_eq!(pending.raster_contents_scale(), active.raster_contents_scale());

    let mut empty_twin = drawn_layer(Size::new(1000, 1000));
    empty_twin.draw_properties.is_drawn = false;
    empty_twin.update_tilings(&ctx);
    let mut orphan = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut orphan, 1.0);
    update(&mut orphan, &ctx);
    orphan.sync_from_twin(&empty_twin);
    assert_eq!(orphan.tilings().num_tilings(), 0);
    assert_eq!(orphan.raster_contents_scale(), 0.0);
}

#[test]
fn activation_marking_skips_cells_the_twin_is_also_missing() {
    let ctx = context();
    let mut active = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut active, 1.0);
    update(&mut active, &ctx);

    let mut pending = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut pending, 1.0);
    pending.set_source_frame_number(1);
    update(&mut pending, &ctx);

    // The twin has no tile at cell (1, 1) of its high-res tiling.
    active
        .tilings_mut()
        .tiling_at_scale_mut(1.0)
        .unwrap()
        .remove_tiles_in_region(&Region::from_rect(Rect::new(600, 600, 10, 10)));

    pending.mark_visible_resources_as_required(Some(&active), false);

    let high_res = pending.tilings().tiling_at_scale(1.0).unwrap();
    assert!(
        !high_res
            .tile_at(TileIndex::new(1, 1))
            .unwrap()
            .required_for_activation(),
        "cell the twin is equally missing must not gate activation"
    );
    assert!(
        high_res
            .tile_at(TileIndex::new(0, 0))
            .unwrap()
            .required_for_activation()
    );
    // The skip forces the low-res fallback to be required instead.
    assert!(
        pending
            .tilings()
            .tiling_at_scale(0.25)
            .unwrap()
            .tile_at(TileIndex::new(0, 0))
            .unwrap()
            .required_for_activation()
    );
}

#[test]
fn activation_marking_requires_everything_when_high_res_is_forced() {
    let ctx = context();
    let mut active = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut active, 1.0);
    update(&mut active, &ctx);
    active
        .tilings_mut()
        .tiling_at_scale_mut(1.0)
        .unwrap()
        .remove_tiles_in_region(&Region::from_rect(Rect::new(600, 600, 10, 10)));

    let mut pending = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut pending, 1.0);
    update(&mut pending, &ctx);
    pending.mark_visible_resources_as_required(Some(&active), true);

    let high_res = pending.tilings().tiling_at_scale(1.0).unwrap();
    for tile in high_res.tiles() {
        assert!(tile.required_for_activation());
    }
}

#[test]
fn ready_acceptable_tiles_substitute_for_high_res_marking() {
    let ctx = context();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);
    // Everything at the old scale is ready before the device scale doubles.
    for tile in layer
        .tilings_mut()
        .tiling_at_scale_mut(1.0)
        .unwrap()
        .tiles_mut()
    {
        tile.set_content(TileContent::SolidColor(Color::WHITE));
    }

    let mut ctx2 = ctx;
    ctx2.device_scale_factor = 2.0;
    set_ideal(&mut layer, 2.0);
    update(&mut layer, &ctx2);

    // A twin whose acceptable scale is still 1.0 keeps the old tiling
    // acceptable for activation.
    let mut twin = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut twin, 1.0);
    update(&mut twin, &ctx);

    layer.mark_visible_resources_as_required(Some(&twin), false);

    for tile in layer.tilings().tiling_at_scale(2.0).unwrap().tiles() {
        assert!(
            !tile.required_for_activation(),
            "ready tiles at an acceptable scale already cover the screen"
        );
    }
    for tile in layer.tilings().tiling_at_scale(1.0).unwrap().tiles() {
        assert!(tile.required_for_activation());
    }
}

#[test]
fn did_become_active_clears_required_flags_and_invalidation() {
    let ctx = context();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);
    layer.union_invalidation(&Region::from_rect(Rect::new(0, 0, 10, 10)));
    layer.mark_visible_resources_as_required(None, false);
    assert!(
        layer
            .tilings()
            .tilings()
            .flat_map(|owned_tiling| owned_tiling.tiles())
            .any(|tile| tile.required_for_activation())
    );

    layer.did_become_active();
    assert!(layer.invalidation().is_empty());
    for tile in layer
        .tilings()
        .tilings()
        .flat_map(|owned_tiling| owned_tiling.tiles())
    {
        assert!(!tile.required_for_activation());
    }
}

#[test]
fn append_quads_covers_the_visible_rect_exactly() {
    let ctx = context();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);

    let mut pass = RenderPass::new();
    let mut data = AppendQuadsData::default();
    let seen = layer.append_quads(DrawMode::Hardware, &NoOcclusion, &mut pass, &mut data);

    let mut covered = Region::new();
    for quad in pass.quads() {
        assert!(!covered.intersects(quad.geometry_rect));
        covered.union_rect(quad.geometry_rect);
        // Nothing is rastered yet, so everything defers to on-demand raster.
        assert!(matches!(quad.material, QuadMaterial::Picture { .. }));
    }
    assert_eq!(covered.area(), 1000 * 1000);
    assert_eq!(data.visible_content_area, 1000 * 1000);
    assert_eq!(data.num_missing_tiles, 0);
    assert_eq!(seen, vec![1.0]);
}

#[test]
fn append_quads_counts_missing_tiles_without_on_demand_raster() {
    let ctx = context();
    let mut settings = TreeSettings::default();
    settings.allow_rasterize_on_demand = false;
    let mut layer = PictureLayer::new(plain_recording(), Size::new(1000, 1000), settings);
    layer.draw_properties.is_drawn = true;
    layer.draw_properties.visible_layer_rect = Rect::new(0, 0, 1000, 1000);
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);

    let mut pass = RenderPass::new();
    let mut data = AppendQuadsData::default();
    let seen = layer.append_quads(DrawMode::Hardware, &NoOcclusion, &mut pass, &mut data);

    assert_eq!(data.num_missing_tiles, 4);
    assert!(data.had_incomplete_tile);
    assert_eq!(data.approximated_visible_content_area, 1000 * 1000);
    assert!(seen.is_empty());
    for quad in pass.quads() {
        assert!(matches!(
            quad.material,
            QuadMaterial::SolidColor { color } if color == settings.background_color
        ));
    }
}

#[test]
fn append_quads_picks_the_best_representation_per_cell() {
    let ctx = context();
    let mut pool: SlotMap<ResourceId, ()> = SlotMap::with_key();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);

    let high_id = pool.insert(());
    let low_id = pool.insert(());
    {
        let high_res = layer.tilings_mut().tiling_at_scale_mut(1.0).unwrap();
        high_res
            .tile_at_mut(TileIndex::new(0, 0))
            .unwrap()
            .set_content(TileContent::Resource {
                id: high_id,
                swizzle: false,
                is_opaque: true,
            });
        high_res
            .tile_at_mut(TileIndex::new(1, 0))
            .unwrap()
            .set_content(TileContent::SolidColor(Color::WHITE));
        // Cell (0, 1) has no tile at all; the low-res tiling covers it.
        high_res.remove_tiles_in_region(&Region::from_rect(Rect::new(100, 600, 10, 10)));
    }
    layer
        .tilings_mut()
        .tiling_at_scale_mut(0.25)
        .unwrap()
        .tile_at_mut(TileIndex::new(0, 0))
        .unwrap()
        .set_content(TileContent::Resource {
            id: low_id,
            swizzle: false,
            is_opaque: true,
        });

    let mut pass = RenderPass::new();
    let mut data = AppendQuadsData::default();
    let seen = layer.append_quads(DrawMode::Hardware, &NoOcclusion, &mut pass, &mut data);

    let mut textures = 0;
    let mut solids = 0;
    let mut pictures = 0;
    for quad in pass.quads() {
        match quad.material {
            QuadMaterial::Texture { .. } => textures += 1,
            QuadMaterial::SolidColor { .. } => solids += 1,
            QuadMaterial::Picture { .. } => pictures += 1,
            QuadMaterial::Checkerboard { .. } => panic!("unexpected checkerboard"),
        }
    }
    assert_eq!((textures, solids, pictures), (2, 1, 1));
    // The low-res stand-in is below the ideal scale.
    assert_eq!(data.num_incomplete_tiles, 1);
    assert!(data.had_incomplete_tile);
    let fallback_area = (512 * 488) as i64;
    assert_eq!(data.approximated_visible_content_area, fallback_area);
    assert_eq!(seen, vec![1.0, 0.25]);
}

#[test]
fn append_quads_reports_each_contributing_tiling_once() {
    let ctx = context();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);

    // Two separated high-res holes, both filled by the low-res tiling, so
    // the low-res contribution is split around high-res coverage.
    layer
        .tilings_mut()
        .tiling_at_scale_mut(1.0)
        .unwrap()
        .remove_tiles_in_region(&Region::from_rect(Rect::new(0, 0, 10, 10)));
    layer
        .tilings_mut()
        .tiling_at_scale_mut(1.0)
        .unwrap()
        .remove_tiles_in_region(&Region::from_rect(Rect::new(600, 600, 10, 10)));

    let mut pass = RenderPass::new();
    let mut data = AppendQuadsData::default();
    let seen = layer.append_quads(DrawMode::Hardware, &NoOcclusion, &mut pass, &mut data);
    assert_eq!(seen, vec![1.0, 0.25]);
}

#[test]
fn non_ideal_scale_stand_ins_count_as_incomplete() {
    let ctx = context();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);

    // One high-res cell is gone; the low-res tiling fills it with a ready
    // solid tile.
    layer
        .tilings_mut()
        .tiling_at_scale_mut(1.0)
        .unwrap()
        .remove_tiles_in_region(&Region::from_rect(Rect::new(600, 600, 10, 10)));
    layer
        .tilings_mut()
        .tiling_at_scale_mut(0.25)
        .unwrap()
        .tile_at_mut(TileIndex::new(0, 0))
        .unwrap()
        .set_content(TileContent::SolidColor(Color::WHITE));

    let mut pass = RenderPass::new();
    let mut data = AppendQuadsData::default();
    layer.append_quads(DrawMode::Hardware, &NoOcclusion, &mut pass, &mut data);

    assert_eq!(data.num_missing_tiles, 0);
    assert_eq!(data.num_incomplete_tiles, 1);
    assert!(data.had_incomplete_tile);
}

#[test]
fn append_quads_skips_fully_occluded_cells() {
    struct HalfOccluded;
    impl Occlusion for HalfOccluded {
        fn unoccluded_content_rect(&self, content_rect: Rect) -> Rect {
            // Everything right of x = 512 is hidden.
            content_rect.intersect(Rect::new(0, 0, 512, 1024))
        }
    }

    let ctx = context();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);

    let mut pass = RenderPass::new();
    let mut data = AppendQuadsData::default();
    layer.append_quads(DrawMode::Hardware, &HalfOccluded, &mut pass, &mut data);

    assert_eq!(pass.quads().len(), 2);
    for quad in pass.quads() {
        assert!(quad.visible_geometry_rect.right() <= 512);
    }
    assert_eq!(data.visible_content_area, 512 * 1000);
}

#[test]
fn resourceless_software_mode_emits_one_picture_quad() {
    let ctx = context();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);

    let mut pass = RenderPass::new();
    let mut data = AppendQuadsData::default();
    let seen = layer.append_quads(
        DrawMode::ResourcelessSoftware,
        &NoOcclusion,
        &mut pass,
        &mut data,
    );
    assert!(seen.is_empty());
    assert_eq!(pass.quads().len(), 1);
    assert!(matches!(
        pass.quads()[0].material,
        QuadMaterial::Picture { .. }
    ));
    assert_eq!(pass.quads()[0].geometry_rect, Rect::new(0, 0, 1000, 1000));
}

#[test]
fn cleanup_retires_stale_tilings_but_never_high_or_low_res() {
    let ctx = context();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 3.0);
    let mut ctx3 = ctx;
    ctx3.device_scale_factor = 3.0;
    update(&mut layer, &ctx3);
    assert_eq!(layer.tilings().scales(), vec![3.0, 0.75]);

    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);
    assert_eq!(layer.tilings().scales(), vec![3.0, 1.0, 0.75, 0.25]);

    let removed_for_twin = layer.cleanup_tilings_on_active_layer(&[1.0], None);
    assert!(removed_for_twin.is_empty());
    assert_eq!(layer.tilings().scales(), vec![1.0, 0.25]);

    // A used tiling outside the range survives the pass.
    set_ideal(&mut layer, 3.0);
    update(&mut layer, &ctx3);
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);
    layer.cleanup_tilings_on_active_layer(&[1.0, 3.0], None);
    assert!(layer.tilings().tiling_at_scale(3.0).is_some());
}

#[test]
fn cleanup_reports_scales_to_drop_from_the_twin() {
    let ctx = context();
    let mut layer = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut layer, 3.0);
    let mut ctx3 = ctx;
    ctx3.device_scale_factor = 3.0;
    update(&mut layer, &ctx3);
    set_ideal(&mut layer, 1.0);
    update(&mut layer, &ctx);

    // Twin still holds the 3.0 tiling, demoted to non-ideal.
    let mut twin = drawn_layer(Size::new(1000, 1000));
    set_ideal(&mut twin, 3.0);
    update(&mut twin, &ctx3);
    set_ideal(&mut twin, 1.0);
    update(&mut twin, &ctx);

    let removed_for_twin = layer.cleanup_tilings_on_active_layer(&[1.0], Some(&twin));
    assert!(removed_for_twin.contains(&3.0));
    assert!(layer.tilings().tiling_at_scale(3.0).is_none());
}
