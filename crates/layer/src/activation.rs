//! Activation readiness: decide the minimal tile set that must be rastered
//! before a pending tree may replace the active tree without flashing
//! lower-quality content over what is already on screen.

use geometry::Region;
use tiling::{TileIndex, TileResolution, Tiling};

use crate::layer::PictureLayer;

impl PictureLayer {
    /// Pending tree only. Three passes over the visible rect: ready tiles of
    /// acceptable non-ideal tilings stand in first, then high-res tiles fill
    /// what is still missing (skipping cells the active twin is equally
    /// missing), then the low-res tiling backstops the skipped cells.
    pub fn mark_visible_resources_as_required(
        &mut self,
        twin: Option<&PictureLayer>,
        requires_high_res_to_draw: bool,
    ) {
        if self.tilings().num_tilings() == 0 {
            return;
        }
        let rect = self.draw_properties.visible_layer_rect;
        if rect.is_empty() {
            return;
        }

        let mut min_acceptable_scale =
            self.raster_contents_scale().min(self.ideal_contents_scale());
        if let Some(twin_layer) = twin {
            let twin_min = twin_layer
                .raster_contents_scale()
                .min(twin_layer.ideal_contents_scale());
            // A twin that has never been updated reports zero; ignore it.
            if twin_min != 0.0 {
                min_acceptable_scale = min_acceptable_scale.min(twin_min);
            }
        }

        let high_res_scale = self
            .tilings()
            .high_res_tiling()
            .map(Tiling::contents_scale)
            .unwrap_or_else(|| panic!("pending layer has tilings but no high-res tiling"));
        let low_res_scale = self.tilings().low_res_tiling().map(Tiling::contents_scale);

        // Pass 1: ready tiles at acceptable non-ideal scales already cover
        // part of the visible rect; nothing else is required there.
        let mut missing = Region::from_rect(rect);
        let mut marks: Vec<(f32, TileIndex)> = Vec::new();
        for owned_tiling in self.tilings().tilings() {
            if owned_tiling.resolution() == TileResolution::High {
                continue;
            }
            if owned_tiling.contents_scale() < min_acceptable_scale {
                continue;
            }
            for piece in owned_tiling.coverage(1.0, rect) {
                let Some(tile) = piece.tile else { continue };
                if !tile.is_ready_to_draw() {
                    continue;
                }
                missing.subtract_rect(piece.geometry_rect);
                marks.push((owned_tiling.contents_scale(), tile.index()));
            }
        }

        // The twin comparison is only sound for simple tiling
        // configurations drawn at the same place on screen.
        let use_twin = match twin {
            Some(twin_layer) => {
                self.tilings().num_tilings() <= 2
                    && twin_layer.tilings().num_tilings() <= self.tilings().num_tilings()
                    && low_res_scale
                        .is_none_or(|scale| twin_layer.tilings().tiling_at_scale(scale).is_some())
                    && twin_layer.tilings().tiling_at_scale(high_res_scale).is_some()
                    && !requires_high_res_to_draw
                    && self.bounds() == twin_layer.bounds()
                    && self.draw_properties.screen_space_transform
                        == twin_layer.draw_properties.screen_space_transform
            }
            None => false,
        };
        let twin_high_res = if use_twin {
            twin.and_then(|twin_layer| twin_layer.tilings().tiling_at_scale(high_res_scale))
        } else {
            None
        };
        let twin_low_res = if use_twin {
            low_res_scale
                .and_then(|scale| twin.and_then(|t| t.tilings().tiling_at_scale(scale)))
        } else {
            None
        };

        // Pass 2: high-res tiles fill the remaining missing region, except
        // where the twin would show the same gap anyway.
        let mut twin_had_missing_tile = false;
        let high_res = self
            .tilings()
            .tiling_at_scale(high_res_scale)
            .unwrap_or_else(|| panic!("high-res tiling at scale {high_res_scale} missing"));
        for piece in high_res.coverage(1.0, rect) {
            let Some(tile) = piece.tile else { continue };
            if !missing.intersects(piece.geometry_rect) {
                continue;
            }
            if let Some(twin_tiling) = twin_high_res {
                match twin_tiling.tile_at(tile.index()) {
                    None => {
                        twin_had_missing_tile = true;
                        continue;
                    }
                    Some(twin_tile) if twin_tile.content_key() == tile.content_key() => {
                        twin_had_missing_tile = true;
                        continue;
                    }
                    Some(_) => {}
                }
            }
            marks.push((high_res_scale, tile.index()));
        }

        // Pass 3: when pass 2 relied on the twin's gaps, require the low-res
        // fallback so both trees at least show something there.
        if twin_had_missing_tile
            && let Some(low_scale) = low_res_scale
        {
            let low_res = self
                .tilings()
                .tiling_at_scale(low_scale)
                .unwrap_or_else(|| panic!("low-res tiling at scale {low_scale} missing"));
            for piece in low_res.coverage(1.0, rect) {
                let Some(tile) = piece.tile else { continue };
                if !missing.intersects(piece.geometry_rect) {
                    continue;
                }
                if let Some(twin_tiling) = twin_low_res {
                    match twin_tiling.tile_at(tile.index()) {
                        None => continue,
                        Some(twin_tile) if twin_tile.content_key() == tile.content_key() => {
                            continue;
                        }
                        Some(_) => {}
                    }
                }
                marks.push((low_scale, tile.index()));
            }
        }

        for (scale, index) in marks {
            if let Some(tile) = self
                .tilings_mut()
                .tiling_at_scale_mut(scale)
                .and_then(|owned_tiling| owned_tiling.tile_at_mut(index))
            {
                tile.mark_required_for_activation();
            }
        }
    }
}
