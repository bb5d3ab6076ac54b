//! One resolution-scaled tiling of a layer: tile residency, priorities,
//! coverage iteration, and per-tiling raster/eviction walks.

use std::collections::{BTreeMap, HashSet};

use draw_protocol::ResourceId;
use geometry::{Rect, RectF, Region, Size, enclosing_scaled_rect, expand_rect_to_area,
    scale_coord_floor, scale_size_ceil};
use smallvec::SmallVec;

use crate::grid::TileGrid;
use crate::tile::{PriorityBin, Tile, TileContent, TileIndex, TilePriority, TileResolution};

/// Request handed to the owning layer when a tiling needs a tile created.
#[derive(Debug, Clone, Copy)]
pub struct TileRequest {
    pub contents_scale: f32,
    pub index: TileIndex,
    pub content_rect: Rect,
}

/// What the owning layer supplies for a newly created tile. `None` from the
/// factory is a policy refusal (the recording cannot raster that rect); no
/// tile is created.
#[derive(Debug, Clone, Copy)]
pub struct TileSeed {
    pub opaque_rect: Rect,
    pub content: TileContent,
    pub content_key: u64,
    pub source_frame_number: u64,
}

pub trait TileFactory {
    fn create_tile(&mut self, request: &TileRequest) -> Option<TileSeed>;
}

/// Inputs for one priority-update pass over a tiling.
#[derive(Debug, Clone, Copy)]
pub struct PriorityUpdateInputs {
    pub visible_rect_in_layer_space: Rect,
    pub frame_time_seconds: f64,
    /// How many frame-deltas ahead the skewport extrapolates.
    pub skewport_target_time_multiplier: f32,
    pub skewport_extrapolation_limit_in_content_pixels: i32,
    /// False disables the skewport entirely (GPU rasterization active).
    pub skewport_enabled: bool,
    pub max_tiles_for_interest_area: i64,
}

#[derive(Debug)]
pub struct Tiling {
    contents_scale: f32,
    resolution: TileResolution,
    layer_bounds: Size,
    grid: TileGrid,
    tiles: BTreeMap<TileIndex, Tile>,
    released_resources: Vec<ResourceId>,
    live_tiles_rect: Rect,
    current_visible_rect: Rect,
    current_skewport_rect: Rect,
    current_eventually_rect: Rect,
    last_visible_rect: Rect,
    last_frame_time_seconds: Option<f64>,
    has_ever_been_updated: bool,
}

impl Tiling {
    pub fn new(contents_scale: f32, layer_bounds: Size, tile_size: Size) -> Self {
        assert!(
            contents_scale > 0.0,
            "tiling contents scale must be positive, got {contents_scale}"
        );
        let content_bounds = scale_size_ceil(layer_bounds, contents_scale);
        Self {
            contents_scale,
            resolution: TileResolution::NonIdeal,
            layer_bounds,
            grid: TileGrid::new(tile_size, content_bounds),
            tiles: BTreeMap::new(),
            released_resources: Vec::new(),
            live_tiles_rect: Rect::default(),
            current_visible_rect: Rect::default(),
            current_skewport_rect: Rect::default(),
            current_eventually_rect: Rect::default(),
            last_visible_rect: Rect::default(),
            last_frame_time_seconds: None,
            has_ever_been_updated: false,
        }
    }

    pub fn contents_scale(&self) -> f32 {
        self.contents_scale
    }

    pub fn resolution(&self) -> TileResolution {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: TileResolution) {
        self.resolution = resolution;
        for tile in self.tiles.values_mut() {
            let mut priority = tile.priority();
            priority.resolution = resolution;
            tile.set_priority(priority);
        }
    }

    pub fn layer_bounds(&self) -> Size {
        self.layer_bounds
    }

    pub fn content_bounds(&self) -> Size {
        self.grid.content_bounds()
    }

    pub fn tile_size(&self) -> Size {
        self.grid.tile_size()
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn has_ever_been_updated(&self) -> bool {
        self.has_ever_been_updated
    }

    pub fn current_visible_rect(&self) -> Rect {
        self.current_visible_rect
    }

    pub fn live_tiles_rect(&self) -> Rect {
        self.live_tiles_rect
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn tile_at(&self, index: TileIndex) -> Option<&Tile> {
        self.tiles.get(&index)
    }

    pub fn tile_at_mut(&mut self, index: TileIndex) -> Option<&mut Tile> {
        self.tiles.get_mut(&index)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn tiles_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.values_mut()
    }

    /// Resizes the tiling to new layer bounds. Tiles entirely outside the new
    /// content bounds are dropped; the rest keep their pixels.
    pub fn set_layer_bounds(&mut self, layer_bounds: Size, tile_size: Size) {
        let content_bounds = scale_size_ceil(layer_bounds, self.contents_scale);
        self.layer_bounds = layer_bounds;
        self.grid = TileGrid::new(tile_size, content_bounds);
        let grid = self.grid;
        let released = &mut self.released_resources;
        self.tiles.retain(|index, tile| {
            let keep =
                grid.contains_index(*index) && grid.tile_bounds(*index) == tile.content_rect();
            if !keep && let Some(id) = tile.take_resource() {
                released.push(id);
            }
            keep
        });
    }

    /// Drops tiles whose content intersects `layer_region` so stale pixels
    /// are never drawn; they are recreated on the next priority update.
    pub fn remove_tiles_in_region(&mut self, layer_region: &Region) -> usize {
        let mut removed = 0;
        for rect in layer_region.rects() {
            let content_rect = enclosing_scaled_rect(*rect, 1.0, self.contents_scale);
            let doomed: Vec<TileIndex> = self
                .grid
                .indices_intersecting(content_rect)
                .filter(|index| self.tiles.contains_key(index))
                .collect();
            for index in doomed {
                if let Some(mut tile) = self.tiles.remove(&index) {
                    if let Some(id) = tile.take_resource() {
                        self.released_resources.push(id);
                    }
                    removed += 1;
                }
            }
        }
        removed
    }

    pub fn remove_all_tiles(&mut self) {
        for tile in self.tiles.values_mut() {
            if let Some(id) = tile.take_resource() {
                self.released_resources.push(id);
            }
        }
        self.tiles.clear();
        self.live_tiles_rect = Rect::default();
    }

    /// Drains the resources freed by tile removal since the last call, so the
    /// owner can return them to its pool.
    pub fn take_released_resources(&mut self) -> Vec<ResourceId> {
        std::mem::take(&mut self.released_resources)
    }

    /// Recomputes the visible/skewport/eventually rects, prunes tiles outside
    /// the interest area, creates missing tiles inside it, and reassigns
    /// every resident tile's priority.
    pub fn update_tile_priorities(
        &mut self,
        inputs: &PriorityUpdateInputs,
        factory: &mut dyn TileFactory,
    ) {
        let content_rect = Rect::from_size(self.grid.content_bounds());
        let visible = enclosing_scaled_rect(
            inputs.visible_rect_in_layer_space,
            1.0,
            self.contents_scale,
        );
        let skewport = self.compute_skewport(visible, inputs);

        let tile_area = self.grid.tile_size().area();
        let interest_area = inputs.max_tiles_for_interest_area.max(1) * tile_area;
        let eventually = expand_rect_to_area(
            visible.intersect(content_rect),
            interest_area,
            content_rect,
        )
        .union(skewport.intersect(content_rect))
        .intersect(content_rect);

        self.live_tiles_rect = eventually;
        let grid = self.grid;
        let released = &mut self.released_resources;
        self.tiles.retain(|index, tile| {
            let keep = grid.tile_bounds(*index).intersects(eventually);
            if !keep && let Some(id) = tile.take_resource() {
                released.push(id);
            }
            keep
        });

        for index in grid.indices_intersecting(eventually) {
            if self.tiles.contains_key(&index) {
                continue;
            }
            let request = TileRequest {
                contents_scale: self.contents_scale,
                index,
                content_rect: grid.tile_bounds(index),
            };
            if let Some(seed) = factory.create_tile(&request) {
                self.tiles.insert(
                    index,
                    Tile::new(
                        index,
                        request.content_rect,
                        self.contents_scale,
                        seed.opaque_rect,
                        seed.content,
                        seed.content_key,
                        seed.source_frame_number,
                    ),
                );
            }
        }

        let resolution = self.resolution;
        for tile in self.tiles.values_mut() {
            let bounds = tile.content_rect();
            let (bin, distance) = if bounds.intersects(visible) {
                (PriorityBin::Now, 0.0)
            } else if bounds.intersects(skewport) {
                (PriorityBin::Soon, visible.manhattan_distance(bounds))
            } else {
                (PriorityBin::Eventually, visible.manhattan_distance(bounds))
            };
            tile.set_priority(TilePriority {
                resolution,
                bin,
                distance_to_visible: distance,
            });
        }

        self.current_visible_rect = visible;
        self.current_skewport_rect = skewport;
        self.current_eventually_rect = eventually;
        self.last_visible_rect = visible;
        self.last_frame_time_seconds = Some(inputs.frame_time_seconds);
        self.has_ever_been_updated = true;
    }

    /// Extrapolates each visible-rect edge ahead of its motion, clamped to
    /// the configured limit, and unions the result with the visible rect.
    fn compute_skewport(&self, visible: Rect, inputs: &PriorityUpdateInputs) -> Rect {
        if !inputs.skewport_enabled || visible.is_empty() {
            return visible;
        }
        let Some(last_time) = self.last_frame_time_seconds else {
            return visible;
        };
        if inputs.frame_time_seconds <= last_time || self.last_visible_rect.is_empty() {
            return visible;
        }
        let multiplier = inputs.skewport_target_time_multiplier as f64;
        let limit = inputs.skewport_extrapolation_limit_in_content_pixels;
        let extrapolate = |new_edge: i32, old_edge: i32| -> i32 {
            let delta = ((new_edge - old_edge) as f64 * multiplier) as i32;
            new_edge + delta.clamp(-limit, limit)
        };
        let old = self.last_visible_rect;
        let left = extrapolate(visible.x, old.x);
        let top = extrapolate(visible.y, old.y);
        let right = extrapolate(visible.right(), old.right());
        let bottom = extrapolate(visible.bottom(), old.bottom());
        if right <= left || bottom <= top {
            return visible;
        }
        Rect::from_edges(left, top, right, bottom).union(visible)
    }

    /// Content bounds mapped into coverage space with the same monotone edge
    /// mapping coverage iteration uses.
    pub fn content_bounds_in_coverage_space(&self, coverage_scale: f32) -> Rect {
        let bounds = self.grid.content_bounds();
        Rect::from_edges(
            0,
            0,
            scale_coord_floor(bounds.width, self.contents_scale, coverage_scale),
            scale_coord_floor(bounds.height, self.contents_scale, coverage_scale),
        )
    }

    /// Geometric walk of `dest_rect` (given in coverage space at
    /// `coverage_scale`): yields disjoint geometry rects whose union is
    /// exactly `dest_rect` clipped to this tiling's coverage-space bounds.
    pub fn coverage(&self, coverage_scale: f32, dest_rect: Rect) -> CoverageIterator<'_> {
        CoverageIterator::new(self, coverage_scale, dest_rect)
    }

    /// Tiles needing raster work, in Visible -> Skewport -> Eventually phase
    /// order (scanline within each phase).
    pub fn raster_iterator(&self) -> TilingRasterIterator<'_> {
        TilingRasterIterator::new(self)
    }

    /// Resource-holding tiles of exactly one eviction category, farthest
    /// from the visible rect first.
    pub fn eviction_category_iterator(
        &self,
        bin: PriorityBin,
        required_for_activation: bool,
    ) -> impl Iterator<Item = &Tile> {
        let mut candidates: Vec<&Tile> = self
            .tiles
            .values()
            .filter(|tile| {
                tile.content().holds_resource()
                    && tile.priority().bin == bin
                    && tile.required_for_activation() == required_for_activation
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.priority()
                .distance_to_visible
                .total_cmp(&a.priority().distance_to_visible)
        });
        candidates.into_iter()
    }
}

/// One yielded cell of a coverage walk.
#[derive(Debug, Clone, Copy)]
pub struct CoveragePiece<'a> {
    /// Coverage-space rect this piece is responsible for.
    pub geometry_rect: Rect,
    pub index: TileIndex,
    pub tile: Option<&'a Tile>,
    /// Sub-rect of the tile's content the geometry maps to.
    pub texture_rect: RectF,
}

#[derive(Debug)]
pub struct CoverageIterator<'a> {
    tiling: &'a Tiling,
    coverage_scale: f32,
    dest_rect: Rect,
    indices: crate::grid::IndexIter,
}

impl<'a> CoverageIterator<'a> {
    fn new(tiling: &'a Tiling, coverage_scale: f32, dest_rect: Rect) -> Self {
        assert!(
            coverage_scale > 0.0,
            "coverage scale must be positive, got {coverage_scale}"
        );
        let dest_rect = dest_rect.intersect(tiling.content_bounds_in_coverage_space(coverage_scale));
        // Map the dest rect back into content space to find candidate cells.
        let content_rect = enclosing_scaled_rect(dest_rect, coverage_scale, tiling.contents_scale);
        Self {
            tiling,
            coverage_scale,
            dest_rect,
            indices: tiling.grid.indices_intersecting(content_rect),
        }
    }
}

impl<'a> Iterator for CoverageIterator<'a> {
    type Item = CoveragePiece<'a>;

    fn next(&mut self) -> Option<CoveragePiece<'a>> {
        loop {
            let index = self.indices.next()?;
            let cell = self.tiling.grid.tile_bounds(index);
            let source_scale = self.tiling.contents_scale;
            let map = |edge: i32| scale_coord_floor(edge, source_scale, self.coverage_scale);
            let geometry = Rect::from_edges(
                map(cell.x).max(self.dest_rect.x),
                map(cell.y).max(self.dest_rect.y),
                map(cell.right()).min(self.dest_rect.right()),
                map(cell.bottom()).min(self.dest_rect.bottom()),
            );
            if geometry.width <= 0 || geometry.height <= 0 {
                continue;
            }
            let ratio = (source_scale as f64) / (self.coverage_scale as f64);
            let texture_rect = RectF::new(
                ((geometry.x as f64) * ratio) as f32 - cell.x as f32,
                ((geometry.y as f64) * ratio) as f32 - cell.y as f32,
                ((geometry.width as f64) * ratio) as f32,
                ((geometry.height as f64) * ratio) as f32,
            );
            return Some(CoveragePiece {
                geometry_rect: geometry,
                index,
                tile: self.tiling.tile_at(index),
                texture_rect,
            });
        }
    }
}

/// Raster phase order for one tiling.
const RASTER_PHASES: [PriorityBin; 3] =
    [PriorityBin::Now, PriorityBin::Soon, PriorityBin::Eventually];

#[derive(Debug)]
pub struct TilingRasterIterator<'a> {
    tiling: &'a Tiling,
    phase: usize,
    phase_rects: SmallVec<[Rect; 4]>,
    rect_cursor: usize,
    indices: Option<crate::grid::IndexIter>,
    visited: HashSet<TileIndex>,
}

impl<'a> TilingRasterIterator<'a> {
    fn new(tiling: &'a Tiling) -> Self {
        let mut iterator = Self {
            tiling,
            phase: 0,
            phase_rects: SmallVec::new(),
            rect_cursor: 0,
            indices: None,
            visited: HashSet::new(),
        };
        iterator.enter_phase(0);
        iterator
    }

    fn rects_for_phase(&self, phase: usize) -> SmallVec<[Rect; 4]> {
        match RASTER_PHASES[phase] {
            PriorityBin::Now => {
                let mut rects = SmallVec::new();
                rects.push(self.tiling.current_visible_rect);
                rects
            }
            PriorityBin::Soon => {
                let mut region = Region::from_rect(self.tiling.current_skewport_rect);
                region.subtract_rect(self.tiling.current_visible_rect);
                region.rects().iter().copied().collect()
            }
            PriorityBin::Eventually => {
                let mut region = Region::from_rect(self.tiling.current_eventually_rect);
                region.subtract_rect(self.tiling.current_skewport_rect);
                region.subtract_rect(self.tiling.current_visible_rect);
                region.rects().iter().copied().collect()
            }
        }
    }

    fn enter_phase(&mut self, phase: usize) {
        self.phase = phase;
        if phase >= RASTER_PHASES.len() {
            self.phase_rects.clear();
            self.indices = None;
            return;
        }
        self.phase_rects = self.rects_for_phase(phase);
        self.rect_cursor = 0;
        self.indices = self
            .phase_rects
            .first()
            .map(|rect| self.tiling.grid.indices_intersecting(*rect));
    }

    pub fn current_bin(&self) -> Option<PriorityBin> {
        RASTER_PHASES.get(self.phase).copied()
    }
}

impl<'a> Iterator for TilingRasterIterator<'a> {
    type Item = &'a Tile;

    fn next(&mut self) -> Option<&'a Tile> {
        loop {
            if self.phase >= RASTER_PHASES.len() {
                return None;
            }
            let Some(indices) = self.indices.as_mut() else {
                self.enter_phase(self.phase + 1);
                continue;
            };
            let Some(index) = indices.next() else {
                self.rect_cursor += 1;
                if let Some(rect) = self.phase_rects.get(self.rect_cursor) {
                    self.indices = Some(self.tiling.grid.indices_intersecting(*rect));
                } else {
                    self.enter_phase(self.phase + 1);
                }
                continue;
            };
            if !self.visited.insert(index) {
                continue;
            }
            if let Some(tile) = self.tiling.tile_at(index)
                && tile.needs_raster()
            {
                return Some(tile);
            }
        }
    }
}
