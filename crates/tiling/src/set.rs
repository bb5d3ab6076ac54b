//! All tilings of one layer, ordered by contents scale, plus the multi-scale
//! coverage walk that picks the best available tile for every destination
//! cell.

use std::fmt;

use draw_protocol::ResourceId;
use geometry::{Rect, RectF, Region, Size};
use log::debug;

use crate::tile::{Tile, TileResolution};
use crate::tiling::{CoverageIterator, Tiling};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddTilingError {
    ScaleBelowMinimum { scale: f32, minimum: f32 },
    DuplicateScale(f32),
}

impl fmt::Display for AddTilingError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddTilingError::ScaleBelowMinimum { scale, minimum } => write!(
                formatter,
                "contents scale {scale} is below the minimum {minimum}"
            ),
            AddTilingError::DuplicateScale(scale) => {
                write!(formatter, "a tiling at contents scale {scale} already exists")
            }
        }
    }
}

impl std::error::Error for AddTilingError {}

/// Tilings for one layer, sorted by contents scale descending. At most one
/// tiling is `High` resolution and at most one is `Low`.
#[derive(Debug, Default)]
pub struct TilingSet {
    tilings: Vec<Tiling>,
    released_resources: Vec<ResourceId>,
}

impl TilingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_tilings(&self) -> usize {
        self.tilings.len()
    }

    pub fn tilings(&self) -> impl Iterator<Item = &Tiling> {
        self.tilings.iter()
    }

    pub fn tilings_mut(&mut self) -> impl Iterator<Item = &mut Tiling> {
        self.tilings.iter_mut()
    }

    pub fn tiling_at(&self, index: usize) -> &Tiling {
        &self.tilings[index]
    }

    pub fn tiling_at_mut(&mut self, index: usize) -> &mut Tiling {
        &mut self.tilings[index]
    }

    pub fn tiling_at_scale(&self, contents_scale: f32) -> Option<&Tiling> {
        self.tilings
            .iter()
            .find(|tiling| tiling.contents_scale() == contents_scale)
    }

    pub fn tiling_at_scale_mut(&mut self, contents_scale: f32) -> Option<&mut Tiling> {
        self.tilings
            .iter_mut()
            .find(|tiling| tiling.contents_scale() == contents_scale)
    }

    pub fn high_res_tiling(&self) -> Option<&Tiling> {
        self.tilings
            .iter()
            .find(|tiling| tiling.resolution() == TileResolution::High)
    }

    pub fn low_res_tiling(&self) -> Option<&Tiling> {
        self.tilings
            .iter()
            .find(|tiling| tiling.resolution() == TileResolution::Low)
    }

    pub fn scales(&self) -> Vec<f32> {
        self.tilings
            .iter()
            .map(|tiling| tiling.contents_scale())
            .collect()
    }

    pub fn add_tiling(
        &mut self,
        tiling: Tiling,
        minimum_contents_scale: f32,
    ) -> Result<&mut Tiling, AddTilingError> {
        let scale = tiling.contents_scale();
        if scale < minimum_contents_scale {
            return Err(AddTilingError::ScaleBelowMinimum {
                scale,
                minimum: minimum_contents_scale,
            });
        }
        if self.tiling_at_scale(scale).is_some() {
            return Err(AddTilingError::DuplicateScale(scale));
        }
        debug!("adding tiling at contents scale {scale}");
        let position = self
            .tilings
            .iter()
            .position(|existing| existing.contents_scale() < scale)
            .unwrap_or(self.tilings.len());
        self.tilings.insert(position, tiling);
        self.assert_resolutions_valid();
        Ok(&mut self.tilings[position])
    }

    /// Removes the tiling at `contents_scale`. Its resources are surfaced
    /// through `take_released_resources`; the returned tiling is empty.
    pub fn remove_tiling_at_scale(&mut self, contents_scale: f32) -> Option<Tiling> {
        let position = self
            .tilings
            .iter()
            .position(|tiling| tiling.contents_scale() == contents_scale)?;
        debug!("removing tiling at contents scale {contents_scale}");
        let mut removed = self.tilings.remove(position);
        removed.remove_all_tiles();
        self.released_resources
            .extend(removed.take_released_resources());
        Some(removed)
    }

    pub fn remove_all_tilings(&mut self) {
        for mut tiling in self.tilings.drain(..) {
            tiling.remove_all_tiles();
            self.released_resources
                .extend(tiling.take_released_resources());
        }
    }

    pub fn remove_all_tiles(&mut self) {
        for tiling in &mut self.tilings {
            tiling.remove_all_tiles();
        }
    }

    /// Drains the resources freed by tile and tiling removal since the last
    /// call, so the owner can return them to its pool.
    pub fn take_released_resources(&mut self) -> Vec<ResourceId> {
        let mut released = std::mem::take(&mut self.released_resources);
        for tiling in &mut self.tilings {
            released.extend(tiling.take_released_resources());
        }
        released
    }

    pub fn mark_all_non_ideal(&mut self) {
        for tiling in &mut self.tilings {
            tiling.set_resolution(TileResolution::NonIdeal);
        }
    }

    pub fn remove_tiles_in_region(&mut self, layer_region: &Region) {
        for tiling in &mut self.tilings {
            tiling.remove_tiles_in_region(layer_region);
        }
    }

    /// Returns an existing tiling's scale when it is within `snap_ratio` of
    /// `start_scale`, so callers reuse it instead of churning a near-duplicate
    /// tiling.
    pub fn snapped_contents_scale(&self, start_scale: f32, snap_ratio: f32) -> Option<f32> {
        let mut best: Option<(f32, f32)> = None;
        for tiling in &self.tilings {
            let scale = tiling.contents_scale();
            let ratio = (scale / start_scale).max(start_scale / scale);
            if ratio < snap_ratio && best.is_none_or(|(best_ratio, _)| ratio < best_ratio) {
                best = Some((ratio, scale));
            }
        }
        best.map(|(_, scale)| scale)
    }

    /// Mirrors the twin set's tilings onto this set: drops tilings the twin
    /// no longer has or that fall below `minimum_contents_scale`, resizes and
    /// invalidates the survivors, and creates tilings the twin has that this
    /// set lacks. Resolutions follow the twin. Returns true iff a tiling with
    /// the twin's `High` resolution ended up in this set.
    pub fn sync_tilings(
        &mut self,
        twin: &TilingSet,
        new_layer_bounds: Size,
        invalidation: &Region,
        minimum_contents_scale: f32,
        tile_size_for: &mut dyn FnMut(Size) -> Size,
    ) -> bool {
        if new_layer_bounds.is_empty() {
            self.remove_all_tilings();
            return false;
        }

        let mut kept = Vec::with_capacity(self.tilings.len());
        for mut tiling in self.tilings.drain(..) {
            if tiling.contents_scale() >= minimum_contents_scale
                && twin.tiling_at_scale(tiling.contents_scale()).is_some()
            {
                kept.push(tiling);
            } else {
                tiling.remove_all_tiles();
                self.released_resources
                    .extend(tiling.take_released_resources());
            }
        }
        self.tilings = kept;

        let mut has_high_res = false;
        for tiling in &mut self.tilings {
            let twin_tiling = twin
                .tiling_at_scale(tiling.contents_scale())
                .unwrap_or_else(|| {
                    panic!(
                        "twin tiling at scale {} disappeared during sync",
                        tiling.contents_scale()
                    )
                });
            let content_bounds =
                geometry::scale_size_ceil(new_layer_bounds, tiling.contents_scale());
            tiling.set_layer_bounds(new_layer_bounds, tile_size_for(content_bounds));
            tiling.remove_tiles_in_region(invalidation);
            tiling.set_resolution(twin_tiling.resolution());
            has_high_res |= twin_tiling.resolution() == TileResolution::High;
        }

        for twin_tiling in twin.tilings() {
            let scale = twin_tiling.contents_scale();
            if scale < minimum_contents_scale || self.tiling_at_scale(scale).is_some() {
                continue;
            }
            let content_bounds = geometry::scale_size_ceil(new_layer_bounds, scale);
            let mut tiling = Tiling::new(scale, new_layer_bounds, tile_size_for(content_bounds));
            tiling.set_resolution(twin_tiling.resolution());
            has_high_res |= twin_tiling.resolution() == TileResolution::High;
            let position = self
                .tilings
                .iter()
                .position(|existing| existing.contents_scale() < scale)
                .unwrap_or(self.tilings.len());
            self.tilings.insert(position, tiling);
        }
        self.assert_resolutions_valid();
        has_high_res
    }

    /// Tilings ordered for eviction: scales above high res ascending, then
    /// scales below high res descending (low res excluded), then low res,
    /// then high res last.
    pub fn tilings_in_eviction_order(&self) -> Vec<&Tiling> {
        let Some(high_res_scale) = self
            .high_res_tiling()
            .map(|tiling| tiling.contents_scale())
        else {
            // Without a high-res tiling everything is equally expendable;
            // lowest scale first.
            return self.tilings.iter().rev().collect();
        };
        let mut order: Vec<&Tiling> = Vec::with_capacity(self.tilings.len());
        // tilings is sorted descending, so reversed iteration is ascending.
        order.extend(
            self.tilings
                .iter()
                .rev()
                .filter(|tiling| tiling.contents_scale() > high_res_scale),
        );
        order.extend(self.tilings.iter().filter(|tiling| {
            tiling.contents_scale() < high_res_scale
                && tiling.resolution() != TileResolution::Low
        }));
        order.extend(self.low_res_tiling());
        order.extend(self.high_res_tiling());
        order
    }

    /// Multi-scale coverage walk of `dest_rect` (coverage space at
    /// `coverage_scale`). Prefers the tiling closest in scale to
    /// `ideal_contents_scale`; cells it has no tile for fall through to the
    /// next-closest tiling; cells no tiling covers are yielded without a
    /// tile.
    pub fn coverage(
        &self,
        coverage_scale: f32,
        ideal_contents_scale: f32,
        dest_rect: Rect,
    ) -> SetCoverageIterator<'_> {
        SetCoverageIterator::new(self, coverage_scale, ideal_contents_scale, dest_rect)
    }

    fn assert_resolutions_valid(&self) {
        let high = self
            .tilings
            .iter()
            .filter(|tiling| tiling.resolution() == TileResolution::High)
            .count();
        let low = self
            .tilings
            .iter()
            .filter(|tiling| tiling.resolution() == TileResolution::Low)
            .count();
        assert!(
            high <= 1 && low <= 1,
            "tiling set holds {high} high-res and {low} low-res tilings"
        );
    }
}

/// One yielded cell of a multi-scale coverage walk.
#[derive(Debug, Clone, Copy)]
pub struct SetCoveragePiece<'a> {
    pub geometry_rect: Rect,
    /// Tile chosen for this cell, or `None` when no tiling covers it.
    pub source: Option<SetCoverageTile<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct SetCoverageTile<'a> {
    pub tile: &'a Tile,
    pub contents_scale: f32,
    pub resolution: TileResolution,
    pub texture_rect: RectF,
}

/// Explicit state machine: walks one tiling at a time over the rects still
/// uncovered, collecting tileless geometry for the next tiling, and finally
/// yields whatever nobody covered.
#[derive(Debug)]
pub struct SetCoverageIterator<'a> {
    ordered_tilings: Vec<&'a Tiling>,
    coverage_scale: f32,
    tiling_cursor: usize,
    current_rects: Vec<Rect>,
    rect_cursor: usize,
    inner: Option<CoverageIterator<'a>>,
    next_remaining: Region,
    leftovers: Vec<Rect>,
    leftover_cursor: usize,
    exhausted_tilings: bool,
}

impl<'a> SetCoverageIterator<'a> {
    fn new(
        set: &'a TilingSet,
        coverage_scale: f32,
        ideal_contents_scale: f32,
        dest_rect: Rect,
    ) -> Self {
        assert!(
            ideal_contents_scale > 0.0,
            "ideal contents scale must be positive, got {ideal_contents_scale}"
        );
        let mut ordered_tilings: Vec<&Tiling> = set.tilings.iter().collect();
        let closeness = |tiling: &Tiling| {
            let scale = tiling.contents_scale();
            (scale / ideal_contents_scale).max(ideal_contents_scale / scale)
        };
        ordered_tilings.sort_by(|a, b| {
            closeness(a)
                .partial_cmp(&closeness(b))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.contents_scale()
                        .partial_cmp(&a.contents_scale())
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        let mut iterator = Self {
            ordered_tilings,
            coverage_scale,
            tiling_cursor: 0,
            current_rects: if dest_rect.is_empty() {
                Vec::new()
            } else {
                vec![dest_rect]
            },
            rect_cursor: 0,
            inner: None,
            next_remaining: Region::new(),
            leftovers: Vec::new(),
            leftover_cursor: 0,
            exhausted_tilings: false,
        };
        iterator.start_current_rect();
        iterator
    }

    /// Begins the inner walk for `current_rects[rect_cursor]` against the
    /// current tiling, routing the parts outside the tiling's bounds straight
    /// to the next tiling's work list.
    fn start_current_rect(&mut self) {
        if self.exhausted_tilings {
            return;
        }
        loop {
            let Some(tiling) = self.ordered_tilings.get(self.tiling_cursor) else {
                self.exhausted_tilings = true;
                self.leftovers = std::mem::take(&mut self.current_rects);
                self.leftover_cursor = 0;
                self.inner = None;
                return;
            };
            if let Some(rect) = self.current_rects.get(self.rect_cursor).copied() {
                let bounds = tiling.content_bounds_in_coverage_space(self.coverage_scale);
                let mut outside = Region::from_rect(rect);
                outside.subtract_rect(bounds);
                self.next_remaining.union_region(&outside);
                self.inner = Some(tiling.coverage(self.coverage_scale, rect));
                return;
            }
            // This tiling is done; whatever it left uncovered goes to the
            // next one.
            self.tiling_cursor += 1;
            self.current_rects = std::mem::take(&mut self.next_remaining).take_rects();
            self.rect_cursor = 0;
            if self.current_rects.is_empty() {
                self.exhausted_tilings = true;
                self.inner = None;
                return;
            }
        }
    }
}

impl<'a> Iterator for SetCoverageIterator<'a> {
    type Item = SetCoveragePiece<'a>;

    fn next(&mut self) -> Option<SetCoveragePiece<'a>> {
        loop {
            if self.exhausted_tilings {
                let rect = self.leftovers.get(self.leftover_cursor).copied()?;
                self.leftover_cursor += 1;
                return Some(SetCoveragePiece {
                    geometry_rect: rect,
                    source: None,
                });
            }
            let Some(inner) = self.inner.as_mut() else {
                return None;
            };
            let Some(piece) = inner.next() else {
                self.rect_cursor += 1;
                self.start_current_rect();
                continue;
            };
            let tiling = self.ordered_tilings[self.tiling_cursor];
            match piece.tile {
                Some(tile) => {
                    return Some(SetCoveragePiece {
                        geometry_rect: piece.geometry_rect,
                        source: Some(SetCoverageTile {
                            tile,
                            contents_scale: tiling.contents_scale(),
                            resolution: tiling.resolution(),
                            texture_rect: piece.texture_rect,
                        }),
                    });
                }
                None => {
                    self.next_remaining.union_rect(piece.geometry_rect);
                }
            }
        }
    }
}
