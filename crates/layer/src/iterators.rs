//! Layer-level raster and eviction orderings, merged from the per-tiling
//! iterators.

use tiling::{PriorityBin, Tile, TileIndex, TileResolution, Tiling, TilingRasterIterator};

use crate::layer::PictureLayer;

/// Raster order: the stage table interleaves the high- and low-res tilings
/// for visible tiles, then walks the high-res tiling outward.
fn raster_stages(prioritize_low_res: bool) -> [(TileResolution, PriorityBin); 4] {
    let (first, second) = if prioritize_low_res {
        (TileResolution::Low, TileResolution::High)
    } else {
        (TileResolution::High, TileResolution::Low)
    };
    [
        (first, PriorityBin::Now),
        (second, PriorityBin::Now),
        (TileResolution::High, PriorityBin::Soon),
        (TileResolution::High, PriorityBin::Eventually),
    ]
}

/// Most-to-least urgent walk over one layer's tiles needing raster work. A
/// layer with invalid priorities yields nothing.
pub struct LayerRasterTileIterator<'a> {
    layer: &'a PictureLayer,
    stages: [(TileResolution, PriorityBin); 4],
    stage: usize,
    inner: Option<TilingRasterIterator<'a>>,
}

impl<'a> LayerRasterTileIterator<'a> {
    pub fn new(layer: &'a PictureLayer, prioritize_low_res: bool) -> Self {
        let stages = raster_stages(prioritize_low_res);
        let mut iterator = Self {
            layer,
            stages,
            stage: 0,
            inner: None,
        };
        if !layer.has_valid_tile_priorities() || layer.tilings().num_tilings() == 0 {
            iterator.stage = stages.len();
        } else {
            iterator.enter_stage(0);
        }
        iterator
    }

    fn stage_tiling(&self, resolution: TileResolution) -> Option<&'a Tiling> {
        match resolution {
            TileResolution::High => self.layer.tilings().high_res_tiling(),
            TileResolution::Low => self.layer.tilings().low_res_tiling(),
            TileResolution::NonIdeal => None,
        }
    }

    fn enter_stage(&mut self, stage: usize) {
        self.stage = stage;
        self.inner = self
            .stages
            .get(stage)
            .and_then(|(resolution, _)| self.stage_tiling(*resolution))
            .map(Tiling::raster_iterator);
    }
}

impl<'a> Iterator for LayerRasterTileIterator<'a> {
    type Item = &'a Tile;

    fn next(&mut self) -> Option<&'a Tile> {
        loop {
            if self.stage >= self.stages.len() {
                return None;
            }
            let stage_bin = self.stages[self.stage].1;
            let Some(inner) = self.inner.as_mut() else {
                self.enter_stage(self.stage + 1);
                continue;
            };
            let Some(tile) = inner.next() else {
                self.enter_stage(self.stage + 1);
                continue;
            };
            let bin = tile.priority().bin;
            if bin == stage_bin {
                return Some(tile);
            }
            // The per-tiling walk is bin-ordered: anything past this stage's
            // bin belongs to a later stage, anything before it was already
            // yielded by an earlier stage.
            if bin > stage_bin {
                self.enter_stage(self.stage + 1);
            }
        }
    }
}

/// One evictable tile, identified by tiling scale and grid cell so the
/// consumer can release it through the layer without holding a borrow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionCandidate {
    pub contents_scale: f32,
    pub index: TileIndex,
    pub bin: PriorityBin,
    pub required_for_activation: bool,
}

/// Category order: least valuable first. Within a category, tilings run in
/// the set's eviction order with the high-res tiling last.
const EVICTION_CATEGORIES: [(PriorityBin, bool); 6] = [
    (PriorityBin::Eventually, false),
    (PriorityBin::Eventually, true),
    (PriorityBin::Soon, false),
    (PriorityBin::Soon, true),
    (PriorityBin::Now, false),
    (PriorityBin::Now, true),
];

/// Least-valuable-first walk over one layer's resource-holding tiles. A
/// layer whose priorities are invalid counts as the lowest priority of all:
/// every resource-holding tile is surfaced up front, reported in the
/// `Eventually` bin and not required for activation.
pub struct LayerEvictionTileIterator<'a> {
    ordered_tilings: Vec<&'a Tiling>,
    unprioritized: bool,
    category: usize,
    tiling_cursor: usize,
    inner: Option<Box<dyn Iterator<Item = &'a Tile> + 'a>>,
}

impl<'a> LayerEvictionTileIterator<'a> {
    pub fn new(layer: &'a PictureLayer) -> Self {
        let mut iterator = Self {
            ordered_tilings: layer.tilings().tilings_in_eviction_order(),
            unprioritized: !layer.has_valid_tile_priorities(),
            category: 0,
            tiling_cursor: 0,
            inner: None,
        };
        iterator.start_inner();
        iterator
    }

    fn start_inner(&mut self) {
        let Some(owned_tiling) = self.ordered_tilings.get(self.tiling_cursor) else {
            self.inner = None;
            return;
        };
        self.inner = if self.unprioritized {
            Some(Box::new(
                owned_tiling
                    .tiles()
                    .filter(|tile| tile.content().holds_resource()),
            ))
        } else {
            EVICTION_CATEGORIES.get(self.category).map(|(bin, required)| {
                Box::new(owned_tiling.eviction_category_iterator(*bin, *required))
                    as Box<dyn Iterator<Item = &'a Tile> + 'a>
            })
        };
    }
}

impl<'a> Iterator for LayerEvictionTileIterator<'a> {
    type Item = EvictionCandidate;

    fn next(&mut self) -> Option<EvictionCandidate> {
        loop {
            if self.tiling_cursor >= self.ordered_tilings.len() {
                return None;
            }
            let Some(inner) = self.inner.as_mut() else {
                return None;
            };
            if let Some(tile) = inner.next() {
                let tiling = self.ordered_tilings[self.tiling_cursor];
                let (bin, required_for_activation) = if self.unprioritized {
                    (PriorityBin::Eventually, false)
                } else {
                    (tile.priority().bin, tile.required_for_activation())
                };
                return Some(EvictionCandidate {
                    contents_scale: tiling.contents_scale(),
                    index: tile.index(),
                    bin,
                    required_for_activation,
                });
            }
            self.tiling_cursor += 1;
            if !self.unprioritized && self.tiling_cursor >= self.ordered_tilings.len() {
                self.tiling_cursor = 0;
                self.category += 1;
                if self.category >= EVICTION_CATEGORIES.len() {
                    return None;
                }
            }
            self.start_inner();
        }
    }
}
