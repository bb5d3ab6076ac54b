//! Tile residency and prioritization for one layer.
//!
//! A `Tiling` covers one layer at one contents scale with a grid of tiles; a
//! `TilingSet` holds every scale a layer keeps around. Priorities are
//! recomputed once per frame from the visible rect and its motion, and the
//! coverage iterators slice an arbitrary destination rect into per-tile
//! pieces without gaps or overlaps.

mod grid;
mod set;
mod tile;
mod tiling;

pub use grid::{IndexIter, IndexRange, TileGrid};
pub use set::{
    AddTilingError, SetCoverageIterator, SetCoveragePiece, SetCoverageTile, TilingSet,
};
pub use tile::{PriorityBin, Tile, TileContent, TileIndex, TilePriority, TileResolution};
pub use tiling::{
    CoverageIterator, CoveragePiece, PriorityUpdateInputs, TileFactory, TileRequest, TileSeed,
    Tiling, TilingRasterIterator,
};
