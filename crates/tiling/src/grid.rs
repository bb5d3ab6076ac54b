//! Tile-grid index math: mapping content-space rectangles onto grid cells.

use geometry::{Rect, Size};

use crate::tile::TileIndex;

/// Axis-aligned grid of fixed-size cells covering a content-space area. The
/// last row/column may be partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    tile_size: Size,
    content_bounds: Size,
    num_tiles_x: i32,
    num_tiles_y: i32,
}

impl TileGrid {
    pub fn new(tile_size: Size, content_bounds: Size) -> Self {
        assert!(
            tile_size.width > 0 && tile_size.height > 0,
            "tile size must be positive, got {tile_size}"
        );
        let num_tiles_x = if content_bounds.width > 0 {
            (content_bounds.width + tile_size.width - 1) / tile_size.width
        } else {
            0
        };
        let num_tiles_y = if content_bounds.height > 0 {
            (content_bounds.height + tile_size.height - 1) / tile_size.height
        } else {
            0
        };
        Self {
            tile_size,
            content_bounds,
            num_tiles_x,
            num_tiles_y,
        }
    }

    pub fn tile_size(&self) -> Size {
        self.tile_size
    }

    pub fn content_bounds(&self) -> Size {
        self.content_bounds
    }

    pub fn num_tiles_x(&self) -> i32 {
        self.num_tiles_x
    }

    pub fn num_tiles_y(&self) -> i32 {
        self.num_tiles_y
    }

    pub fn contains_index(&self, index: TileIndex) -> bool {
        index.i >= 0 && index.i < self.num_tiles_x && index.j >= 0 && index.j < self.num_tiles_y
    }

    /// Content-space bounds of the cell, clipped to the content bounds.
    pub fn tile_bounds(&self, index: TileIndex) -> Rect {
        assert!(
            self.contains_index(index),
            "tile index ({}, {}) out of bounds for {}x{} grid",
            index.i,
            index.j,
            self.num_tiles_x,
            self.num_tiles_y
        );
        let left = index.i * self.tile_size.width;
        let top = index.j * self.tile_size.height;
        let right = (left + self.tile_size.width).min(self.content_bounds.width);
        let bottom = (top + self.tile_size.height).min(self.content_bounds.height);
        Rect::from_edges(left, top, right, bottom)
    }

    /// Inclusive index range of cells intersecting `rect`, or `None` if the
    /// intersection with the content bounds is empty.
    pub fn index_range_for_rect(&self, rect: Rect) -> Option<IndexRange> {
        let clipped = rect.intersect(Rect::from_size(self.content_bounds));
        if clipped.is_empty() {
            return None;
        }
        Some(IndexRange {
            first_i: clipped.x / self.tile_size.width,
            first_j: clipped.y / self.tile_size.height,
            last_i: (clipped.right() - 1) / self.tile_size.width,
            last_j: (clipped.bottom() - 1) / self.tile_size.height,
        })
    }

    /// Scanline iterator over cells intersecting `rect`.
    pub fn indices_intersecting(&self, rect: Rect) -> IndexIter {
        IndexIter::new(self.index_range_for_rect(rect))
    }
}

/// Inclusive rectangular range of grid indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub first_i: i32,
    pub first_j: i32,
    pub last_i: i32,
    pub last_j: i32,
}

#[derive(Debug, Clone)]
pub struct IndexIter {
    range: Option<IndexRange>,
    next: Option<TileIndex>,
}

impl IndexIter {
    fn new(range: Option<IndexRange>) -> Self {
        let next = range.map(|range| TileIndex::new(range.first_i, range.first_j));
        Self { range, next }
    }
}

impl Iterator for IndexIter {
    type Item = TileIndex;

    fn next(&mut self) -> Option<TileIndex> {
        let range = self.range?;
        let current = self.next?;
        self.next = if current.i < range.last_i {
            Some(TileIndex::new(current.i + 1, current.j))
        } else if current.j < range.last_j {
            Some(TileIndex::new(range.first_i, current.j + 1))
        } else {
            None
        };
        Some(current)
    }
}
