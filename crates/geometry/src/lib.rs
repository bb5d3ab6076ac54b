//! Integer geometry for the tiling core.
//!
//! This module provides half-open integer rectangles, disjoint rect regions,
//! and the monotonic scale mapping used to slice coverage space into tile
//! cells without gaps or overlaps.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vector {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(self) -> i64 {
        if self.is_empty() {
            return 0;
        }
        (self.width as i64) * (self.height as i64)
    }

    pub fn min_dimension(self) -> i32 {
        self.width.min(self.height)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}x{}", self.width, self.height)
    }
}

/// Half-open rectangle: covers `[x, x + width) x [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(size: Size) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
        }
    }

    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    pub fn size(self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(self) -> i64 {
        if self.is_empty() {
            return 0;
        }
        (self.width as i64) * (self.height as i64)
    }

    pub fn intersect(self, other: Rect) -> Rect {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return Rect::default();
        }
        Rect::from_edges(left, top, right, bottom)
    }

    pub fn intersects(self, other: Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    pub fn union(self, other: Rect) -> Rect {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Rect::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn contains_rect(self, other: Rect) -> bool {
        if other.is_empty() {
            return true;
        }
        self.x <= other.x
            && self.y <= other.y
            && self.right() >= other.right()
            && self.bottom() >= other.bottom()
    }

    pub fn contains_point(self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    pub fn translate(self, offset: Vector) -> Rect {
        Rect::new(self.x + offset.x, self.y + offset.y, self.width, self.height)
    }

    pub fn outset(self, amount: i32) -> Rect {
        if self.is_empty() {
            return self;
        }
        Rect::from_edges(
            self.x - amount,
            self.y - amount,
            self.right() + amount,
            self.bottom() + amount,
        )
    }

    /// Manhattan distance from this rect to `other`; zero when they touch or
    /// intersect.
    pub fn manhattan_distance(self, other: Rect) -> f32 {
        let dx = if other.right() <= self.x {
            self.x - other.right()
        } else if self.right() <= other.x {
            other.x - self.right()
        } else {
            0
        };
        let dy = if other.bottom() <= self.y {
            self.y - other.bottom()
        } else if self.bottom() <= other.y {
            other.y - self.bottom()
        } else {
            0
        };
        (dx + dy) as f32
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{},{} {}x{}",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Float rectangle, used for texture sub-rects.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectF {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Maps a coordinate from one scale to another with a floor, so that mapping
/// a monotone sequence of edges yields a monotone sequence of edges. Adjacent
/// cells mapped through the same call share their boundary exactly.
pub fn scale_coord_floor(coord: i32, source_scale: f32, dest_scale: f32) -> i32 {
    assert!(
        source_scale > 0.0 && dest_scale > 0.0,
        "scale factors must be positive"
    );
    let ratio = (dest_scale as f64) / (source_scale as f64);
    ((coord as f64) * ratio).floor() as i32
}

/// Smallest rect at `dest_scale` containing `rect` mapped from `source_scale`.
pub fn enclosing_scaled_rect(rect: Rect, source_scale: f32, dest_scale: f32) -> Rect {
    if rect.is_empty() {
        return Rect::default();
    }
    assert!(
        source_scale > 0.0 && dest_scale > 0.0,
        "scale factors must be positive"
    );
    let ratio = (dest_scale as f64) / (source_scale as f64);
    let left = ((rect.x as f64) * ratio).floor() as i32;
    let top = ((rect.y as f64) * ratio).floor() as i32;
    let right = ((rect.right() as f64) * ratio).ceil() as i32;
    let bottom = ((rect.bottom() as f64) * ratio).ceil() as i32;
    Rect::from_edges(left, top, right, bottom)
}

/// Smallest size whose dimensions cover `size` scaled by `scale`.
pub fn scale_size_ceil(size: Size, scale: f32) -> Size {
    assert!(scale > 0.0, "scale factor must be positive");
    Size::new(
        ((size.width as f64) * (scale as f64)).ceil() as i32,
        ((size.height as f64) * (scale as f64)).ceil() as i32,
    )
}

/// Rounds `value` up to the next multiple of `granularity`.
pub fn round_up(value: i32, granularity: i32) -> i32 {
    assert!(granularity > 0, "granularity must be positive");
    assert!(value >= 0, "cannot round a negative value");
    (value + granularity - 1) / granularity * granularity
}

/// Expands `rect` equally on all sides until its area reaches `target_area`,
/// staying inside `bounds`. Expansion blocked by a bound on one side is
/// redistributed to the sides that still have room. Returns `rect` unchanged
/// when it is empty or already at least `target_area`.
pub fn expand_rect_to_area(rect: Rect, target_area: i64, bounds: Rect) -> Rect {
    let mut current = rect.intersect(bounds);
    if current.is_empty() || current.area() >= target_area {
        return current;
    }
    loop {
        let can_left = current.x > bounds.x;
        let can_top = current.y > bounds.y;
        let can_right = current.right() < bounds.right();
        let can_bottom = current.bottom() < bounds.bottom();
        let free_x = can_left as i32 + can_right as i32;
        let free_y = can_top as i32 + can_bottom as i32;
        if free_x == 0 && free_y == 0 {
            return current;
        }
        let w = current.width as f64;
        let h = current.height as f64;
        let a = target_area as f64;
        // Solve (w + free_x * d)(h + free_y * d) = target for d.
        let delta = if free_x > 0 && free_y > 0 {
            let nx = free_x as f64;
            let ny = free_y as f64;
            let b = w * ny + h * nx;
            let discriminant = b * b - 4.0 * nx * ny * (w * h - a);
            ((-b + discriminant.sqrt()) / (2.0 * nx * ny)).ceil() as i32
        } else if free_x > 0 {
            ((a / h - w) / free_x as f64).ceil() as i32
        } else {
            ((a / w - h) / free_y as f64).ceil() as i32
        };
        // Grow by the largest step every free side can absorb; a side that
        // hits its bound drops out of the next round's solve.
        let mut step = delta.max(1);
        if can_left {
            step = step.min(current.x - bounds.x);
        }
        if can_top {
            step = step.min(current.y - bounds.y);
        }
        if can_right {
            step = step.min(bounds.right() - current.right());
        }
        if can_bottom {
            step = step.min(bounds.bottom() - current.bottom());
        }
        current = Rect::from_edges(
            current.x - if can_left { step } else { 0 },
            current.y - if can_top { step } else { 0 },
            current.right() + if can_right { step } else { 0 },
            current.bottom() + if can_bottom { step } else { 0 },
        );
        if step >= delta || current.area() >= target_area {
            return current;
        }
    }
}

/// A set of disjoint rectangles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.union_rect(rect);
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn area(&self) -> i64 {
        self.rects.iter().map(|rect| rect.area()).sum()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    pub fn intersects(&self, rect: Rect) -> bool {
        self.rects.iter().any(|member| member.intersects(rect))
    }

    pub fn contains_rect(&self, rect: Rect) -> bool {
        let mut missing = Region::from_rect(rect);
        for member in &self.rects {
            missing.subtract_rect(*member);
            if missing.is_empty() {
                return true;
            }
        }
        missing.is_empty()
    }

    /// Adds `rect`, keeping members disjoint by inserting only the parts of
    /// `rect` not already covered.
    pub fn union_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        let mut pieces = vec![rect];
        for member in &self.rects {
            let mut next = Vec::with_capacity(pieces.len());
            for piece in pieces {
                subtract_into(piece, *member, &mut next);
            }
            pieces = next;
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }

    pub fn union_region(&mut self, other: &Region) {
        for rect in &other.rects {
            self.union_rect(*rect);
        }
    }

    pub fn subtract_rect(&mut self, rect: Rect) {
        if rect.is_empty() || self.rects.is_empty() {
            return;
        }
        let mut next = Vec::with_capacity(self.rects.len());
        for member in self.rects.drain(..) {
            subtract_into(member, rect, &mut next);
        }
        self.rects = next;
    }

    pub fn intersect_rect(&mut self, rect: Rect) {
        let mut next = Vec::with_capacity(self.rects.len());
        for member in self.rects.drain(..) {
            let piece = member.intersect(rect);
            if !piece.is_empty() {
                next.push(piece);
            }
        }
        self.rects = next;
    }

    pub fn take_rects(self) -> Vec<Rect> {
        self.rects
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}

/// Pushes the up-to-four pieces of `rect` not covered by `hole` onto `out`.
fn subtract_into(rect: Rect, hole: Rect, out: &mut Vec<Rect>) {
    let overlap = rect.intersect(hole);
    if overlap.is_empty() {
        out.push(rect);
        return;
    }
    // Top band.
    if overlap.y > rect.y {
        out.push(Rect::from_edges(rect.x, rect.y, rect.right(), overlap.y));
    }
    // Bottom band.
    if overlap.bottom() < rect.bottom() {
        out.push(Rect::from_edges(
            rect.x,
            overlap.bottom(),
            rect.right(),
            rect.bottom(),
        ));
    }
    // Left band, limited to the overlap rows.
    if overlap.x > rect.x {
        out.push(Rect::from_edges(rect.x, overlap.y, overlap.x, overlap.bottom()));
    }
    // Right band, limited to the overlap rows.
    if overlap.right() < rect.right() {
        out.push(Rect::from_edges(
            overlap.right(),
            overlap.y,
            rect.right(),
            overlap.bottom(),
        ));
    }
}
