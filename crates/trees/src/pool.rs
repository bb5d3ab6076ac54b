//! Pool of raster resources referenced by tiles. The actual texture or
//! bitmap storage lives behind the renderer; the pool only tracks identity
//! and size so eviction can account for what it frees.

use draw_protocol::ResourceId;
use geometry::Size;
use log::debug;
use slotmap::SlotMap;

#[derive(Debug, Default)]
pub struct ResourcePool {
    resources: SlotMap<ResourceId, Size>,
    total_content_area: i64,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, size: Size) -> ResourceId {
        self.total_content_area += size.area();
        self.resources.insert(size)
    }

    /// Returns the freed resource's size, or `None` for an id this pool never
    /// issued or already released.
    pub fn release(&mut self, id: ResourceId) -> Option<Size> {
        let size = self.resources.remove(id)?;
        self.total_content_area -= size.area();
        debug!("released resource of {size:?}, {} still live", self.resources.len());
        Some(size)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn size_of(&self, id: ResourceId) -> Option<Size> {
        self.resources.get(id).copied()
    }

    pub fn num_resources(&self) -> usize {
        self.resources.len()
    }

    /// Sum of the content areas of every live resource, in pixels.
    pub fn total_content_area(&self) -> i64 {
        self.total_content_area
    }
}
