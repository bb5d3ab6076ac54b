//! The tiled picture layer: one composited content layer owning its tilings,
//! recording seam, scale state machine, activation marking, and quad
//! assembly. Cross-tree coordination (twin lookup, activation) lives one
//! crate up.

mod activation;
mod iterators;
mod layer;
mod quads;
mod settings;
mod source;

pub use iterators::{EvictionCandidate, LayerEvictionTileIterator, LayerRasterTileIterator};
pub use layer::{
    DrawProperties, PictureLayer, ScreenSpaceTransform, UpdateContext, calculate_tile_size,
};
pub use quads::DrawMode;
pub use settings::TreeSettings;
pub use source::{NoOcclusion, Occlusion, RasterSource};

#[cfg(test)]
mod tests;
