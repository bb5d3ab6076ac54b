//! Pending/active tree coordination for the tiled picture-layer compositor.
//!
//! A commit builds a pending tree beside the tree being drawn; once the
//! pending tree's required tiles are rastered it replaces the active tree in
//! one ownership transfer. Twin layers are found by id in the other tree's
//! arena, never by stored reference.

mod frame;
mod pair;
mod pool;
mod tree;

pub use frame::{FrameClock, FrameInputs};
pub use layer::TreeSettings;
pub use pair::TreePair;
pub use pool::ResourcePool;
pub use tree::{LayerId, LayerTree};
