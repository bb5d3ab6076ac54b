//! One layer tree: an id-indexed arena of picture layers.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use draw_protocol::ResourceId;
use layer::PictureLayer;

/// Stable logical identity of a layer across trees. The counterpart with the
/// same id on the other tree is the layer's twin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl std::fmt::Display for LayerId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "layer {}", self.0)
    }
}

/// The layers of one tree, indexed by id. Trees never share layers; the same
/// id in two trees names two distinct `PictureLayer` values.
#[derive(Debug, Default)]
pub struct LayerTree {
    layers: HashMap<LayerId, PictureLayer>,
    source_frame_number: u64,
}

impl LayerTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_frame_number(&self) -> u64 {
        self.source_frame_number
    }

    pub(crate) fn set_source_frame_number(&mut self, frame: u64) {
        self.source_frame_number = frame;
        for owned_layer in self.layers.values_mut() {
            owned_layer.set_source_frame_number(frame);
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, id: LayerId) -> Option<&PictureLayer> {
        self.layers.get(&id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut PictureLayer> {
        self.layers.get_mut(&id)
    }

    pub fn insert_layer(&mut self, id: LayerId, mut new_layer: PictureLayer) -> &mut PictureLayer {
        new_layer.set_source_frame_number(self.source_frame_number);
        match self.layers.entry(id) {
            Entry::Occupied(mut slot) => {
                slot.insert(new_layer);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(new_layer),
        }
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Option<PictureLayer> {
        self.layers.remove(&id)
    }

    /// Drains the resources every layer of this tree freed since the last
    /// call, for return to the host's pool.
    pub fn take_released_resources(&mut self) -> Vec<ResourceId> {
        let mut released = Vec::new();
        for owned_layer in self.layers.values_mut() {
            released.extend(owned_layer.take_released_resources());
        }
        released
    }

    /// Ids in ascending order, for deterministic whole-tree walks.
    pub fn layer_ids(&self) -> Vec<LayerId> {
        let mut ids: Vec<LayerId> = self.layers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &PictureLayer)> {
        self.layers.iter().map(|(id, owned_layer)| (*id, owned_layer))
    }

    pub fn layers_mut(&mut self) -> impl Iterator<Item = (LayerId, &mut PictureLayer)> {
        self.layers.iter_mut().map(|(id, owned_layer)| (*id, owned_layer))
    }

    pub(crate) fn retain_ids(&mut self, keep: impl Fn(LayerId) -> bool) {
        self.layers.retain(|id, _| keep(*id));
    }
}
