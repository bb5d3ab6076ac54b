//! The pending/active tree pair: commit, activation, and whole-tree updates.
//!
//! Activation is an ownership transfer: the pending tree becomes the active
//! tree wholesale, tilings and tiles moving with their layers, and the
//! displaced active tree is kept as the recycle tree so the next commit
//! starts from its layers instead of rasterizing from zero.

use std::mem;
use std::sync::Arc;

use geometry::{Region, Size};
use layer::{PictureLayer, RasterSource, TreeSettings};
use log::debug;

use crate::frame::FrameInputs;
use crate::tree::{LayerId, LayerTree};

#[derive(Debug)]
pub struct TreePair {
    settings: TreeSettings,
    active: LayerTree,
    pending: Option<LayerTree>,
    recycle: Option<LayerTree>,
    next_source_frame_number: u64,
    requires_high_res_to_draw: bool,
}

impl TreePair {
    pub fn new(settings: TreeSettings) -> Self {
        Self {
            settings,
            active: LayerTree::new(),
            pending: None,
            recycle: None,
            next_source_frame_number: 1,
            requires_high_res_to_draw: false,
        }
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    pub fn active_tree(&self) -> &LayerTree {
        &self.active
    }

    pub fn active_tree_mut(&mut self) -> &mut LayerTree {
        &mut self.active
    }

    pub fn pending_tree(&self) -> Option<&LayerTree> {
        self.pending.as_ref()
    }

    pub fn pending_tree_mut(&mut self) -> Option<&mut LayerTree> {
        self.pending.as_mut()
    }

    pub fn recycle_tree(&self) -> Option<&LayerTree> {
        self.recycle.as_ref()
    }

    pub fn requires_high_res_to_draw(&self) -> bool {
        self.requires_high_res_to_draw
    }

    /// Forces the next activation to wait for high-res content (set on
    /// events like a device scale change). Cleared by activation.
    pub fn set_requires_high_res_to_draw(&mut self) {
        self.requires_high_res_to_draw = true;
    }

    /// Starts a new commit. Reuses the recycle tree when one exists so its
    /// layers keep their tilings; layers absent from the new commit must be
    /// dropped through `retain_pending_layers`.
    pub fn create_pending_tree(&mut self) -> &mut LayerTree {
        assert!(
            self.pending.is_none(),
            "a pending tree already exists; activate or drop it first"
        );
        let mut tree = self.recycle.take().unwrap_or_default();
        tree.set_source_frame_number(self.next_source_frame_number);
        debug!(
            "pending tree created for frame {} ({} recycled layers)",
            self.next_source_frame_number,
            tree.num_layers()
        );
        self.next_source_frame_number += 1;
        self.pending.insert(tree)
    }

    /// Puts one committed layer into the pending tree: reuses the recycled
    /// layer with this id when compatible, applies the commit's invalidation,
    /// and mirrors tilings from the active twin.
    pub fn commit_layer(
        &mut self,
        id: LayerId,
        raster_source: Arc<dyn RasterSource>,
        bounds: Size,
        invalidation: Region,
    ) {
        self.commit_layer_inner(id, raster_source, bounds, invalidation, false);
    }

    pub fn commit_mask_layer(
        &mut self,
        id: LayerId,
        raster_source: Arc<dyn RasterSource>,
        bounds: Size,
        invalidation: Region,
    ) {
        self.commit_layer_inner(id, raster_source, bounds, invalidation, true);
    }

    fn commit_layer_inner(
        &mut self,
        id: LayerId,
        raster_source: Arc<dyn RasterSource>,
        bounds: Size,
        invalidation: Region,
        is_mask: bool,
    ) {
        let settings = self.settings;
        let Self {
            ref mut pending,
            ref active,
            ..
        } = *self;
        let pending = pending
            .as_mut()
            .unwrap_or_else(|| panic!("commit of {id} requires a pending tree"));
        let reusable = pending
            .layer(id)
            .is_some_and(|recycled| recycled.is_mask() == is_mask);
        let target = if reusable {
            let recycled = pending.layer_mut(id).unwrap_or_else(|| unreachable!());
            recycled.set_raster_source(raster_source);
            recycled.set_bounds(bounds);
            recycled
        } else {
            let fresh = if is_mask {
                PictureLayer::new_mask(raster_source, bounds, settings)
            } else {
                PictureLayer::new(raster_source, bounds, settings)
            };
            pending.insert_layer(id, fresh)
        };
        target.union_invalidation(&invalidation);
        if let Some(twin) = active.layer(id) {
            target.sync_from_twin(twin);
        }
    }

    /// Drops pending layers whose ids are not part of the current commit
    /// (recycled leftovers from a previous frame).
    pub fn retain_pending_layers(&mut self, keep: &[LayerId]) {
        if let Some(pending) = self.pending.as_mut() {
            pending.retain_ids(|id| keep.contains(&id));
        }
    }

    /// One update pass over the pending tree: scale state machine, tile
    /// priorities with twin inheritance, and activation-readiness marking.
    pub fn update_pending_tree(&mut self, inputs: &FrameInputs) {
        let context = inputs.update_context();
        let requires_high_res = self.requires_high_res_to_draw;
        let Self {
            ref mut pending,
            ref active,
            ..
        } = *self;
        let Some(pending) = pending.as_mut() else {
            return;
        };
        for id in pending.layer_ids() {
            let twin = active.layer(id);
            let Some(owned_layer) = pending.layer_mut(id) else {
                continue;
            };
            owned_layer.update_tilings(&context);
            owned_layer.update_tile_priorities(&context, twin);
            owned_layer.mark_visible_resources_as_required(twin, requires_high_res);
        }
    }

    /// One update pass over the active tree.
    pub fn update_active_tree(&mut self, inputs: &FrameInputs) {
        let context = inputs.update_context();
        let Self {
            ref mut active,
            ref pending,
            ..
        } = *self;
        for id in active.layer_ids() {
            let twin = pending.as_ref().and_then(|tree| tree.layer(id));
            let Some(owned_layer) = active.layer_mut(id) else {
                continue;
            };
            owned_layer.update_tilings(&context);
            owned_layer.update_tile_priorities(&context, twin);
        }
    }

    /// Atomic promotion of the pending tree. The displaced active tree
    /// becomes the recycle tree; the new active tree clears its activation
    /// flags and consumed invalidation.
    pub fn activate_pending_tree(&mut self) {
        let new_active = self
            .pending
            .take()
            .unwrap_or_else(|| panic!("no pending tree to activate"));
        let old_active = mem::replace(&mut self.active, new_active);
        self.recycle = Some(old_active);
        for (_, owned_layer) in self.active.layers_mut() {
            owned_layer.did_become_active();
        }
        self.requires_high_res_to_draw = false;
        debug!(
            "activated tree for frame {}",
            self.active.source_frame_number()
        );
    }

    /// Retires stale tilings on one active layer after a draw, and drops the
    /// same scales from the twin and recycled counterparts where they are
    /// non-ideal there too.
    pub fn cleanup_active_layer_tilings(&mut self, id: LayerId, used_scales: &[f32]) {
        let Self {
            ref mut active,
            ref mut pending,
            ref mut recycle,
            ..
        } = *self;
        let Some(owned_layer) = active.layer_mut(id) else {
            return;
        };
        let twin = pending.as_ref().and_then(|tree| tree.layer(id));
        let dropped = owned_layer.cleanup_tilings_on_active_layer(used_scales, twin);
        for scale in dropped {
            if let Some(tree) = pending.as_mut()
                && let Some(twin_layer) = tree.layer_mut(id)
            {
                twin_layer.tilings_mut().remove_tiling_at_scale(scale);
            }
            if let Some(tree) = recycle.as_mut()
                && let Some(old_layer) = tree.layer_mut(id)
            {
                old_layer.tilings_mut().remove_tiling_at_scale(scale);
            }
        }
    }
}
