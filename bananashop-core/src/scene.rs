//! Scene structure for Bananashop
//!
//! The scene is the ordered layer list (first = bottom) plus the current
//! selection. It is the unit captured by undo snapshots.
//!
//! ## Memory Model
//!
//! Layers are stored as `Arc<Vec<Arc<Layer>>>`. Every mutation goes through
//! `Arc::make_mut`, first on the list and then on the one layer being edited,
//! so:
//!
//! - cloning a scene (a snapshot) is two pointer copies
//! - a stored snapshot never observes later edits to the live scene
//! - layers that an edit does not touch keep their `Arc` identity, which lets
//!   the render scheduler detect "nothing relevant changed" with `Arc::ptr_eq`

use crate::layer::{Layer, LayerId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default canvas width in pixels
pub const DEFAULT_CANVAS_WIDTH: u32 = 1280;

/// Default canvas height in pixels
pub const DEFAULT_CANVAS_HEIGHT: u32 = 720;

/// Fixed logical size of the composite
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

impl CanvasConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Canvas size as a kurbo size
    pub fn size(&self) -> kurbo::Size {
        kurbo::Size::new(self.width as f64, self.height as f64)
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CANVAS_WIDTH, DEFAULT_CANVAS_HEIGHT)
    }
}

/// Ordered layers and the selected layer id
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    layers: Arc<Vec<Arc<Layer>>>,
    selected_layer_id: Option<LayerId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers in paint order (first = bottom)
    pub fn layers(&self) -> &[Arc<Layer>] {
        &self.layers
    }

    /// Shared handle to the layer list, for identity comparison
    pub fn layers_arc(&self) -> &Arc<Vec<Arc<Layer>>> {
        &self.layers
    }

    pub fn selected_layer_id(&self) -> Option<LayerId> {
        self.selected_layer_id
    }

    /// The selected layer, if the selection still refers to a live layer
    pub fn selected_layer(&self) -> Option<&Layer> {
        self.selected_layer_id.and_then(|id| self.layer(id))
    }

    /// Find a layer by id
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id).map(|l| l.as_ref())
    }

    /// Paint-order index of a layer
    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// True when both scenes share the same layer list allocation and selection
    pub fn ptr_eq(&self, other: &Scene) -> bool {
        Arc::ptr_eq(&self.layers, &other.layers)
            && self.selected_layer_id == other.selected_layer_id
    }

    // === MUTATION (crate-internal, reached only through EditorStore) ===

    pub(crate) fn set_selected(&mut self, id: Option<LayerId>) {
        self.selected_layer_id = id;
    }

    /// Append a layer at the top of the paint order
    pub(crate) fn push_layer(&mut self, layer: Layer) {
        Arc::make_mut(&mut self.layers).push(Arc::new(layer));
    }

    /// Remove a layer, clearing the selection if it pointed at it
    pub(crate) fn remove_layer(&mut self, id: LayerId) -> Option<Arc<Layer>> {
        let index = self.index_of(id)?;
        let removed = Arc::make_mut(&mut self.layers).remove(index);
        if self.selected_layer_id == Some(id) {
            self.selected_layer_id = None;
        }
        Some(removed)
    }

    /// Move the layer at `from` to `to`, keeping every other relative order
    pub(crate) fn reorder(&mut self, from: usize, to: usize) -> bool {
        let len = self.layers.len();
        if from >= len || to >= len || from == to {
            return false;
        }
        let layers = Arc::make_mut(&mut self.layers);
        let moved = layers.remove(from);
        layers.insert(to, moved);
        true
    }

    /// Mutate one layer in place, copying it only if a snapshot shares it
    pub(crate) fn update_layer<R>(
        &mut self,
        id: LayerId,
        f: impl FnOnce(&mut Layer) -> R,
    ) -> Option<R> {
        let index = self.index_of(id)?;
        let layers = Arc::make_mut(&mut self.layers);
        Some(f(Arc::make_mut(&mut layers[index])))
    }
}
