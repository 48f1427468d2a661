//! Redraw coalescing
//!
//! The host calls [`RenderScheduler::observe`] after every state change and
//! [`RenderScheduler::begin_frame`] once per display frame. Only changes to
//! what the compositor reads (layer list, selection, viewport, canvas size)
//! mark the scheduler dirty, and any number of changes between two frames
//! produce a single redraw.

use crate::layer::{Layer, LayerId};
use crate::scene::CanvasConfig;
use crate::store::EditorState;
use crate::transform::Viewport;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct RenderScheduler {
    layers: Option<Arc<Vec<Arc<Layer>>>>,
    selected: Option<LayerId>,
    viewport: Option<Viewport>,
    canvas: Option<CanvasConfig>,
    dirty: bool,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare against the last observed state; returns true if a frame is now pending
    ///
    /// Layer lists compare by reference, so an edit that went through
    /// copy-on-write always counts as a change while an unrelated store
    /// update (a notice, a dialog flag) does not.
    pub fn observe(&mut self, state: &EditorState) -> bool {
        let layers = state.scene.layers_arc();
        let layers_changed = self
            .layers
            .as_ref()
            .map_or(true, |last| !Arc::ptr_eq(last, layers));
        let selection_changed = self.selected != state.scene.selected_layer_id();
        let viewport_changed = self.viewport.as_ref() != Some(&state.viewport);
        let canvas_changed = self.canvas.as_ref() != Some(&state.canvas_config);

        if layers_changed || selection_changed || viewport_changed || canvas_changed {
            self.layers = Some(Arc::clone(layers));
            self.selected = state.scene.selected_layer_id();
            self.viewport = Some(state.viewport);
            self.canvas = Some(state.canvas_config);
            self.request();
        }
        self.dirty
    }

    /// Force a redraw on the next frame (surface resize, cache flush)
    pub fn request(&mut self) {
        if !self.dirty {
            log::trace!("Redraw requested");
        }
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Drain the pending flag; returns true if the frame should be painted
    pub fn begin_frame(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
