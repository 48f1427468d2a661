//! Pointer interaction state machine
//!
//! Turns raw pointer down/move/up events, the active tool and modifier keys
//! into pan, move, rotate and scale drag sessions.
//!
//! ## Transitions on pointer down
//!
//! 1. Space held or hand tool: start panning
//! 2. Select/move tool and a handle of the selected layer is struck: snapshot,
//!    then rotate (knob) or scale (corner)
//! 3. Otherwise a layer is struck: select it, snapshot, then move
//! 4. Otherwise clear the selection and stay idle
//!
//! Each transform session pushes exactly one snapshot when it starts. On
//! pointer up the snapshot is retracted if the layer's transform ended
//! bit-identical to where it started, so clicks never pollute undo history.

use crate::hit_test::{hit_test_handle, hit_test_layers, HandleType};
use crate::store::EditorStore;
use crate::tool::{DragState, Tool};
use crate::transform::{screen_to_canvas, TransformPatch, Viewport};
use kurbo::{Point, Vec2};

/// Rotation snap increment with shift held, in degrees
pub const ROTATION_SNAP_DEGREES: f64 = 15.0;

/// Smallest scale ratio a drag can produce
pub const MIN_SCALE_RATIO: f64 = 0.01;

/// Below this starting distance from the centre a scale drag does nothing
pub const MIN_SCALE_START_DISTANCE: f64 = 1.0;

/// Modifier keys held during a pointer move
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Snap rotation to 15° steps
    pub shift: bool,
}

impl Modifiers {
    pub fn shift() -> Self {
        Self { shift: true }
    }
}

/// Rotation delta in degrees between two points about a centre
///
/// With `snap`, the delta is rounded to the nearest 15° step.
pub fn rotation_delta(center: Point, start: Point, current: Point, snap: bool) -> f64 {
    let start_angle = (start - center).atan2();
    let angle = (current - center).atan2();
    let delta = (angle - start_angle).to_degrees();
    if snap {
        (delta / ROTATION_SNAP_DEGREES).round() * ROTATION_SNAP_DEGREES
    } else {
        delta
    }
}

/// Uniform scale ratio from distances to a centre
///
/// `None` when the starting point is too close to the centre to give a
/// stable ratio.
pub fn scale_ratio(center: Point, start: Point, current: Point) -> Option<f64> {
    let start_dist = (start - center).hypot();
    if start_dist < MIN_SCALE_START_DISTANCE {
        return None;
    }
    let ratio = (current - center).hypot() / start_dist;
    Some(ratio.max(MIN_SCALE_RATIO))
}

/// Drives drag sessions against an [`EditorStore`]
#[derive(Debug, Default)]
pub struct InteractionController {
    drag: DragState,
    space_held: bool,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current drag session
    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    pub fn space_down(&mut self) {
        self.space_held = true;
    }

    pub fn space_up(&mut self) {
        self.space_held = false;
    }

    pub fn is_space_held(&self) -> bool {
        self.space_held
    }

    /// Wheel zoom about the pointer
    pub fn wheel(&mut self, store: &mut EditorStore, screen: Point, delta_y: f64) {
        store.wheel_zoom(screen, delta_y);
    }

    /// Start a gesture at a screen point
    pub fn pointer_down(&mut self, store: &mut EditorStore, screen: Point) {
        if !self.drag.is_idle() {
            // A lost pointer-up must still close the previous session
            log::debug!("Pointer down during an open drag; closing it first");
            self.pointer_up(store);
        }

        let viewport = store.state().viewport;
        let tool = store.state().active_tool;

        if self.space_held || tool == Tool::Hand {
            log::debug!("Drag: panning");
            self.drag = DragState::Panning {
                start_screen: screen,
                start_viewport: viewport,
            };
            return;
        }

        let canvas = screen_to_canvas(screen, &viewport);

        let handle = store
            .selected_layer()
            .and_then(|layer| hit_test_handle(canvas, layer, viewport.zoom).map(|h| (h, layer.transform)));
        if let Some((info, start_transform)) = handle {
            let layer_id = info.layer_id;
            if info.handle == HandleType::Rotate {
                let snapshot = store.push_history("Rotate Layer");
                self.drag = DragState::Rotating {
                    layer_id,
                    start_canvas: canvas,
                    start_transform,
                    snapshot,
                };
            } else {
                let snapshot = store.push_history("Scale Layer");
                self.drag = DragState::Scaling {
                    layer_id,
                    handle: info.handle,
                    start_canvas: canvas,
                    start_transform,
                    snapshot,
                };
            }
            log::debug!("Drag: {:?} handle of layer {}", info.handle, layer_id);
            return;
        }

        let hit = hit_test_layers(store.scene().layers(), canvas).map(|l| (l.id, l.transform));
        match hit {
            Some((layer_id, start_transform)) => {
                store.select_layer(Some(layer_id));
                let snapshot = store.push_history("Move Layer");
                self.drag = DragState::Moving {
                    layer_id,
                    start_canvas: canvas,
                    start_transform,
                    snapshot,
                };
                log::debug!("Drag: moving layer {}", layer_id);
            }
            None => {
                store.select_layer(None);
            }
        }
    }

    /// Continue the current gesture
    pub fn pointer_move(&mut self, store: &mut EditorStore, screen: Point, modifiers: Modifiers) {
        let canvas = screen_to_canvas(screen, &store.state().viewport);

        // Sessions on a removed layer are ignored: the update is a no-op
        match &self.drag {
            DragState::Idle => {}
            DragState::Panning {
                start_screen,
                start_viewport,
            } => {
                let delta = screen - *start_screen;
                let viewport = Viewport {
                    offset_x: start_viewport.offset_x + delta.x,
                    offset_y: start_viewport.offset_y + delta.y,
                    ..store.state().viewport
                };
                store.set_viewport(viewport);
            }
            DragState::Moving {
                layer_id,
                start_canvas,
                start_transform,
                ..
            } => {
                let delta: Vec2 = canvas - *start_canvas;
                store.update_layer_transform(
                    *layer_id,
                    TransformPatch::position(start_transform.x + delta.x, start_transform.y + delta.y),
                );
            }
            DragState::Rotating {
                layer_id,
                start_canvas,
                start_transform,
                ..
            } => {
                let delta = rotation_delta(
                    start_transform.position(),
                    *start_canvas,
                    canvas,
                    modifiers.shift,
                );
                store.update_layer_transform(
                    *layer_id,
                    TransformPatch::rotation(start_transform.rotation + delta),
                );
            }
            DragState::Scaling {
                layer_id,
                start_canvas,
                start_transform,
                ..
            } => {
                if let Some(ratio) = scale_ratio(start_transform.position(), *start_canvas, canvas) {
                    store.update_layer_transform(
                        *layer_id,
                        TransformPatch::scale(
                            start_transform.scale_x * ratio,
                            start_transform.scale_y * ratio,
                        ),
                    );
                }
            }
        }
    }

    /// Finish the current gesture
    pub fn pointer_up(&mut self, store: &mut EditorStore) {
        let drag = std::mem::take(&mut self.drag);
        let (Some(layer_id), Some(start), Some(snapshot)) =
            (drag.layer_id(), drag.start_transform(), drag.snapshot())
        else {
            return;
        };
        // A vanished layer keeps its snapshot: undo restores it
        let Some(layer) = store.layer(layer_id) else {
            return;
        };
        if layer.transform.bit_identical(start) {
            log::debug!("Drag ended without change; retracting snapshot");
            store.retract_history(snapshot);
        }
    }
}
