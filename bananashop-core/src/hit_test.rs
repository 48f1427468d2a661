//! Hit testing for selection and interaction
//!
//! Layers are treated as oriented rectangles (not per-pixel alpha). Points are
//! tested in canvas space by converting them into each layer's local frame.

use crate::layer::{Layer, LayerId};
use crate::transform::{canvas_to_local, get_corners, get_rotation_handle_pos};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Hit radius around each handle, in screen pixels
pub const HANDLE_HIT_RADIUS: f64 = 8.0;

/// Interactive control point on the selected layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleType {
    /// Top-left corner
    Tl,
    /// Top-right corner
    Tr,
    /// Bottom-left corner
    Bl,
    /// Bottom-right corner
    Br,
    /// Rotation knob above the top edge
    Rotate,
}

impl HandleType {
    /// True for the four scale corners
    pub fn is_corner(self) -> bool {
        !matches!(self, HandleType::Rotate)
    }
}

/// Result of a handle hit test
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleInfo {
    pub handle: HandleType,
    pub layer_id: LayerId,
}

/// Hit test a single layer at a canvas point
///
/// Invisible layers and degenerate zero-scale layers never hit.
pub fn hit_test_layer(layer: &Layer, point: Point) -> bool {
    if !layer.visible || layer.transform.scale_x == 0.0 || layer.transform.scale_y == 0.0 {
        return false;
    }
    let local = canvas_to_local(point, &layer.transform);
    let (w, h) = layer.display_size();
    local.x.abs() <= w / 2.0 && local.y.abs() <= h / 2.0
}

/// Hit test layers in paint order and return the topmost hit
pub fn hit_test_layers(layers: &[Arc<Layer>], point: Point) -> Option<&Arc<Layer>> {
    // Last in paint order is frontmost
    layers.iter().rev().find(|layer| hit_test_layer(layer, point))
}

/// Hit test the transform handles of a layer
///
/// The hit radius is a fixed screen distance, divided by `zoom` before the
/// comparison in canvas units. Handles are tested in the order tl, tr, bl,
/// br, rotate; the first match wins.
pub fn hit_test_handle(point: Point, layer: &Layer, zoom: f64) -> Option<HandleInfo> {
    let corners = get_corners(layer);
    let radius = HANDLE_HIT_RADIUS / zoom;

    let handles = [
        (HandleType::Tl, corners.tl),
        (HandleType::Tr, corners.tr),
        (HandleType::Bl, corners.bl),
        (HandleType::Br, corners.br),
        (HandleType::Rotate, get_rotation_handle_pos(&corners, zoom)),
    ];

    handles
        .into_iter()
        .find(|(_, pos)| (point - *pos).hypot2() <= radius * radius)
        .map(|(handle, _)| HandleInfo {
            handle,
            layer_id: layer.id,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::tests::test_layer;
    use crate::transform::LayerTransform;

    #[test]
    fn test_hit_test_rotated_layer() {
        let mut layer = test_layer(200, 20);
        layer.transform = LayerTransform::centered(100.0, 100.0, 1.0);
        assert!(hit_test_layer(&layer, Point::new(190.0, 100.0)));
        assert!(!hit_test_layer(&layer, Point::new(100.0, 150.0)));

        // Rotated 90°: the long side now runs vertically
        layer.transform.rotation = 90.0;
        assert!(!hit_test_layer(&layer, Point::new(190.0, 100.0)));
        assert!(hit_test_layer(&layer, Point::new(100.0, 190.0)));
    }

    #[test]
    fn test_invisible_and_zero_scale_never_hit() {
        let mut layer = test_layer(100, 100);
        assert!(hit_test_layer(&layer, Point::ZERO));
        layer.visible = false;
        assert!(!hit_test_layer(&layer, Point::ZERO));
        layer.visible = true;
        layer.transform.scale_x = 0.0;
        assert!(!hit_test_layer(&layer, Point::ZERO));
    }

    #[test]
    fn test_mirrored_layer_hits() {
        let mut layer = test_layer(100, 50);
        layer.transform.scale_x = -2.0;
        assert!(hit_test_layer(&layer, Point::new(-90.0, 0.0)));
        assert!(hit_test_layer(&layer, Point::new(90.0, 0.0)));
        assert!(!hit_test_layer(&layer, Point::new(110.0, 0.0)));
    }

    #[test]
    fn test_topmost_wins() {
        let bottom = Arc::new(test_layer(100, 100));
        let top = Arc::new(test_layer(100, 100));
        let layers = vec![bottom.clone(), top.clone()];
        let hit = hit_test_layers(&layers, Point::new(10.0, 10.0));
        assert_eq!(hit.map(|l| l.id), Some(top.id));
        assert!(hit_test_layers(&layers, Point::new(500.0, 0.0)).is_none());
    }

    #[test]
    fn test_handle_hit_order_and_radius() {
        let mut layer = test_layer(100, 100);
        layer.transform = LayerTransform::centered(0.0, 0.0, 1.0);

        let hit = hit_test_handle(Point::new(-47.0, -47.0), &layer, 1.0);
        assert_eq!(hit.map(|h| h.handle), Some(HandleType::Tl));
        let hit = hit_test_handle(Point::new(50.0, 50.0), &layer, 1.0);
        assert_eq!(hit.map(|h| h.handle), Some(HandleType::Br));
        let hit = hit_test_handle(Point::new(0.0, -75.0), &layer, 1.0);
        assert_eq!(hit.map(|h| h.handle), Some(HandleType::Rotate));
        assert!(hit_test_handle(Point::new(0.0, 0.0), &layer, 1.0).is_none());

        // At zoom 4 the radius shrinks to 2 canvas units
        assert!(hit_test_handle(Point::new(-47.0, -47.0), &layer, 4.0).is_none());
    }

    #[test]
    fn test_overlapping_handles_pick_first() {
        // A tiny layer puts every handle within reach of its centre
        let layer = test_layer(2, 2);
        let hit = hit_test_handle(Point::ZERO, &layer, 1.0);
        assert_eq!(hit.map(|h| h.handle), Some(HandleType::Tl));
    }
}
