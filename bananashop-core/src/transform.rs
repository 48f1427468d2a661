//! Transform math for Bananashop
//!
//! Pure conversions between the three coordinate spaces the editor uses:
//!
//! - **Screen space**: pixels on the display surface
//! - **Canvas space**: the fixed logical coordinate system of the composite
//! - **Layer-local space**: a layer's own unrotated, unscaled frame, with the
//!   origin at the layer centre
//!
//! All rotations use one convention: radians = degrees × π/180 applied as a
//! standard 2D rotation matrix (`kurbo::Affine::rotate`).

use crate::layer::Layer;
use kurbo::{Affine, Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Distance of the rotation handle above the top edge, in screen pixels
pub const ROTATION_HANDLE_DISTANCE: f64 = 25.0;

/// Padding kept around the canvas by fit-to-screen, in screen pixels
pub const FIT_PADDING: f64 = 40.0;

/// Wheel zoom multiplier per notch
pub const WHEEL_ZOOM_FACTOR: f64 = 1.1;

/// Zoom clamp for interactive (wheel) zooming
pub const WHEEL_ZOOM_MIN: f64 = 0.05;
pub const WHEEL_ZOOM_MAX: f64 = 20.0;

/// Zoom multiplier for toolbar zoom in/out
pub const STEP_ZOOM_FACTOR: f64 = 1.25;

/// Zoom clamp for toolbar stepping
pub const STEP_ZOOM_MIN: f64 = 0.1;
pub const STEP_ZOOM_MAX: f64 = 10.0;

/// Placement of a layer in canvas space
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerTransform {
    /// X position of the layer centre
    pub x: f64,
    /// Y position of the layer centre
    pub y: f64,
    /// X scale factor (negative mirrors)
    pub scale_x: f64,
    /// Y scale factor (negative mirrors)
    pub scale_y: f64,
    /// Rotation about the centre, in degrees
    pub rotation: f64,
}

impl Default for LayerTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
        }
    }
}

impl LayerTransform {
    /// Create a transform centred at a position with uniform scale
    pub fn centered(x: f64, y: f64, scale: f64) -> Self {
        Self {
            x,
            y,
            scale_x: scale,
            scale_y: scale,
            rotation: 0.0,
        }
    }

    /// Layer centre as a point
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Convert to an affine matrix mapping layer-local space to canvas space
    ///
    /// Built as translate * rotate * scale, the same order the compositor
    /// uses to paint the layer.
    pub fn to_affine(&self) -> Affine {
        Affine::translate((self.x, self.y))
            * Affine::rotate(self.rotation.to_radians())
            * Affine::scale_non_uniform(self.scale_x, self.scale_y)
    }

    /// Merge a partial update into this transform
    pub fn apply(&mut self, patch: &TransformPatch) {
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(scale_x) = patch.scale_x {
            self.scale_x = scale_x;
        }
        if let Some(scale_y) = patch.scale_y {
            self.scale_y = scale_y;
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
    }

    /// True when every field has the same bit pattern as `other`
    ///
    /// Used by drag no-op elision, where "unchanged" must mean exactly
    /// unchanged rather than approximately equal.
    pub fn bit_identical(&self, other: &LayerTransform) -> bool {
        self.x.to_bits() == other.x.to_bits()
            && self.y.to_bits() == other.y.to_bits()
            && self.scale_x.to_bits() == other.scale_x.to_bits()
            && self.scale_y.to_bits() == other.scale_y.to_bits()
            && self.rotation.to_bits() == other.rotation.to_bits()
    }
}

/// Partial transform update; `None` fields are left untouched
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransformPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub scale_x: Option<f64>,
    pub scale_y: Option<f64>,
    pub rotation: Option<f64>,
}

impl TransformPatch {
    /// Patch that moves the layer centre
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    /// Patch that sets the rotation
    pub fn rotation(rotation: f64) -> Self {
        Self {
            rotation: Some(rotation),
            ..Default::default()
        }
    }

    /// Patch that sets both scale factors
    pub fn scale(scale_x: f64, scale_y: f64) -> Self {
        Self {
            scale_x: Some(scale_x),
            scale_y: Some(scale_y),
            ..Default::default()
        }
    }

    /// True when the patch changes nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Zoom/pan mapping from canvas space to screen space
///
/// Display only: never persisted into layer data or exported output.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl Viewport {
    /// Affine map from canvas space to screen space
    pub fn to_affine(&self) -> Affine {
        Affine::translate((self.offset_x, self.offset_y)) * Affine::scale(self.zoom)
    }

    /// Zoom to `new_zoom` (clamped) keeping the canvas point under `screen` fixed
    pub fn zoom_at(&self, screen: Point, new_zoom: f64, min: f64, max: f64) -> Viewport {
        self.anchored_zoom(screen, new_zoom.clamp(min, max))
    }

    fn anchored_zoom(&self, screen: Point, zoom: f64) -> Viewport {
        let ratio = zoom / self.zoom;
        Viewport {
            zoom,
            offset_x: screen.x - (screen.x - self.offset_x) * ratio,
            offset_y: screen.y - (screen.y - self.offset_y) * ratio,
        }
    }

    /// Wheel zoom about the pointer: one notch in for negative `delta_y`
    pub fn wheel_zoom(&self, screen: Point, delta_y: f64) -> Viewport {
        let factor = if delta_y < 0.0 {
            WHEEL_ZOOM_FACTOR
        } else {
            1.0 / WHEEL_ZOOM_FACTOR
        };
        self.zoom_at(screen, self.zoom * factor, WHEEL_ZOOM_MIN, WHEEL_ZOOM_MAX)
    }

    /// Zoom toward the canvas centre, keeping it fixed on screen
    ///
    /// `new_zoom` is used as given; callers apply their own clamp.
    pub fn zoom_toward_center(&self, canvas: Size, new_zoom: f64) -> Viewport {
        let center = canvas_to_screen(Point::new(canvas.width / 2.0, canvas.height / 2.0), self);
        self.anchored_zoom(center, new_zoom)
    }

    /// Toolbar zoom in, capped at [`STEP_ZOOM_MAX`]
    pub fn step_in(&self, canvas: Size) -> Viewport {
        self.zoom_toward_center(canvas, (self.zoom * STEP_ZOOM_FACTOR).min(STEP_ZOOM_MAX))
    }

    /// Toolbar zoom out, floored at [`STEP_ZOOM_MIN`]
    pub fn step_out(&self, canvas: Size) -> Viewport {
        self.zoom_toward_center(canvas, (self.zoom / STEP_ZOOM_FACTOR).max(STEP_ZOOM_MIN))
    }

    /// Back to 100%, keeping the canvas centre fixed
    pub fn reset_zoom(&self, canvas: Size) -> Viewport {
        self.zoom_toward_center(canvas, 1.0)
    }

    /// Fit the canvas into a container, centred, never enlarging past 100%
    ///
    /// Containers smaller than the padding still get a positive zoom, floored
    /// at [`STEP_ZOOM_MIN`].
    pub fn fit(canvas: Size, container: Size) -> Viewport {
        let zoom = ((container.width - FIT_PADDING * 2.0) / canvas.width)
            .min((container.height - FIT_PADDING * 2.0) / canvas.height)
            .min(1.0)
            .max(STEP_ZOOM_MIN);
        Viewport {
            zoom,
            offset_x: (container.width - canvas.width * zoom) / 2.0,
            offset_y: (container.height - canvas.height * zoom) / 2.0,
        }
    }
}

/// Convert a screen point to canvas space (inverse of the viewport map)
pub fn screen_to_canvas(screen: Point, viewport: &Viewport) -> Point {
    Point::new(
        (screen.x - viewport.offset_x) / viewport.zoom,
        (screen.y - viewport.offset_y) / viewport.zoom,
    )
}

/// Convert a canvas point to screen space
pub fn canvas_to_screen(canvas: Point, viewport: &Viewport) -> Point {
    Point::new(
        canvas.x * viewport.zoom + viewport.offset_x,
        canvas.y * viewport.zoom + viewport.offset_y,
    )
}

/// Convert a canvas point into a layer's local frame
///
/// Translate by the negated position, rotate by the negated rotation, then
/// divide by the per-axis scale. A zero scale yields non-finite coordinates,
/// which never pass a bounds test.
pub fn canvas_to_local(canvas: Point, transform: &LayerTransform) -> Point {
    let d = canvas - transform.position();
    let (sin, cos) = (-transform.rotation).to_radians().sin_cos();
    Point::new(
        (d.x * cos - d.y * sin) / transform.scale_x,
        (d.x * sin + d.y * cos) / transform.scale_y,
    )
}

/// Corners of a layer's rectangle in canvas space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corners {
    pub tl: Point,
    pub tr: Point,
    pub bl: Point,
    pub br: Point,
}

impl Corners {
    /// Corners in drawing order around the quadrilateral
    pub fn outline(&self) -> [Point; 4] {
        [self.tl, self.tr, self.br, self.bl]
    }

    /// Midpoint of the top edge
    pub fn top_mid(&self) -> Point {
        self.tl.midpoint(self.tr)
    }
}

/// Compute the four corners of a layer's (cropped or full) rectangle
pub fn get_corners(layer: &Layer) -> Corners {
    let (w, h) = layer.display_size();
    let (hw, hh) = (w / 2.0, h / 2.0);
    let affine = layer.transform.to_affine();
    Corners {
        tl: affine * Point::new(-hw, -hh),
        tr: affine * Point::new(hw, -hh),
        bl: affine * Point::new(-hw, hh),
        br: affine * Point::new(hw, hh),
    }
}

/// Position of the rotation handle above the top edge midpoint
///
/// The offset is a fixed screen distance, so it is divided by zoom to keep
/// the handle the same visual size at every zoom level.
pub fn get_rotation_handle_pos(corners: &Corners, zoom: f64) -> Point {
    let top_mid = corners.top_mid();
    let edge: Vec2 = corners.tr - corners.tl;
    let out_angle = (-edge.x).atan2(edge.y);
    let distance = ROTATION_HANDLE_DISTANCE / zoom;
    top_mid + Vec2::from_angle(out_angle) * distance
}
