//! Compositing for Bananashop scenes
//!
//! Paints layers onto a `tiny_skia::Pixmap` on the CPU. The display path
//! applies the viewport and draws the checkerboard, canvas border and selection
//! decoration; the export path paints only the layers, at an integer scale,
//! onto an isolated transparent surface.

use crate::error::{EditorError, Result};
use crate::layer::{ImageSource, Layer, LayerId};
use crate::scene::CanvasConfig;
use crate::transform::{get_corners, get_rotation_handle_pos, Viewport};
use image::RgbaImage;
use kurbo::{Affine, Point};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tiny_skia::{
    Color, FillRule, FilterQuality, Paint, PathBuilder, Pattern, Pixmap, Rect, SpreadMode, Stroke,
    Transform,
};
use uuid::Uuid;

/// Checkerboard square size, in canvas units
pub const CHECKER_SIZE: u32 = 16;

/// Selection handle square size, in screen pixels
pub const HANDLE_SIZE: f64 = 6.0;

/// Selection outline width, in screen pixels
pub const SELECTION_LINE_WIDTH: f64 = 1.5;

/// Rotation knob radius, in screen pixels
pub const ROTATION_KNOB_RADIUS: f64 = 4.0;

const CHECKER_LIGHT: [u8; 3] = [0xf3, 0xf4, 0xf6];
const CHECKER_DARK: [u8; 3] = [0xd1, 0xd5, 0xdb];
const BORDER_COLOR: [u8; 3] = [0x6b, 0x72, 0x80];
const SELECTION_COLOR: [u8; 3] = [0x3b, 0x82, 0xf6];

/// Premultiplied pixmaps of layer sources, keyed by source id
pub struct ImageCache {
    cache: HashMap<Uuid, Arc<Pixmap>>,
}

impl ImageCache {
    /// Create a new empty image cache
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Get or upload a source's pixmap, caching the result
    ///
    /// Returns `None` for empty images, which cannot back a pixmap.
    pub fn get_or_upload(&mut self, source: &ImageSource) -> Option<Arc<Pixmap>> {
        if let Some(cached) = self.cache.get(&source.id()) {
            return Some(Arc::clone(cached));
        }

        let pixmap = Arc::new(rgba_to_pixmap(source.pixels())?);
        self.cache.insert(source.id(), Arc::clone(&pixmap));
        Some(pixmap)
    }

    /// Clear the cache entry of one source
    pub fn invalidate(&mut self, id: &Uuid) {
        self.cache.remove(id);
    }

    /// Clear all cached images
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Drop every entry whose source is not in `live`
    pub fn prune(&mut self, live: impl IntoIterator<Item = Uuid>) {
        let live: HashSet<Uuid> = live.into_iter().collect();
        self.cache.retain(|id, _| live.contains(id));
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert straight-alpha RGBA pixels into a premultiplied pixmap
pub fn rgba_to_pixmap(image: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width(), image.height())?;
    for (dst, src) in pixmap
        .data_mut()
        .chunks_exact_mut(4)
        .zip(image.as_raw().chunks_exact(4))
    {
        let alpha = src[3] as u16;
        dst[0] = ((src[0] as u16 * alpha + 127) / 255) as u8;
        dst[1] = ((src[1] as u16 * alpha + 127) / 255) as u8;
        dst[2] = ((src[2] as u16 * alpha + 127) / 255) as u8;
        dst[3] = src[3];
    }
    Some(pixmap)
}

/// Convert a premultiplied pixmap back into straight-alpha RGBA pixels
pub fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let mut data = pixmap.data().to_vec();
    for pixel in data.chunks_exact_mut(4) {
        let alpha = pixel[3];
        if alpha == 0 {
            pixel[0] = 0;
            pixel[1] = 0;
            pixel[2] = 0;
            continue;
        }
        let alpha_u16 = alpha as u16;
        pixel[0] = ((pixel[0] as u16 * 255 + alpha_u16 / 2) / alpha_u16).min(255) as u8;
        pixel[1] = ((pixel[1] as u16 * 255 + alpha_u16 / 2) / alpha_u16).min(255) as u8;
        pixel[2] = ((pixel[2] as u16 * 255 + alpha_u16 / 2) / alpha_u16).min(255) as u8;
    }
    // Buffer length always matches width * height * 4
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
        .unwrap_or_else(|| RgbaImage::new(pixmap.width(), pixmap.height()))
}

fn to_skia(affine: Affine) -> Transform {
    let [a, b, c, d, e, f] = affine.as_coeffs();
    Transform::from_row(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32)
}

fn solid_paint(rgb: [u8; 3]) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(Color::from_rgba8(rgb[0], rgb[1], rgb[2], 255));
    paint.anti_alias = true;
    paint
}

fn checker_tile() -> Option<Pixmap> {
    let size = CHECKER_SIZE * 2;
    let mut tile = Pixmap::new(size, size)?;
    for (i, pixel) in tile.data_mut().chunks_exact_mut(4).enumerate() {
        let x = i as u32 % size;
        let y = i as u32 / size;
        let rgb = if (x / CHECKER_SIZE + y / CHECKER_SIZE) % 2 == 0 {
            CHECKER_DARK
        } else {
            CHECKER_LIGHT
        };
        pixel.copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
    }
    Some(tile)
}

/// CPU compositor with a per-source pixmap cache
pub struct Compositor {
    cache: ImageCache,
    checker: Option<Pixmap>,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor {
    pub fn new() -> Self {
        Self {
            cache: ImageCache::new(),
            checker: checker_tile(),
        }
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ImageCache {
        &mut self.cache
    }

    /// Draw the display view of a scene
    ///
    /// Clears the surface, then under the viewport transform paints the
    /// checkerboard clipped to the canvas, the canvas border, every visible
    /// layer bottom to top and finally the selection decoration.
    pub fn render(
        &mut self,
        surface: &mut Pixmap,
        layers: &[Arc<Layer>],
        selected: Option<LayerId>,
        viewport: &Viewport,
        canvas: &CanvasConfig,
    ) {
        surface.fill(Color::TRANSPARENT);
        let view = viewport.to_affine();

        if let Some(canvas_rect) = Rect::from_xywh(0.0, 0.0, canvas.width as f32, canvas.height as f32) {
            if let Some(tile) = &self.checker {
                let mut paint = Paint::default();
                paint.shader = Pattern::new(
                    tile.as_ref(),
                    SpreadMode::Repeat,
                    FilterQuality::Nearest,
                    1.0,
                    Transform::identity(),
                );
                surface.fill_rect(canvas_rect, &paint, to_skia(view), None);
            }

            let border = PathBuilder::from_rect(canvas_rect);
            let stroke = Stroke {
                width: (1.0 / viewport.zoom) as f32,
                ..Stroke::default()
            };
            surface.stroke_path(&border, &solid_paint(BORDER_COLOR), &stroke, to_skia(view), None);
        }

        self.draw_layers(surface, layers, view);

        if let Some(layer) = selected.and_then(|id| layers.iter().find(|l| l.id == id)) {
            draw_selection(surface, layer, viewport.zoom, view);
        }
    }

    /// Flatten the layers onto a new transparent surface of `canvas × scale`
    pub fn render_export(
        &mut self,
        layers: &[Arc<Layer>],
        canvas: &CanvasConfig,
        scale: u32,
    ) -> Result<Pixmap> {
        let width = canvas.width.saturating_mul(scale);
        let height = canvas.height.saturating_mul(scale);
        let mut surface = Pixmap::new(width, height).ok_or(EditorError::Surface { width, height })?;
        self.draw_layers(&mut surface, layers, Affine::scale(scale as f64));
        Ok(surface)
    }

    fn draw_layers(&mut self, surface: &mut Pixmap, layers: &[Arc<Layer>], base: Affine) {
        for layer in layers.iter().filter(|l| l.visible) {
            self.draw_layer(surface, layer, base);
        }
    }

    fn draw_layer(&mut self, surface: &mut Pixmap, layer: &Layer, base: Affine) {
        let Some(pixmap) = self.cache.get_or_upload(&layer.source) else {
            return;
        };
        let (w, h) = layer.display_size();
        let (crop_x, crop_y) = layer.crop.map_or((0.0, 0.0), |c| (c.x, c.y));
        let Some(rect) = Rect::from_xywh((-w / 2.0) as f32, (-h / 2.0) as f32, w as f32, h as f32) else {
            return;
        };

        // Source pixel (crop_x, crop_y) lands on the local top-left corner
        let pattern_ts = Transform::from_translate((-w / 2.0 - crop_x) as f32, (-h / 2.0 - crop_y) as f32);
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.shader = Pattern::new(
            Pixmap::as_ref(&pixmap),
            SpreadMode::Pad,
            FilterQuality::Bilinear,
            layer.opacity as f32,
            pattern_ts,
        );
        surface.fill_rect(rect, &paint, to_skia(base * layer.transform.to_affine()), None);
    }
}

fn draw_selection(surface: &mut Pixmap, layer: &Layer, zoom: f64, view: Affine) {
    let corners = get_corners(layer);
    let ts = to_skia(view);
    let blue = solid_paint(SELECTION_COLOR);
    let white = solid_paint([0xff, 0xff, 0xff]);
    let stroke = Stroke {
        width: (SELECTION_LINE_WIDTH / zoom) as f32,
        ..Stroke::default()
    };
    let pt = |p: Point| (p.x as f32, p.y as f32);

    // Bounding quad
    let mut pb = PathBuilder::new();
    let outline = corners.outline();
    let (x, y) = pt(outline[0]);
    pb.move_to(x, y);
    for corner in &outline[1..] {
        let (x, y) = pt(*corner);
        pb.line_to(x, y);
    }
    pb.close();
    if let Some(path) = pb.finish() {
        surface.stroke_path(&path, &blue, &stroke, ts, None);
    }

    // Corner handles
    let size = HANDLE_SIZE / zoom;
    for corner in outline {
        let rect = Rect::from_xywh(
            (corner.x - size / 2.0) as f32,
            (corner.y - size / 2.0) as f32,
            size as f32,
            size as f32,
        );
        if let Some(rect) = rect {
            surface.fill_rect(rect, &white, ts, None);
            surface.stroke_path(&PathBuilder::from_rect(rect), &blue, &stroke, ts, None);
        }
    }

    // Rotation stem and knob
    let top_mid = corners.top_mid();
    let knob = get_rotation_handle_pos(&corners, zoom);
    let mut pb = PathBuilder::new();
    pb.move_to(top_mid.x as f32, top_mid.y as f32);
    pb.line_to(knob.x as f32, knob.y as f32);
    if let Some(stem) = pb.finish() {
        surface.stroke_path(&stem, &blue, &stroke, ts, None);
    }
    if let Some(circle) = PathBuilder::from_circle(knob.x as f32, knob.y as f32, (ROTATION_KNOB_RADIUS / zoom) as f32) {
        surface.fill_path(&circle, &white, FillRule::Winding, ts, None);
        surface.stroke_path(&circle, &blue, &stroke, ts, None);
    }
}
