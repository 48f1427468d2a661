//! Flattened image export
//!
//! Renders the visible layers onto an isolated surface at an integer scale
//! and encodes the result as PNG, JPEG or WebP. No checkerboard, border or
//! selection decoration is ever part of an export.

use crate::error::{EditorError, Result};
use crate::layer::Layer;
use crate::renderer::{pixmap_to_rgba, Compositor};
use crate::scene::CanvasConfig;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Longest side a browser canvas can reliably allocate
pub const MAX_EXPORT_SIDE: u64 = 16384;

/// Largest total pixel count accepted for export
pub const MAX_EXPORT_PIXELS: u64 = 100_000_000;

/// Prefix of generated export file names
pub const EXPORT_FILE_PREFIX: &str = "bananashop";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Webp => "image/webp",
        }
    }

    /// Whether the quality setting affects this format
    pub fn is_lossy(self) -> bool {
        matches!(self, ExportFormat::Jpeg)
    }

    pub fn all() -> &'static [ExportFormat] {
        &[ExportFormat::Png, ExportFormat::Jpeg, ExportFormat::Webp]
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "jpg" | "jpeg" => Ok(ExportFormat::Jpeg),
            "webp" => Ok(ExportFormat::Webp),
            other => Err(format!("Unknown export format: {other}")),
        }
    }
}

/// Export settings chosen in the export dialog
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Encoder quality in [0, 1]; only used by lossy formats
    pub quality: f64,
    /// Integer output multiplier (1 = canvas size)
    pub scale: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Png,
            quality: 0.92,
            scale: 1,
        }
    }
}

impl ExportOptions {
    /// Quality mapped onto the encoder's 1..=100 range
    pub fn encoder_quality(&self) -> u8 {
        let quality = if self.quality.is_nan() { 0.92 } else { self.quality };
        (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
    }
}

/// Check output dimensions before any surface is allocated
///
/// Returns the output size on success.
pub fn validate_export(canvas: &CanvasConfig, scale: u32) -> Result<(u32, u32)> {
    if scale == 0 {
        return Err(EditorError::InvalidExportScale);
    }
    let width = canvas.width as u64 * scale as u64;
    let height = canvas.height as u64 * scale as u64;

    if width > MAX_EXPORT_SIDE || height > MAX_EXPORT_SIDE {
        return Err(EditorError::ExportTooLarge {
            width,
            height,
            max: MAX_EXPORT_SIDE,
        });
    }
    let pixels = width * height;
    if pixels > MAX_EXPORT_PIXELS {
        return Err(EditorError::ExportTooManyPixels {
            megapixels: (pixels + 500_000) / 1_000_000,
        });
    }
    // Both sides are within MAX_EXPORT_SIDE, so they fit in u32
    Ok((width as u32, height as u32))
}

/// Flatten and encode the layers
pub fn export_image(
    compositor: &mut Compositor,
    layers: &[Arc<Layer>],
    canvas: &CanvasConfig,
    options: &ExportOptions,
) -> Result<Vec<u8>> {
    let (width, height) = validate_export(canvas, options.scale)?;
    log::info!(
        "Exporting {} layers as {:?} at {}x{} ({}x)",
        layers.len(),
        options.format,
        width,
        height,
        options.scale
    );

    let surface = compositor.render_export(layers, canvas, options.scale)?;
    let rgba = pixmap_to_rgba(&surface);
    encode(&rgba, options)
}

fn encode(rgba: &RgbaImage, options: &ExportOptions) -> Result<Vec<u8>> {
    let (width, height) = rgba.dimensions();
    let mut bytes = Vec::new();

    match options.format {
        ExportFormat::Png => PngEncoder::new(&mut bytes)
            .write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(EditorError::Encode)?,
        ExportFormat::Jpeg => {
            // JPEG has no alpha; transparent pixels come out black
            let rgb: Vec<u8> = rgba
                .as_raw()
                .chunks_exact(4)
                .flat_map(|p| [p[0], p[1], p[2]])
                .collect();
            JpegEncoder::new_with_quality(&mut bytes, options.encoder_quality())
                .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
                .map_err(EditorError::Encode)?
        }
        ExportFormat::Webp => WebPEncoder::new_lossless(&mut bytes)
            .write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(EditorError::Encode)?,
    }

    Ok(bytes)
}

/// Download name for an export taken at `timestamp`
pub fn export_file_name(format: ExportFormat, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}-{}.{}",
        EXPORT_FILE_PREFIX,
        timestamp.format("%Y-%m-%d-%H-%M-%S"),
        format.extension()
    )
}
