//! Layer data model for Bananashop
//!
//! A layer is one raster image placed on the canvas with its own transform,
//! crop, opacity and visibility, plus the generative-edit conversation and
//! pixel version history attached to it.
//!
//! Pixel content lives in an [`ImageSource`], an immutable shared handle.
//! Cloning a layer (for snapshots or duplication) copies the small mutable
//! records and shares the pixels.

use crate::scene::CanvasConfig;
use crate::transform::LayerTransform;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Stable layer identifier, never reused
pub type LayerId = Uuid;

/// Number of newest chat messages allowed to keep an embedded image
pub const MAX_MESSAGES_WITH_IMAGES: usize = 10;

/// Maximum number of pixel versions kept per layer
pub const MAX_VERSIONS: usize = 20;

/// Position offset applied to duplicated layers, in canvas units
pub const DUPLICATE_OFFSET: f64 = 20.0;

/// Immutable decoded pixel content shared by every layer and snapshot using it
#[derive(Clone)]
pub struct ImageSource {
    id: Uuid,
    pixels: Arc<RgbaImage>,
}

impl ImageSource {
    /// Wrap decoded pixels with a fresh source id
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            pixels: Arc::new(pixels),
        }
    }

    /// Identifier used to key render caches
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

impl PartialEq for ImageSource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSource")
            .field("id", &self.id)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Sub-rectangle of the source image to render, in source pixels
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Clamp the rectangle into `[0, width] × [0, height]`
    pub fn clamped(&self, width: f64, height: f64) -> CropRect {
        let x = self.x.clamp(0.0, width);
        let y = self.y.clamp(0.0, height);
        CropRect {
            x,
            y,
            width: self.width.clamp(0.0, width - x),
            height: self.height.clamp(0.0, height - y),
        }
    }
}

/// Author of a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiRole {
    User,
    Model,
}

impl AiRole {
    /// Role name used in generation request payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            AiRole::User => "user",
            AiRole::Model => "model",
        }
    }
}

/// One entry of a layer's generative-edit conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    pub id: Uuid,
    pub role: AiRole,
    pub text: String,
    pub image_data_url: Option<String>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl AiMessage {
    pub fn new(role: AiRole, text: impl Into<String>, image_data_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            image_data_url,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(AiRole::User, text, None)
    }

    pub fn model(text: impl Into<String>, image_data_url: Option<String>) -> Self {
        Self::new(AiRole::Model, text, image_data_url)
    }
}

/// A recorded pixel state of a layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerVersion {
    pub image_data_url: String,
    pub prompt: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl LayerVersion {
    pub fn new(image_data_url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            image_data_url: image_data_url.into(),
            prompt: prompt.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// One positioned, transformable raster image within the scene
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    /// Unique identifier
    pub id: LayerId,

    /// Display name
    pub name: String,

    /// Placement in canvas space
    pub transform: LayerTransform,

    /// Shared pixel content
    pub source: ImageSource,

    /// Natural pixel dimensions of the source
    pub original_width: u32,
    pub original_height: u32,

    /// Optional sub-rectangle to render (`None` = full image)
    pub crop: Option<CropRect>,

    /// Layer opacity (0.0 to 1.0)
    pub opacity: f64,

    /// Whether the layer is drawn and hit-tested
    pub visible: bool,

    /// Generative-edit conversation for this layer
    pub ai_history: Vec<AiMessage>,

    /// Recorded pixel states, oldest first
    pub versions: Vec<LayerVersion>,

    /// Index into `versions` of the active state
    pub current_version_index: Option<usize>,
}

impl Layer {
    /// Create a layer with an identity transform
    pub fn new(source: ImageSource, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            transform: LayerTransform::default(),
            original_width: source.width(),
            original_height: source.height(),
            source,
            crop: None,
            opacity: 1.0,
            visible: true,
            ai_history: Vec::new(),
            versions: Vec::new(),
            current_version_index: None,
        }
    }

    /// Create a layer centred on the canvas, shrunk uniformly to fit
    ///
    /// Images smaller than the canvas keep their natural size.
    pub fn from_image(source: ImageSource, name: impl Into<String>, canvas: &CanvasConfig) -> Self {
        let mut layer = Self::new(source, name);
        let scale = (canvas.width as f64 / layer.original_width as f64)
            .min(canvas.height as f64 / layer.original_height as f64)
            .min(1.0);
        layer.transform = LayerTransform::centered(
            canvas.width as f64 / 2.0,
            canvas.height as f64 / 2.0,
            scale,
        );
        layer
    }

    /// Unscaled size of the rendered rectangle (crop or full image)
    pub fn display_size(&self) -> (f64, f64) {
        match &self.crop {
            Some(crop) => (crop.width, crop.height),
            None => (self.original_width as f64, self.original_height as f64),
        }
    }

    /// Set opacity clamped into [0, 1]; NaN is ignored
    ///
    /// Returns true if the stored value changed.
    pub(crate) fn set_opacity(&mut self, opacity: f64) -> bool {
        if opacity.is_nan() {
            return false;
        }
        let clamped = opacity.clamp(0.0, 1.0);
        if clamped == self.opacity {
            return false;
        }
        self.opacity = clamped;
        true
    }

    /// Set the crop rectangle, clamped into the source bounds
    pub(crate) fn set_crop(&mut self, crop: Option<CropRect>) {
        self.crop = crop.map(|c| {
            c.clamped(self.original_width as f64, self.original_height as f64)
        });
    }

    /// Swap the pixel source, updating natural dimensions and clearing the crop
    pub(crate) fn replace_source(&mut self, source: ImageSource) {
        self.original_width = source.width();
        self.original_height = source.height();
        self.source = source;
        self.crop = None;
    }

    /// Append a chat message, stripping images from all but the newest ten
    pub(crate) fn push_ai_message(&mut self, message: AiMessage) {
        self.ai_history.push(message);
        let cutoff = self.ai_history.len().saturating_sub(MAX_MESSAGES_WITH_IMAGES);
        for old in &mut self.ai_history[..cutoff] {
            old.image_data_url = None;
        }
    }

    /// Record a pixel version
    ///
    /// Versions after the current index are discarded first, then the oldest
    /// are evicted past the cap. The new version becomes current.
    pub(crate) fn push_version(&mut self, version: LayerVersion) {
        let keep = self.current_version_index.map_or(0, |i| i + 1);
        self.versions.truncate(keep);
        self.versions.push(version);
        if self.versions.len() > MAX_VERSIONS {
            let excess = self.versions.len() - MAX_VERSIONS;
            self.versions.drain(0..excess);
        }
        self.current_version_index = Some(self.versions.len() - 1);
    }

    /// Deep copy with a fresh id, a "(copy)" name and an offset position
    pub fn duplicate(&self) -> Layer {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        copy.name = format!("{} (copy)", self.name);
        copy.transform.x += DUPLICATE_OFFSET;
        copy.transform.y += DUPLICATE_OFFSET;
        copy
    }
}
