//! Error types for the editor core
//!
//! Every failure in the core degrades to a reported message and an unchanged
//! scene. The `Display` text of each variant is the message shown to the user.
//!
//! Operations on layer ids that no longer exist are not errors: they can
//! legitimately arise from async races and are treated as no-ops.

use crate::ai::GenerationError;
use thiserror::Error;

/// Errors surfaced by editor operations
#[derive(Debug, Error)]
pub enum EditorError {
    /// Uploaded or dropped bytes could not be decoded as an image
    #[error("Could not load image. Format may not be supported.")]
    ImageDecode(#[source] image::ImageError),

    /// A data URL was malformed (missing header or base64 payload)
    #[error("Invalid data URL")]
    InvalidDataUrl,

    /// A data URL payload was not valid base64
    #[error("Invalid data URL payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The generative collaborator rejected the request
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The generative collaborator answered without an image
    #[error("{0}")]
    NoImageGenerated(String),

    /// The background-removal collaborator failed
    #[error("Background removal failed: {0}")]
    BackgroundRemoval(String),

    /// Export side length exceeds the platform ceiling
    #[error("Export dimensions too large ({width}x{height}). Maximum is {max}px per side. Reduce canvas size or scale.")]
    ExportTooLarge { width: u64, height: u64, max: u64 },

    /// Export pixel count exceeds the platform ceiling
    #[error("Export has too many pixels ({megapixels}M). Reduce canvas size or scale.")]
    ExportTooManyPixels { megapixels: u64 },

    /// Export scale must be a positive integer
    #[error("Export scale must be at least 1")]
    InvalidExportScale,

    /// Encoding the flattened composite failed
    #[error("Export failed: {0}")]
    Encode(#[source] image::ImageError),

    /// A raster surface could not be allocated (zero or oversized dimensions)
    #[error("Could not allocate a {width}x{height} surface")]
    Surface { width: u32, height: u32 },

    /// Prompt is empty after trimming
    #[error("Prompt is empty")]
    EmptyPrompt,

    /// No API key has been configured
    #[error("Set an API key to start")]
    MissingApiKey,

    /// Another generative request is still in flight
    #[error("A request is already in progress")]
    RequestInProgress,

    /// Edit mode requires a selected layer
    #[error("Select a layer to edit with AI")]
    NoLayerSelected,

    /// The layer addressed by an async operation disappeared
    #[error("Layer no longer exists")]
    LayerGone,
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, EditorError>;
