//! Generative-image and background-removal collaborators
//!
//! The core never performs network or model I/O itself. It prepares requests,
//! hands them to an [`ImageGenerator`] or [`BackgroundRemover`] supplied by the
//! embedding application, and applies results through the two-phase
//! `begin_*` / `finish_*` flows on [`EditorStore`](crate::store::EditorStore).
//!
//! Staleness is explicit: every request carries a [`RequestTicket`] from a
//! [`RequestTracker`], and a result is applied only while its ticket is still
//! current.

use crate::error::Result;
use crate::image_io::split_data_url;
use crate::layer::{AiMessage, AiRole, ImageSource, LayerId};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Maximum prompt length in characters
pub const MAX_PROMPT_LENGTH: usize = 2000;

/// Number of prompt characters used to name a generated layer
pub const GENERATED_NAME_LENGTH: usize = 30;

/// Prompt recorded on versions produced by background removal
pub const BACKGROUND_REMOVED_PROMPT: &str = "[Background Removed]";

/// Notice shown when generation returns neither an image nor text
pub const NO_IMAGE_MESSAGE: &str = "No image was generated. Try a different prompt.";

/// Image generation model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationModel {
    /// Fast model
    #[default]
    #[serde(rename = "gemini-2.5-flash-image")]
    Flash,
    /// Higher quality preview model
    #[serde(rename = "gemini-3-pro-image-preview")]
    Pro,
}

impl GenerationModel {
    /// Model identifier sent to the API
    pub fn id(self) -> &'static str {
        match self {
            GenerationModel::Flash => "gemini-2.5-flash-image",
            GenerationModel::Pro => "gemini-3-pro-image-preview",
        }
    }

    /// Get display name for the model
    pub fn display_name(self) -> &'static str {
        match self {
            GenerationModel::Flash => "Flash",
            GenerationModel::Pro => "Pro",
        }
    }

    pub fn all() -> &'static [GenerationModel] {
        &[GenerationModel::Flash, GenerationModel::Pro]
    }
}

/// Failures reported by the generative collaborator
///
/// `Display` gives the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Invalid API key. Check your settings.")]
    InvalidApiKey,

    #[error("Rate limit reached. Please wait a moment and try again.")]
    RateLimited,

    #[error("Content was blocked by safety filters. Try a different prompt.")]
    SafetyBlocked,

    #[error("API quota exhausted. Check your Google Cloud billing.")]
    QuotaExhausted,

    #[error("Permission denied. Ensure the Gemini API is enabled for your key.")]
    PermissionDenied,

    #[error("Network error. Check your internet connection.")]
    Network,

    #[error("Image is too large. Try with a smaller image.")]
    ImageTooLarge,

    /// Unclassified failure, carrying the client's own message
    #[error("{0}")]
    Other(String),
}

impl GenerationError {
    /// Classify a raw client error message
    ///
    /// Matching is case-insensitive and checked in a fixed order, so a message
    /// mentioning both "401" and "quota" is an invalid key.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_lowercase();
        let has = |needle: &str| msg.contains(needle);

        if has("api_key_invalid") || has("401") {
            GenerationError::InvalidApiKey
        } else if has("rate_limit") || has("429") {
            GenerationError::RateLimited
        } else if has("safety") || has("blocked") {
            GenerationError::SafetyBlocked
        } else if has("quota") || has("resource_exhausted") {
            GenerationError::QuotaExhausted
        } else if has("permission") || has("403") {
            GenerationError::PermissionDenied
        } else if has("fetch") || has("network") {
            GenerationError::Network
        } else if has("image") && has("too large") {
            GenerationError::ImageTooLarge
        } else {
            GenerationError::Other(message.to_string())
        }
    }
}

/// Trim a prompt and cap it at [`MAX_PROMPT_LENGTH`] characters
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.trim().chars().take(MAX_PROMPT_LENGTH).collect()
}

/// Name for a layer generated from `prompt`
pub fn generated_layer_name(prompt: &str) -> String {
    prompt.chars().take(GENERATED_NAME_LENGTH).collect()
}

/// One text-only turn of earlier conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: AiRole,
    pub text: String,
}

/// Everything the generative collaborator needs for one call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: GenerationModel,
    pub prompt: String,

    /// Earlier conversation, text only
    pub history: Vec<ChatTurn>,

    /// Current pixel state of the edited layer, as a data URL
    pub reference_image: Option<String>,
}

impl GenerateRequest {
    /// Build a request; history images are dropped and empty turns skipped
    pub fn new(
        model: GenerationModel,
        prompt: impl Into<String>,
        history: &[AiMessage],
        reference_image: Option<String>,
    ) -> Self {
        Self {
            model,
            prompt: prompt.into(),
            history: history
                .iter()
                .filter(|m| !m.text.is_empty())
                .map(|m| ChatTurn {
                    role: m.role,
                    text: m.text.clone(),
                })
                .collect(),
            reference_image,
        }
    }

    /// Role/parts payload for a `generateContent` call
    ///
    /// The new prompt is the final user turn, followed by the reference image
    /// as inline data when present.
    pub fn contents_json(&self) -> Result<Value> {
        let mut contents: Vec<Value> = self
            .history
            .iter()
            .map(|turn| json!({ "role": turn.role.as_str(), "parts": [{ "text": turn.text }] }))
            .collect();

        let mut parts = vec![json!({ "text": self.prompt })];
        if let Some(url) = &self.reference_image {
            let (mime_type, data) = split_data_url(url)?;
            parts.push(json!({ "inlineData": { "data": data, "mimeType": mime_type } }));
        }
        contents.push(json!({ "role": "user", "parts": parts }));
        Ok(Value::Array(contents))
    }
}

/// Answer from the generative collaborator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResult {
    pub text: String,
    pub image_data_url: Option<String>,
}

/// Generative-image client supplied by the embedding application
pub trait ImageGenerator {
    /// Run one generation; blocks until the answer arrives
    fn generate(
        &self,
        api_key: &str,
        request: &GenerateRequest,
    ) -> std::result::Result<GenerateResult, GenerationError>;
}

/// Progress reported during background removal: `(stage, current, total)`
pub type ProgressFn<'a> = dyn FnMut(&str, u64, u64) + 'a;

/// Background-removal engine supplied by the embedding application
pub trait BackgroundRemover {
    /// Return the encoded replacement image (any format the decoder reads)
    fn remove_background(
        &self,
        image: &RgbaImage,
        progress: &mut ProgressFn<'_>,
    ) -> std::result::Result<Vec<u8>, String>;
}

/// Tag identifying one asynchronous request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestTicket(u64);

/// Monotonically increasing request counter
///
/// Issuing a ticket or cancelling supersedes every earlier ticket.
#[derive(Debug, Default)]
pub struct RequestTracker {
    counter: u64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket for a new request
    pub fn begin(&mut self) -> RequestTicket {
        self.counter += 1;
        RequestTicket(self.counter)
    }

    /// Invalidate every outstanding ticket
    pub fn cancel(&mut self) {
        self.counter += 1;
    }

    /// True if `ticket` belongs to the most recent request
    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        ticket.0 == self.counter
    }
}

/// In-flight edit of an existing layer
#[derive(Debug, Clone)]
pub struct PendingEdit {
    pub ticket: RequestTicket,
    pub layer_id: LayerId,
    pub api_key: String,
    pub request: GenerateRequest,
}

impl PendingEdit {
    /// Data URL of the layer's pixels when the request was issued
    pub fn reference_image(&self) -> &str {
        self.request.reference_image.as_deref().unwrap_or_default()
    }
}

/// In-flight generation of a new layer
#[derive(Debug, Clone)]
pub struct PendingGeneration {
    pub ticket: RequestTicket,
    pub api_key: String,
    pub request: GenerateRequest,
}

/// In-flight background removal
#[derive(Debug, Clone)]
pub struct PendingBackgroundRemoval {
    pub ticket: RequestTicket,
    pub layer_id: LayerId,

    /// Pixels captured when the request was issued
    pub source: ImageSource,
}

/// What a `finish_*` call did with its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiOutcome {
    /// The result was applied to the scene
    Applied,
    /// A newer request or a cancellation superseded this one
    Stale,
    /// The target layer was removed while the request was in flight
    LayerGone,
    /// The collaborator failed; the failure was reported
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_errors() {
        let cases = [
            ("API_KEY_INVALID: bad key", GenerationError::InvalidApiKey),
            ("HTTP 401 Unauthorized", GenerationError::InvalidApiKey),
            ("429 Too Many Requests", GenerationError::RateLimited),
            ("Response was BLOCKED", GenerationError::SafetyBlocked),
            ("RESOURCE_EXHAUSTED", GenerationError::QuotaExhausted),
            ("403 Forbidden", GenerationError::PermissionDenied),
            ("Failed to fetch", GenerationError::Network),
            ("Image payload too large", GenerationError::ImageTooLarge),
        ];
        for (message, expected) in cases {
            assert_eq!(GenerationError::classify(message), expected, "{message}");
        }
        assert_eq!(
            GenerationError::classify("Something odd"),
            GenerationError::Other("Something odd".into())
        );
        assert_eq!(GenerationError::classify("Something odd").to_string(), "Something odd");
    }

    #[test]
    fn test_prompt_normalization() {
        assert_eq!(normalize_prompt("  a cat  "), "a cat");
        let long = "x".repeat(MAX_PROMPT_LENGTH + 50);
        assert_eq!(normalize_prompt(&long).chars().count(), MAX_PROMPT_LENGTH);
        assert_eq!(generated_layer_name("a very long prompt describing a banana"), "a very long prompt describing ");
    }

    #[test]
    fn test_contents_json_is_text_only_history() {
        let history = vec![
            AiMessage::user("make it blue"),
            AiMessage::model("done", Some("data:image/png;base64,AAAA".into())),
            AiMessage::model("", None),
        ];
        let request = GenerateRequest::new(
            GenerationModel::Flash,
            "now red",
            &history,
            Some("data:image/png;base64,QUJD".into()),
        );
        let contents = request.contents_json().unwrap();
        let turns = contents.as_array().unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1]["role"], "model");
        assert_eq!(turns[1]["parts"].as_array().unwrap().len(), 1);
        assert_eq!(turns[2]["parts"][0]["text"], "now red");
        assert_eq!(turns[2]["parts"][1]["inlineData"]["data"], "QUJD");
        assert_eq!(turns[2]["parts"][1]["inlineData"]["mimeType"], "image/png");
    }

    #[test]
    fn test_request_tracker() {
        let mut tracker = RequestTracker::new();
        let first = tracker.begin();
        assert!(tracker.is_current(first));
        let second = tracker.begin();
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
        tracker.cancel();
        assert!(!tracker.is_current(second));
    }

    #[test]
    fn test_model_ids() {
        assert_eq!(GenerationModel::default().id(), "gemini-2.5-flash-image");
        assert_eq!(GenerationModel::Pro.display_name(), "Pro");
        let json = serde_json::to_string(&GenerationModel::Pro).unwrap();
        assert_eq!(json, "\"gemini-3-pro-image-preview\"");
    }
}
