//! Integration tests for AI edit, generation and background removal flows
//!
//! The generative collaborator and the background remover are replaced by
//! in-process fakes returning canned answers.

use bananashop_core::ai::{
    AiOutcome, BackgroundRemover, GenerateRequest, GenerateResult, GenerationError,
    ImageGenerator, ProgressFn, BACKGROUND_REMOVED_PROMPT,
};
use bananashop_core::image_io::{bytes_to_data_url, encode_png};
use bananashop_core::layer::{AiRole, ImageSource, Layer};
use bananashop_core::{EditorError, EditorStore, LayerId};
use image::{Rgba, RgbaImage};
use std::cell::RefCell;
use std::rc::Rc;

/// Generator returning the same answer every time, recording its requests
struct FakeGenerator {
    answer: Result<GenerateResult, GenerationError>,
    requests: RefCell<Vec<GenerateRequest>>,
}

impl FakeGenerator {
    fn answering(answer: Result<GenerateResult, GenerationError>) -> Self {
        Self {
            answer,
            requests: RefCell::new(Vec::new()),
        }
    }

    fn with_image(text: &str) -> Self {
        Self::answering(Ok(GenerateResult {
            text: text.to_string(),
            image_data_url: Some(blue_data_url()),
        }))
    }
}

impl ImageGenerator for FakeGenerator {
    fn generate(&self, api_key: &str, request: &GenerateRequest) -> Result<GenerateResult, GenerationError> {
        assert_eq!(api_key, "test-key");
        self.requests.borrow_mut().push(request.clone());
        self.answer.clone()
    }
}

/// Remover reporting two progress steps before answering
struct FakeRemover {
    answer: Result<Vec<u8>, String>,
}

impl BackgroundRemover for FakeRemover {
    fn remove_background(&self, _image: &RgbaImage, progress: &mut ProgressFn<'_>) -> Result<Vec<u8>, String> {
        progress("fetch:model", 1, 2);
        progress("compute:inference", 2, 2);
        self.answer.clone()
    }
}

fn blue_png() -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]))).unwrap()
}

fn blue_data_url() -> String {
    bytes_to_data_url(&blue_png())
}

/// Store with an API key and one selected 10x10 layer
fn setup_store() -> (EditorStore, LayerId) {
    let mut store = EditorStore::new();
    store.set_api_key("test-key");
    let layer = Layer::new(ImageSource::new(RgbaImage::new(10, 10)), "Photo");
    let id = store.add_layer(layer);
    (store, id)
}

#[test]
fn test_edit_replaces_pixels_and_records_version() {
    let (mut store, id) = setup_store();
    let generator = FakeGenerator::with_image("Here you go");
    let depth = store.history().undo_depth();

    let outcome = store.run_ai_edit(&generator, "  make it blue  ").unwrap();
    assert_eq!(outcome, AiOutcome::Applied);
    assert!(!store.state().ai_loading);

    let layer = store.layer(id).unwrap();
    assert_eq!((layer.original_width, layer.original_height), (4, 4));
    assert_eq!(layer.versions.len(), 1);
    assert_eq!(layer.versions[0].prompt, "make it blue");
    assert_eq!(layer.current_version_index, Some(0));
    assert_eq!(layer.ai_history.len(), 2);
    assert_eq!(layer.ai_history[0].role, AiRole::User);
    assert_eq!(layer.ai_history[1].role, AiRole::Model);
    assert!(layer.ai_history[1].image_data_url.is_some());

    // The reference image was the previous pixels
    let requests = generator.requests.borrow();
    assert!(requests[0].reference_image.as_deref().unwrap().starts_with("data:image/png;base64,"));

    assert_eq!(store.history().undo_depth(), depth + 1);
    assert_eq!(store.history().undo_description(), Some("AI Edit"));
    store.undo();
    assert_eq!(store.layer(id).unwrap().original_width, 10);
}

#[test]
fn test_follow_up_edit_sends_text_history() {
    let (mut store, _) = setup_store();
    let generator = FakeGenerator::with_image("Done");

    store.run_ai_edit(&generator, "first").unwrap();
    store.run_ai_edit(&generator, "second").unwrap();

    let requests = generator.requests.borrow();
    assert!(requests[0].history.is_empty());
    assert_eq!(requests[1].history.len(), 2);
    assert_eq!(requests[1].history[0].text, "first");
    assert_eq!(requests[1].history[1].text, "Done");
}

#[test]
fn test_failed_edit_leaves_no_undo_entry() {
    let (mut store, id) = setup_store();
    let generator = FakeGenerator::answering(Err(GenerationError::RateLimited));
    let depth = store.history().undo_depth();

    let outcome = store.run_ai_edit(&generator, "make it blue").unwrap();
    assert_eq!(outcome, AiOutcome::Failed);
    assert!(!store.state().ai_loading);
    assert_eq!(store.history().undo_depth(), depth);

    let layer = store.layer(id).unwrap();
    assert_eq!(layer.original_width, 10);
    assert!(layer.versions.is_empty());
    let last = layer.ai_history.last().unwrap();
    assert_eq!(last.role, AiRole::Model);
    assert_eq!(last.text, "Error: Rate limit reached. Please wait a moment and try again.");
}

#[test]
fn test_text_only_answer_keeps_pixels() {
    let (mut store, id) = setup_store();
    let generator = FakeGenerator::answering(Ok(GenerateResult {
        text: "I can't do that".to_string(),
        image_data_url: None,
    }));
    let depth = store.history().undo_depth();

    assert_eq!(store.run_ai_edit(&generator, "hmm").unwrap(), AiOutcome::Applied);
    let layer = store.layer(id).unwrap();
    assert_eq!(layer.original_width, 10);
    assert_eq!(layer.ai_history.last().unwrap().text, "I can't do that");
    assert_eq!(store.history().undo_depth(), depth);
}

#[test]
fn test_cancelled_edit_result_is_discarded() {
    let (mut store, id) = setup_store();
    let pending = store.begin_ai_edit("make it blue").unwrap();
    store.cancel_ai_request();
    assert!(!store.state().ai_loading);

    let answer = Ok(GenerateResult {
        text: "late".to_string(),
        image_data_url: Some(blue_data_url()),
    });
    assert_eq!(store.finish_ai_edit(pending, answer), AiOutcome::Stale);
    assert_eq!(store.layer(id).unwrap().original_width, 10);
    assert!(store.layer(id).unwrap().versions.is_empty());
}

#[test]
fn test_edit_target_removed_in_flight() {
    let (mut store, id) = setup_store();
    let pending = store.begin_ai_edit("make it blue").unwrap();
    store.remove_layer(id);

    let answer = Ok(GenerateResult {
        text: String::new(),
        image_data_url: Some(blue_data_url()),
    });
    assert_eq!(store.finish_ai_edit(pending, answer), AiOutcome::LayerGone);
    assert!(!store.state().ai_loading);
    assert!(store.layer(id).is_none());
}

#[test]
fn test_edit_requires_key_and_selection() {
    let mut store = EditorStore::new();
    store.add_layer(Layer::new(ImageSource::new(RgbaImage::new(4, 4)), "A"));
    assert!(matches!(store.begin_ai_edit("x"), Err(EditorError::MissingApiKey)));

    store.set_api_key("test-key");
    store.select_layer(None);
    assert!(matches!(store.begin_ai_edit("x"), Err(EditorError::NoLayerSelected)));
    assert!(!store.state().ai_loading);
}

#[test]
fn test_generation_adds_layer() {
    let mut store = EditorStore::new();
    store.set_api_key("test-key");
    let generator = FakeGenerator::with_image("A fox");

    let prompt = "A red fox sitting in fresh snow at dawn, photorealistic";
    assert_eq!(store.run_generation(&generator, prompt).unwrap(), AiOutcome::Applied);

    let layer = store.selected_layer().unwrap();
    assert!(layer.name.starts_with("A red fox"));
    assert!(layer.name.len() < prompt.len());
    assert_eq!(layer.versions.len(), 1);
    assert_eq!(layer.current_version_index, Some(0));
    assert_eq!(layer.ai_history.len(), 2);
    assert_eq!(layer.transform.x, 640.0);
    assert_eq!(store.history().undo_description(), Some("Add Layer"));

    // Generation never sends a reference image or history
    let requests = generator.requests.borrow();
    assert!(requests[0].reference_image.is_none());
    assert!(requests[0].history.is_empty());
}

#[test]
fn test_generation_without_image_reports_text() {
    let mut store = EditorStore::new();
    store.set_api_key("test-key");
    let generator = FakeGenerator::answering(Ok(GenerateResult {
        text: "Sorry, no".to_string(),
        image_data_url: None,
    }));

    assert_eq!(store.run_generation(&generator, "a fox").unwrap(), AiOutcome::Failed);
    assert!(store.scene().is_empty());
    assert!(store.take_notice().unwrap().contains("Sorry, no"));
}

#[test]
fn test_background_removal_reports_progress() {
    let (mut store, id) = setup_store();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe(move |state| sink.borrow_mut().push(state.background_removal_progress));

    let remover = FakeRemover { answer: Ok(blue_png()) };
    let outcome = store.run_background_removal(&remover, id).unwrap();
    assert_eq!(outcome, AiOutcome::Applied);

    let seen = seen.borrow();
    assert!(seen.contains(&Some(0.5)));
    assert!(seen.contains(&Some(1.0)));
    assert_eq!(store.state().background_removal_progress, None);

    let layer = store.layer(id).unwrap();
    assert_eq!(layer.original_width, 4);
    assert_eq!(layer.versions.last().unwrap().prompt, BACKGROUND_REMOVED_PROMPT);
    assert_eq!(store.history().undo_description(), Some("Remove Background"));
}

#[test]
fn test_background_removal_failure() {
    let (mut store, id) = setup_store();
    let depth = store.history().undo_depth();
    let remover = FakeRemover {
        answer: Err("model download failed".to_string()),
    };

    assert_eq!(store.run_background_removal(&remover, id).unwrap(), AiOutcome::Failed);
    assert_eq!(store.history().undo_depth(), depth);
    assert!(store.take_notice().unwrap().contains("model download failed"));
    assert_eq!(store.state().background_removal_progress, None);
}
