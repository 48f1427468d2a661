//! Observable editor state
//!
//! `EditorStore` owns the single [`EditorState`] plus the undo history and
//! request trackers. It is the only way to mutate the scene: every layer
//! operation, history step and asynchronous result goes through it, and every
//! change notifies the subscribed listeners.
//!
//! ## Undo policy
//!
//! - Discrete operations (add, remove, reorder, rename, visibility, crop,
//!   image replacement, duplicate) snapshot as their first effect.
//! - Continuous operations (transform updates, opacity) never snapshot; the
//!   caller pushes one snapshot at the start of a gesture, or uses
//!   [`EditorStore::begin_continuous_edit`] / [`EditorStore::end_continuous_edit`].
//! - Asynchronous edits snapshot only after their result has been decoded.
//!
//! Operations addressing a layer id that no longer exists are silent no-ops.

use crate::ai::{
    generated_layer_name, normalize_prompt, AiOutcome, BackgroundRemover, GenerateRequest,
    GenerateResult, GenerationError, GenerationModel, ImageGenerator, PendingBackgroundRemoval,
    PendingEdit, PendingGeneration, RequestTicket, RequestTracker, BACKGROUND_REMOVED_PROMPT,
    NO_IMAGE_MESSAGE,
};
use crate::credentials::{CredentialStore, MemoryCredentialStore, API_KEY_NAME};
use crate::error::{EditorError, Result};
use crate::export::{export_image, ExportOptions};
use crate::history::{History, HistoryEntry, HistoryToken};
use crate::image_io::{
    bytes_to_data_url, decode_data_url, decode_image, encode_data_url, MAX_DATA_URL_DIMENSION,
};
use crate::layer::{AiMessage, CropRect, ImageSource, Layer, LayerId, LayerVersion};
use crate::renderer::Compositor;
use crate::scene::{CanvasConfig, Scene};
use crate::shortcuts::EditorCommand;
use crate::tool::Tool;
use crate::transform::{TransformPatch, Viewport};
use kurbo::{Point, Size};

/// Notice shown after deleting a layer from the keyboard
pub const LAYER_DELETED_NOTICE: &str = "Layer deleted. Ctrl+Z to undo";

/// Open/closed state of the modal dialogs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DialogState {
    pub export_open: bool,
    pub settings_open: bool,
    pub shortcuts_open: bool,
}

impl DialogState {
    /// True while any modal dialog is shown
    pub fn any_open(&self) -> bool {
        self.export_open || self.settings_open || self.shortcuts_open
    }
}

/// Everything observers can read about the editor
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState {
    /// Layers and selection (the unit of undo)
    pub scene: Scene,

    /// Display zoom/pan
    pub viewport: Viewport,

    /// Logical composite size
    pub canvas_config: CanvasConfig,

    pub active_tool: Tool,

    /// Model used for generation requests
    pub selected_model: GenerationModel,

    /// A generation or edit request is in flight
    pub ai_loading: bool,

    /// Background-removal progress in [0, 1], `None` when idle
    pub background_removal_progress: Option<f64>,

    pub dialogs: DialogState,

    /// Transient user-facing message (toast)
    pub notice: Option<String>,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            scene: Scene::new(),
            viewport: Viewport::default(),
            canvas_config: CanvasConfig::default(),
            active_tool: Tool::default(),
            selected_model: GenerationModel::default(),
            ai_loading: false,
            background_removal_progress: None,
            dialogs: DialogState::default(),
            notice: None,
        }
    }
}

/// Handle returned by [`EditorStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&EditorState)>;

/// Owner of the editor state, history and request trackers
pub struct EditorStore {
    state: EditorState,
    history: History,

    /// Shared by edit and generation requests (one `ai_loading` flag)
    ai_requests: RequestTracker,
    background_requests: RequestTracker,

    credentials: Box<dyn CredentialStore>,

    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,

    /// Snapshot of a continuous edit that has not yet ended
    continuous_edit: Option<HistoryToken>,
}

impl Default for EditorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorStore {
    /// Create an empty editor with in-memory credentials
    pub fn new() -> Self {
        Self::with_credentials(Box::new(MemoryCredentialStore::new()))
    }

    /// Create an empty editor backed by the given credential storage
    pub fn with_credentials(credentials: Box<dyn CredentialStore>) -> Self {
        Self {
            state: EditorState::default(),
            history: History::new(),
            ai_requests: RequestTracker::new(),
            background_requests: RequestTracker::new(),
            credentials,
            listeners: Vec::new(),
            next_subscription: 0,
            continuous_edit: None,
        }
    }

    // === READ ACCESS ===

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn scene(&self) -> &Scene {
        &self.state.scene
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.state.scene.layer(id)
    }

    pub fn selected_layer_id(&self) -> Option<LayerId> {
        self.state.scene.selected_layer_id()
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        self.state.scene.selected_layer()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // === SUBSCRIPTIONS ===

    /// Register a listener called with the new state after every change
    pub fn subscribe(&mut self, listener: impl FnMut(&EditorState) + 'static) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    fn notify(&mut self) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&self.state);
        }
    }

    /// Mutate one layer and notify; `None` when the id is unknown
    fn edit_layer<R>(&mut self, id: LayerId, f: impl FnOnce(&mut Layer) -> R) -> Option<R> {
        let result = self.state.scene.update_layer(id, f);
        match result {
            Some(_) => self.notify(),
            None => log::debug!("Ignoring edit of missing layer {}", id),
        }
        result
    }

    // === HISTORY ===

    /// Snapshot the current scene as one undo step
    pub fn push_history(&mut self, description: impl Into<String>) -> HistoryToken {
        let entry = HistoryEntry::new(self.state.scene.clone(), description);
        log::debug!("History push: {}", entry.description);
        self.history.push(entry)
    }

    /// Drop the snapshot pushed under `token` (a gesture that changed nothing)
    ///
    /// Does nothing unless that snapshot is still the next step to undo.
    pub fn retract_history(&mut self, token: HistoryToken) -> bool {
        match self.history.retract(token) {
            Some(entry) => {
                log::debug!("History retract: {}", entry.description);
                true
            }
            None => {
                log::debug!("History retract skipped: snapshot is no longer the newest step");
                false
            }
        }
    }

    /// Undo the last step; returns false if there was nothing to undo
    pub fn undo(&mut self) -> bool {
        let current = self.state.scene.clone();
        match self.history.undo(current) {
            Some(scene) => {
                self.state.scene = scene;
                log::info!("Undo");
                self.notify();
                true
            }
            None => false,
        }
    }

    /// Redo the last undone step; returns false if there was nothing to redo
    pub fn redo(&mut self) -> bool {
        let current = self.state.scene.clone();
        match self.history.redo(current) {
            Some(scene) => {
                self.state.scene = scene;
                log::info!("Redo");
                self.notify();
                true
            }
            None => false,
        }
    }

    /// Start a continuous edit (slider drag, numeric field)
    ///
    /// Only the first call of an edit snapshots; later calls until
    /// [`end_continuous_edit`](Self::end_continuous_edit) are no-ops.
    pub fn begin_continuous_edit(&mut self, description: impl Into<String>) {
        if self.continuous_edit.is_none() {
            self.continuous_edit = Some(self.push_history(description));
        }
    }

    /// Finish a continuous edit, retracting its snapshot if nothing changed
    ///
    /// Returns false when the snapshot was retracted. A snapshot that was
    /// undone or buried under a later step is left alone.
    pub fn end_continuous_edit(&mut self) -> bool {
        let Some(token) = self.continuous_edit.take() else {
            return false;
        };
        let unchanged = self.history.is_newest(token)
            && self
                .history
                .peek()
                .is_some_and(|entry| entry.scene == self.state.scene);
        if unchanged {
            self.retract_history(token);
            false
        } else {
            true
        }
    }

    // === LAYER OPERATIONS ===

    /// Append a layer at the top of the paint order and select it
    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        let id = layer.id;
        log::info!("Add layer '{}' ({}x{})", layer.name, layer.original_width, layer.original_height);
        self.push_history("Add Layer");
        self.state.scene.push_layer(layer);
        self.state.scene.set_selected(Some(id));
        self.notify();
        id
    }

    /// Decode image bytes into a new layer fit to the canvas
    ///
    /// A decode failure is reported as a notice (and returned); nothing else
    /// changes.
    pub fn add_image_layer(&mut self, bytes: &[u8], name: &str) -> Result<LayerId> {
        match decode_image(bytes) {
            Ok(source) => {
                let layer = Layer::from_image(source, name, &self.state.canvas_config);
                Ok(self.add_layer(layer))
            }
            Err(err) => {
                self.set_notice(format!("Could not load \"{}\". Format may not be supported.", name));
                log::warn!("Failed to decode '{}': {}", name, err);
                Err(err)
            }
        }
    }

    /// Remove a layer, clearing the selection if it was selected
    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        if self.state.scene.index_of(id).is_none() {
            log::debug!("Ignoring removal of missing layer {}", id);
            return false;
        }
        self.push_history("Delete Layer");
        self.state.scene.remove_layer(id);
        log::info!("Removed layer {}", id);
        self.notify();
        true
    }

    /// Change the selection (not an undo step); `None` clears it
    pub fn select_layer(&mut self, id: Option<LayerId>) -> bool {
        if let Some(id) = id {
            if self.state.scene.index_of(id).is_none() {
                return false;
            }
        }
        if self.state.scene.selected_layer_id() != id {
            self.state.scene.set_selected(id);
            self.notify();
        }
        true
    }

    /// Move the layer at `from` to index `to`
    pub fn reorder_layers(&mut self, from: usize, to: usize) -> bool {
        let len = self.state.scene.len();
        if from >= len || to >= len || from == to {
            return false;
        }
        self.push_history("Reorder Layers");
        self.state.scene.reorder(from, to);
        self.notify();
        true
    }

    pub fn rename_layer(&mut self, id: LayerId, name: impl Into<String>) -> bool {
        let name = name.into();
        match self.layer(id) {
            Some(layer) if layer.name != name => {}
            _ => return false,
        }
        self.push_history("Rename Layer");
        self.edit_layer(id, |layer| layer.name = name).is_some()
    }

    /// Set opacity (clamped into [0, 1]); a continuous operation
    pub fn set_layer_opacity(&mut self, id: LayerId, opacity: f64) -> bool {
        self.edit_layer(id, |layer| layer.set_opacity(opacity)).is_some()
    }

    pub fn toggle_visibility(&mut self, id: LayerId) -> bool {
        if self.layer(id).is_none() {
            return false;
        }
        self.push_history("Toggle Visibility");
        self.edit_layer(id, |layer| layer.visible = !layer.visible).is_some()
    }

    /// Set or clear the crop rectangle (clamped into the source bounds)
    pub fn set_layer_crop(&mut self, id: LayerId, crop: Option<CropRect>) -> bool {
        let Some(layer) = self.layer(id) else {
            return false;
        };
        let clamped = crop.map(|c| {
            c.clamped(layer.original_width as f64, layer.original_height as f64)
        });
        if clamped == layer.crop {
            return false;
        }
        self.push_history("Crop Layer");
        self.edit_layer(id, |layer| layer.set_crop(clamped)).is_some()
    }

    /// Swap a layer's pixels as one undo step (clears the crop)
    pub fn replace_layer_image(&mut self, id: LayerId, source: ImageSource) -> bool {
        if self.layer(id).is_none() {
            return false;
        }
        self.push_history("Replace Image");
        self.replace_layer_image_without_history(id, source)
    }

    /// Swap a layer's pixels without recording an undo step
    pub fn replace_layer_image_without_history(&mut self, id: LayerId, source: ImageSource) -> bool {
        self.edit_layer(id, |layer| layer.replace_source(source)).is_some()
    }

    /// Merge a partial transform; a continuous operation
    pub fn update_layer_transform(&mut self, id: LayerId, patch: TransformPatch) -> bool {
        self.edit_layer(id, |layer| layer.transform.apply(&patch)).is_some()
    }

    /// Append a chat message (older images are stripped)
    pub fn add_ai_message(&mut self, id: LayerId, message: AiMessage) -> bool {
        self.edit_layer(id, |layer| layer.push_ai_message(message)).is_some()
    }

    /// Record a pixel version for a layer
    pub fn push_layer_version(
        &mut self,
        id: LayerId,
        image_data_url: impl Into<String>,
        prompt: impl Into<String>,
    ) -> bool {
        let version = LayerVersion::new(image_data_url, prompt);
        self.edit_layer(id, |layer| layer.push_version(version)).is_some()
    }

    /// Restore a stored version as one undo step and make it current
    ///
    /// Returns `Ok(false)` when the layer or version does not exist.
    pub fn restore_version(&mut self, id: LayerId, index: usize) -> Result<bool> {
        let Some(version) = self.layer(id).and_then(|l| l.versions.get(index)) else {
            return Ok(false);
        };
        let source = match decode_data_url(&version.image_data_url) {
            Ok(source) => source,
            Err(err) => {
                self.report(&err);
                return Err(err);
            }
        };
        self.push_history("Restore Version");
        self.edit_layer(id, |layer| {
            layer.replace_source(source);
            layer.current_version_index = Some(index);
        });
        log::info!("Restored version {} of layer {}", index + 1, id);
        Ok(true)
    }

    /// Deep-copy a layer above the top of the stack and select the copy
    pub fn duplicate_layer(&mut self, id: LayerId) -> Option<LayerId> {
        let copy = self.layer(id)?.duplicate();
        let copy_id = copy.id;
        self.push_history("Duplicate Layer");
        self.state.scene.push_layer(copy);
        self.state.scene.set_selected(Some(copy_id));
        self.notify();
        Some(copy_id)
    }

    // === VIEW STATE (no history) ===

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if self.state.viewport != viewport {
            self.state.viewport = viewport;
            self.notify();
        }
    }

    /// Wheel zoom about a screen point
    pub fn wheel_zoom(&mut self, screen: Point, delta_y: f64) {
        let viewport = self.state.viewport.wheel_zoom(screen, delta_y);
        self.set_viewport(viewport);
    }

    pub fn zoom_in(&mut self) {
        let viewport = self.state.viewport.step_in(self.state.canvas_config.size());
        self.set_viewport(viewport);
    }

    pub fn zoom_out(&mut self) {
        let viewport = self.state.viewport.step_out(self.state.canvas_config.size());
        self.set_viewport(viewport);
    }

    pub fn zoom_reset(&mut self) {
        let viewport = self.state.viewport.reset_zoom(self.state.canvas_config.size());
        self.set_viewport(viewport);
    }

    /// Fit the canvas into a container of the given screen size
    pub fn fit_to_screen(&mut self, container: Size) {
        let viewport = Viewport::fit(self.state.canvas_config.size(), container);
        self.set_viewport(viewport);
    }

    pub fn set_active_tool(&mut self, tool: Tool) {
        if self.state.active_tool != tool {
            log::debug!("Tool: {}", tool.display_name());
            self.state.active_tool = tool;
            self.notify();
        }
    }

    pub fn set_canvas_config(&mut self, config: CanvasConfig) {
        if self.state.canvas_config != config {
            self.state.canvas_config = config;
            self.notify();
        }
    }

    pub fn set_selected_model(&mut self, model: GenerationModel) {
        self.state.selected_model = model;
        self.notify();
    }

    pub fn set_export_dialog_open(&mut self, open: bool) {
        self.state.dialogs.export_open = open;
        self.notify();
    }

    pub fn set_settings_open(&mut self, open: bool) {
        self.state.dialogs.settings_open = open;
        self.notify();
    }

    pub fn toggle_shortcut_help(&mut self) {
        self.state.dialogs.shortcuts_open = !self.state.dialogs.shortcuts_open;
        self.notify();
    }

    // === NOTICES ===

    /// Show a transient message
    pub fn set_notice(&mut self, message: impl Into<String>) {
        self.state.notice = Some(message.into());
        self.notify();
    }

    /// Log a failure and show its user-facing message
    pub fn report(&mut self, err: &EditorError) {
        log::warn!("{}", err);
        self.set_notice(err.to_string());
    }

    /// Drain the current notice
    pub fn take_notice(&mut self) -> Option<String> {
        let notice = self.state.notice.take();
        if notice.is_some() {
            self.notify();
        }
        notice
    }

    // === CREDENTIALS ===

    pub fn api_key(&self) -> Option<String> {
        self.credentials.get(API_KEY_NAME).filter(|key| !key.is_empty())
    }

    pub fn set_api_key(&mut self, key: &str) {
        self.credentials.set(API_KEY_NAME, key.trim());
    }

    // === COMMANDS ===

    /// Execute a keyboard/toolbar command
    ///
    /// `container` is the on-screen size of the canvas view, used by
    /// fit-to-screen. Returns false when the command had nothing to act on.
    pub fn apply_command(&mut self, command: EditorCommand, container: Size) -> bool {
        match command {
            EditorCommand::Undo => self.undo(),
            EditorCommand::Redo => self.redo(),
            EditorCommand::ToggleShortcutHelp => {
                self.toggle_shortcut_help();
                true
            }
            EditorCommand::SelectTool(tool) => {
                self.set_active_tool(tool);
                true
            }
            EditorCommand::DeleteSelected => match self.selected_layer_id() {
                Some(id) if self.remove_layer(id) => {
                    self.set_notice(LAYER_DELETED_NOTICE);
                    true
                }
                _ => false,
            },
            EditorCommand::DuplicateSelected => self
                .selected_layer_id()
                .and_then(|id| self.duplicate_layer(id))
                .is_some(),
            EditorCommand::OpenExport => {
                self.set_export_dialog_open(true);
                true
            }
            EditorCommand::FitToScreen => {
                self.fit_to_screen(container);
                true
            }
            EditorCommand::ZoomIn => {
                self.zoom_in();
                true
            }
            EditorCommand::ZoomOut => {
                self.zoom_out();
                true
            }
            EditorCommand::ZoomReset => {
                self.zoom_reset();
                true
            }
        }
    }

    // === EXPORT ===

    /// Flatten the scene into an encoded image, reporting failures
    pub fn export(&mut self, compositor: &mut Compositor, options: &ExportOptions) -> Result<Vec<u8>> {
        let result = export_image(
            compositor,
            self.state.scene.layers(),
            &self.state.canvas_config,
            options,
        );
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    // === AI FLOWS ===

    fn check_ai_preconditions(&self, prompt: &str) -> Result<String> {
        if prompt.is_empty() {
            return Err(EditorError::EmptyPrompt);
        }
        if self.state.ai_loading {
            return Err(EditorError::RequestInProgress);
        }
        self.api_key().ok_or(EditorError::MissingApiKey)
    }

    /// Start editing the selected layer with a prompt
    ///
    /// Captures the layer's current pixels as the reference image and its
    /// conversation as text-only history, then appends the user message.
    /// Nothing is snapshotted until the result arrives.
    pub fn begin_ai_edit(&mut self, prompt: &str) -> Result<PendingEdit> {
        let prompt = normalize_prompt(prompt);
        let api_key = self.check_ai_preconditions(&prompt)?;
        let layer = self.selected_layer().ok_or(EditorError::NoLayerSelected)?;
        let layer_id = layer.id;

        let reference = encode_data_url(&layer.source, MAX_DATA_URL_DIMENSION)?;
        let request = GenerateRequest::new(
            self.state.selected_model,
            prompt.clone(),
            &layer.ai_history,
            Some(reference),
        );

        let ticket = self.ai_requests.begin();
        self.state.ai_loading = true;
        self.add_ai_message(layer_id, AiMessage::user(prompt));
        log::debug!("AI edit {:?} started for layer {}", ticket, layer_id);

        Ok(PendingEdit {
            ticket,
            layer_id,
            api_key,
            request,
        })
    }

    /// Apply (or discard) the result of an edit request
    pub fn finish_ai_edit(
        &mut self,
        pending: PendingEdit,
        result: std::result::Result<GenerateResult, GenerationError>,
    ) -> AiOutcome {
        if !self.ai_requests.is_current(pending.ticket) {
            log::warn!("Discarding stale AI edit {:?}", pending.ticket);
            return AiOutcome::Stale;
        }
        self.state.ai_loading = false;

        let layer_id = pending.layer_id;
        if self.layer(layer_id).is_none() {
            log::warn!("AI edit target {} no longer exists", layer_id);
            self.notify();
            return AiOutcome::LayerGone;
        }

        let answer = match result {
            Ok(answer) => answer,
            Err(err) => {
                self.fail_ai_edit(layer_id, &EditorError::Generation(err));
                return AiOutcome::Failed;
            }
        };

        let Some(image_url) = answer.image_data_url.clone() else {
            // Text-only answer: the conversation grows, pixels stay
            self.add_ai_message(layer_id, AiMessage::model(answer.text, None));
            return AiOutcome::Applied;
        };

        let source = match decode_data_url(&image_url) {
            Ok(source) => source,
            Err(err) => {
                self.fail_ai_edit(layer_id, &err);
                return AiOutcome::Failed;
            }
        };

        let prompt = pending.request.prompt.clone();
        self.push_history("AI Edit");
        self.push_layer_version(layer_id, pending.reference_image(), prompt);
        self.add_ai_message(layer_id, AiMessage::model(answer.text, Some(image_url)));
        self.replace_layer_image_without_history(layer_id, source);
        log::info!("AI edit applied to layer {}", layer_id);
        AiOutcome::Applied
    }

    fn fail_ai_edit(&mut self, layer_id: LayerId, err: &EditorError) {
        log::warn!("AI edit failed: {}", err);
        self.add_ai_message(layer_id, AiMessage::model(format!("Error: {}", err), None));
    }

    /// Start generating a new layer from a prompt
    pub fn begin_generation(&mut self, prompt: &str) -> Result<PendingGeneration> {
        let prompt = normalize_prompt(prompt);
        let api_key = self.check_ai_preconditions(&prompt)?;
        let request = GenerateRequest::new(self.state.selected_model, prompt, &[], None);
        let ticket = self.ai_requests.begin();
        self.state.ai_loading = true;
        self.notify();
        log::debug!("Generation {:?} started", ticket);
        Ok(PendingGeneration {
            ticket,
            api_key,
            request,
        })
    }

    /// Apply (or discard) the result of a generation request
    ///
    /// On success a new layer fit to the canvas is added with the prompt and
    /// answer as its conversation and the generated image as version 1.
    pub fn finish_generation(
        &mut self,
        pending: PendingGeneration,
        result: std::result::Result<GenerateResult, GenerationError>,
    ) -> AiOutcome {
        if !self.ai_requests.is_current(pending.ticket) {
            log::warn!("Discarding stale generation {:?}", pending.ticket);
            return AiOutcome::Stale;
        }
        self.state.ai_loading = false;

        let answer = match result {
            Ok(answer) => answer,
            Err(err) => {
                self.report(&EditorError::Generation(err));
                return AiOutcome::Failed;
            }
        };

        let Some(image_url) = answer.image_data_url else {
            let message = if answer.text.is_empty() {
                NO_IMAGE_MESSAGE.to_string()
            } else {
                answer.text
            };
            self.report(&EditorError::NoImageGenerated(message));
            return AiOutcome::Failed;
        };

        let source = match decode_data_url(&image_url) {
            Ok(source) => source,
            Err(err) => {
                self.report(&err);
                return AiOutcome::Failed;
            }
        };

        let prompt = pending.request.prompt;
        let mut layer = Layer::from_image(
            source,
            generated_layer_name(&prompt),
            &self.state.canvas_config,
        );
        layer.ai_history = vec![
            AiMessage::user(prompt.clone()),
            AiMessage::model(answer.text, Some(image_url.clone())),
        ];
        layer.versions = vec![LayerVersion::new(image_url, prompt)];
        layer.current_version_index = Some(0);
        self.add_layer(layer);
        AiOutcome::Applied
    }

    /// Start removing the background of a layer
    pub fn begin_background_removal(&mut self, layer_id: LayerId) -> Result<PendingBackgroundRemoval> {
        if self.state.background_removal_progress.is_some() {
            return Err(EditorError::RequestInProgress);
        }
        let source = self.layer(layer_id).ok_or(EditorError::LayerGone)?.source.clone();
        let ticket = self.background_requests.begin();
        self.state.background_removal_progress = Some(0.0);
        self.notify();
        log::debug!("Background removal {:?} started for layer {}", ticket, layer_id);
        Ok(PendingBackgroundRemoval {
            ticket,
            layer_id,
            source,
        })
    }

    /// Record progress of a background removal; stale tickets are ignored
    pub fn report_background_progress(&mut self, ticket: RequestTicket, stage: &str, current: u64, total: u64) {
        if !self.background_requests.is_current(ticket) {
            return;
        }
        let fraction = if total > 0 {
            (current as f64 / total as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        log::debug!("Background removal {}: {}/{}", stage, current, total);
        self.state.background_removal_progress = Some(fraction);
        self.notify();
    }

    /// Apply (or discard) the blob returned by background removal
    ///
    /// The blob is converted to a data URL and decoded before anything is
    /// committed, so the stored version never refers to a transient resource.
    pub fn finish_background_removal(
        &mut self,
        pending: PendingBackgroundRemoval,
        result: std::result::Result<Vec<u8>, String>,
    ) -> AiOutcome {
        if !self.background_requests.is_current(pending.ticket) {
            log::warn!("Discarding stale background removal {:?}", pending.ticket);
            return AiOutcome::Stale;
        }
        self.state.background_removal_progress = None;

        let blob = match result {
            Ok(blob) => blob,
            Err(message) => {
                self.report(&EditorError::BackgroundRemoval(message));
                return AiOutcome::Failed;
            }
        };
        let data_url = bytes_to_data_url(&blob);
        let source = match decode_data_url(&data_url) {
            Ok(source) => source,
            Err(err) => {
                self.report(&EditorError::BackgroundRemoval(err.to_string()));
                return AiOutcome::Failed;
            }
        };

        let layer_id = pending.layer_id;
        if self.layer(layer_id).is_none() {
            log::warn!("Background removal target {} no longer exists", layer_id);
            self.notify();
            return AiOutcome::LayerGone;
        }
        self.push_history("Remove Background");
        self.replace_layer_image_without_history(layer_id, source);
        self.push_layer_version(layer_id, data_url, BACKGROUND_REMOVED_PROMPT);
        log::info!("Background removed from layer {}", layer_id);
        AiOutcome::Applied
    }

    /// Abandon in-flight requests: their results will be discarded
    pub fn cancel_ai_request(&mut self) {
        self.ai_requests.cancel();
        self.background_requests.cancel();
        self.state.ai_loading = false;
        self.state.background_removal_progress = None;
        log::debug!("Cancelled in-flight AI requests");
        self.notify();
    }

    /// Run an edit request to completion with a blocking generator
    pub fn run_ai_edit(&mut self, generator: &dyn ImageGenerator, prompt: &str) -> Result<AiOutcome> {
        let pending = self.begin_ai_edit(prompt)?;
        let result = generator.generate(&pending.api_key, &pending.request);
        Ok(self.finish_ai_edit(pending, result))
    }

    /// Run a generation request to completion with a blocking generator
    pub fn run_generation(&mut self, generator: &dyn ImageGenerator, prompt: &str) -> Result<AiOutcome> {
        let pending = self.begin_generation(prompt)?;
        let result = generator.generate(&pending.api_key, &pending.request);
        Ok(self.finish_generation(pending, result))
    }

    /// Run background removal to completion with a blocking remover
    pub fn run_background_removal(
        &mut self,
        remover: &dyn BackgroundRemover,
        layer_id: LayerId,
    ) -> Result<AiOutcome> {
        let pending = self.begin_background_removal(layer_id)?;
        let ticket = pending.ticket;
        let result = {
            let mut progress = |stage: &str, current: u64, total: u64| {
                self.report_background_progress(ticket, stage, current, total);
            };
            remover.remove_background(pending.source.pixels(), &mut progress)
        };
        Ok(self.finish_background_removal(pending, result))
    }
}
