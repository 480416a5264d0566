use std::sync::Arc;
use std::time::Instant;

use planner_note_core::{
    ApplyError, CommandError, Document, EditKey, Editor, ImageNode, ImageTarget, ImageView,
    PluginRegistry, Selection, SerializedState, StructuredNotesResponse, Transaction,
    insert_image, insert_structured, normalize,
};
use serde_json::Value;
use thiserror::Error;

use crate::config::HostConfig;
use crate::debounce::{Clock, Debouncer};
use crate::services::{
    ImageFile, ImageUploader, NoteStore, NoteStructurer, ServiceError, Services,
};
use crate::toolbar::{Toolbar, ToolbarAction, ToolbarState};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Editor host has been torn down")]
    TornDown,

    #[error("Failed to load note {date_key}")]
    Load {
        date_key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("Nothing to structure")]
    EmptyTranscript,

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

pub type ChangeListener = Box<dyn FnMut(&str) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveTiming {
    Debounced,
    Immediate,
}

/// Hosts the editor for one day's note.
///
/// All document changes funnel through the host so that each committed
/// mutation is serialized once, reported through `on_change` and queued for a
/// debounced save. Async work (uploads, structuring, loads, saves) is handed
/// out as tickets that the caller awaits without holding the host; each ticket
/// remembers the generation it was issued under, and results that come back
/// after a note switch or teardown are dropped.
pub struct EditorHost {
    date_key: String,
    editor: Editor,
    config: HostConfig,
    services: Services,
    clock: Arc<dyn Clock>,
    debouncer: Debouncer<String>,
    on_change: Option<ChangeListener>,
    toolbar: Toolbar,
    active_image: Option<ImageView>,
    generation: u64,
    switch_seq: u64,
    last_revision: u64,
    torn_down: bool,
}

impl EditorHost {
    /// A host over `raw`, whatever shape it was stored in.
    pub fn new(
        date_key: impl Into<String>,
        raw: &Value,
        config: HostConfig,
        services: Services,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut editor = Editor::with_config(
            Document::empty(),
            None,
            PluginRegistry::planner(),
            config.editor_config(),
        );
        normalize(raw).load_into(&mut editor);

        let date_key = date_key.into();
        tracing::info!(date_key = %date_key, "note opened");

        Self {
            date_key,
            last_revision: editor.revision(),
            editor,
            debouncer: Debouncer::new(config.save_debounce()),
            toolbar: Toolbar::new(config.toolbar_visible, config.toolbar_height),
            config,
            services,
            clock,
            on_change: None,
            active_image: None,
            generation: 0,
            switch_seq: 0,
            torn_down: false,
        }
    }

    /// Loads the day's note from the store and builds a host over it.
    pub async fn open(
        date_key: impl Into<String>,
        config: HostConfig,
        services: Services,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HostError> {
        let date_key = date_key.into();
        let raw = services
            .store
            .load_note(&date_key)
            .await
            .map_err(|source| HostError::Load {
                date_key: date_key.clone(),
                source,
            })?
            .unwrap_or(Value::Null);
        Ok(Self::new(date_key, &raw, config, services, clock))
    }

    pub fn date_key(&self) -> &str {
        &self.date_key
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn serialized(&self) -> SerializedState {
        SerializedState::from_document(self.editor.doc(), self.editor.registry())
    }

    pub fn set_on_change(&mut self, listener: impl FnMut(&str) + Send + 'static) {
        if self.torn_down {
            return;
        }
        self.on_change = Some(Box::new(listener));
    }

    /// Replaces the document with a freshly normalized one for `date_key`.
    ///
    /// The old note's unsaved state is returned as a save ticket; the new
    /// note starts with an empty history and no pending save.
    pub fn load(
        &mut self,
        date_key: impl Into<String>,
        raw: &Value,
    ) -> Result<Option<SaveTicket>, HostError> {
        self.ensure_live()?;
        let flushed = self.flush_save();

        self.generation += 1;
        self.date_key = date_key.into();
        self.active_image = None;
        self.debouncer = Debouncer::new(self.config.save_debounce());
        normalize(raw).load_into(&mut self.editor);
        self.last_revision = self.editor.revision();

        tracing::info!(date_key = %self.date_key, generation = self.generation, "note loaded");
        Ok(flushed)
    }

    /// Starts fetching another day's note. Only the most recent switch is
    /// honoured when results arrive.
    pub fn begin_switch(&mut self, date_key: impl Into<String>) -> Result<LoadTicket, HostError> {
        self.ensure_live()?;
        self.switch_seq += 1;
        Ok(LoadTicket {
            seq: self.switch_seq,
            date_key: date_key.into(),
            store: Arc::clone(&self.services.store),
        })
    }

    pub fn finish_switch(&mut self, result: LoadResult) -> Result<Option<SaveTicket>, HostError> {
        self.ensure_live()?;
        if result.seq != self.switch_seq {
            tracing::warn!(date_key = %result.date_key, "discarding superseded note load");
            return Ok(None);
        }
        match result.result {
            Ok(raw) => self.load(result.date_key, &raw.unwrap_or(Value::Null)),
            Err(source) => {
                tracing::warn!(date_key = %result.date_key, error = %source, "note load failed");
                self.services.notifier.notify_error("Couldn't load note");
                Err(HostError::Load {
                    date_key: result.date_key,
                    source,
                })
            }
        }
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.editor.set_selection(selection);
    }

    pub fn apply(&mut self, tx: Transaction) -> Result<(), HostError> {
        self.ensure_live()?;
        self.editor.apply(tx)?;
        self.commit(SaveTiming::Debounced);
        Ok(())
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), HostError> {
        self.ensure_live()?;
        let result = self.editor.run_command(id, args);
        self.commit(SaveTiming::Debounced);
        result.map_err(HostError::from)
    }

    pub fn insert_text(&mut self, text: &str) -> Result<(), HostError> {
        self.run_command("core.insert_text", Some(serde_json::json!({ "text": text })))
    }

    pub fn undo(&mut self) -> Result<(), HostError> {
        self.run_command("core.undo", None)
    }

    pub fn redo(&mut self) -> Result<(), HostError> {
        self.run_command("core.redo", None)
    }

    pub fn toolbar(&self) -> &Toolbar {
        &self.toolbar
    }

    /// Follows the external toolbar preference. The document is untouched.
    pub fn set_toolbar_visible(&mut self, visible: bool) -> bool {
        self.toolbar.set_visible(visible)
    }

    pub fn toolbar_state(&self) -> ToolbarState {
        ToolbarState::read(&self.editor)
    }

    pub fn toolbar_action(&mut self, action: ToolbarAction) -> Result<(), HostError> {
        self.run_command(action.command_id(), None)
    }

    pub fn active_image(&self) -> Option<&ImageView> {
        self.active_image.as_ref()
    }

    /// A click on an image selects it (and deselects any other).
    pub fn click_image(&mut self, target: ImageTarget) {
        if self.active_image.as_ref().is_some_and(ImageView::is_resizing) {
            return;
        }
        let mut view = match self.active_image.take() {
            Some(view) if view.target() == &target => view,
            _ => ImageView::new(target),
        };
        view.click(true);
        self.active_image = Some(view);
    }

    pub fn click_outside_image(&mut self) {
        if let Some(view) = self.active_image.as_mut() {
            view.click(false);
            if !view.is_selected() {
                self.active_image = None;
            }
        }
    }

    /// Backspace/Delete while an image is selected. Returns whether the key
    /// was consumed.
    pub fn image_key_down(&mut self, key: EditKey) -> Result<bool, HostError> {
        self.ensure_live()?;
        let Some(view) = self.active_image.as_mut() else {
            return Ok(false);
        };
        let consumed = view.key_down(key, &mut self.editor)?;
        if consumed {
            self.active_image = None;
            self.commit(SaveTiming::Debounced);
        }
        Ok(consumed)
    }

    pub fn image_pointer_down(&mut self, pointer_x: f64) -> bool {
        if self.torn_down {
            return false;
        }
        self.active_image
            .as_mut()
            .is_some_and(|view| view.pointer_down_on_handle(pointer_x, &self.editor))
    }

    /// Moves only the draft width; nothing is committed until release.
    pub fn image_pointer_move(&mut self, pointer_x: f64, container_width: Option<f64>) -> Option<f64> {
        self.active_image
            .as_mut()?
            .pointer_move(pointer_x, container_width)
    }

    pub fn image_pointer_up(&mut self) -> Result<Option<u32>, HostError> {
        self.ensure_live()?;
        let Some(view) = self.active_image.as_mut() else {
            return Ok(None);
        };
        let width = view.pointer_up(&mut self.editor)?;
        self.commit(SaveTiming::Debounced);
        Ok(width)
    }

    /// Window focus lost: an active resize is abandoned.
    pub fn window_blur(&mut self) {
        if let Some(view) = self.active_image.as_mut() {
            view.cancel();
        }
    }

    pub fn begin_image_ingest(&self, file: ImageFile) -> Result<ImageIngest, HostError> {
        self.ensure_live()?;
        if !file.is_image() {
            tracing::warn!(name = %file.name, content_type = %file.content_type, "refusing non-image file");
            self.services
                .notifier
                .notify_error(&format!("Can't insert {}: not an image", file.name));
            return Err(HostError::UnsupportedFile(file.content_type));
        }
        Ok(ImageIngest {
            generation: self.generation,
            file,
            uploader: Arc::clone(&self.services.uploader),
        })
    }

    /// Inserts the uploaded image at the caret (or at the end). Returns
    /// whether the document changed.
    pub fn finish_image_ingest(&mut self, result: ImageIngestResult) -> Result<bool, HostError> {
        if self.is_stale(result.generation) {
            tracing::warn!("discarding upload result for a closed note");
            return Ok(false);
        }
        let src = match result.result {
            Ok(src) => src,
            Err(err) => {
                tracing::warn!(error = %err, "image upload failed");
                self.services.notifier.notify_error(&err.to_string());
                return Ok(false);
            }
        };

        let image = ImageNode::new(src).width(self.config.image_default_width);
        let tx = insert_image(&self.editor, image);
        self.editor.apply(tx)?;
        self.commit(SaveTiming::Debounced);
        Ok(true)
    }

    pub fn begin_structuring(
        &self,
        transcript: impl Into<String>,
    ) -> Result<StructuringTicket, HostError> {
        self.ensure_live()?;
        let transcript = transcript.into();
        if transcript.trim().is_empty() {
            return Err(HostError::EmptyTranscript);
        }
        Ok(StructuringTicket {
            generation: self.generation,
            transcript,
            structurer: Arc::clone(&self.services.structurer),
        })
    }

    /// Inserts the structured blocks as one undoable step and saves right
    /// away. Returns whether the document changed.
    pub fn finish_structuring(&mut self, result: StructuringResult) -> Result<bool, HostError> {
        if self.is_stale(result.generation) {
            tracing::warn!("discarding structuring result for a closed note");
            return Ok(false);
        }
        let response = match result.result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "note structuring failed");
                self.services.notifier.notify_error(&err.to_string());
                return Ok(false);
            }
        };

        let inserted = insert_structured(&mut self.editor, &response)?;
        if inserted {
            self.commit(SaveTiming::Immediate);
        }
        Ok(inserted)
    }

    /// The next save, once the debounce window has passed and no earlier
    /// save is still in flight.
    pub fn take_due_save(&mut self) -> Option<SaveTicket> {
        if self.torn_down {
            return None;
        }
        let serialized = self.debouncer.due(self.clock.now())?;
        Some(self.save_ticket(serialized))
    }

    /// When the pending save becomes due, if there is one waiting.
    pub fn next_save_deadline(&self) -> Option<Instant> {
        if self.torn_down || self.debouncer.is_in_flight() {
            return None;
        }
        self.debouncer.deadline()
    }

    pub fn has_pending_save(&self) -> bool {
        self.debouncer.has_pending()
    }

    /// Returns whether the save succeeded. A failed save of the current note
    /// is queued again unless a newer state is already waiting.
    pub fn finish_save(&mut self, result: SaveResult) -> bool {
        let current = !self.is_stale(result.generation);
        match result.result {
            Ok(()) => {
                tracing::debug!(date_key = %result.date_key, "note saved");
                if current {
                    self.debouncer.complete();
                }
                true
            }
            Err(err) => {
                tracing::warn!(date_key = %result.date_key, error = %err, "note save failed");
                if self.torn_down {
                    return false;
                }
                self.services.notifier.notify_error("Couldn't save note");
                if current {
                    self.debouncer.retry(result.serialized, self.clock.now());
                }
                false
            }
        }
    }

    /// Detaches the host. Any gesture is dropped, `on_change` stops firing
    /// and late ticket results are ignored. Unsaved state is handed back as a
    /// final save ticket.
    pub fn teardown(&mut self) -> Option<SaveTicket> {
        if self.torn_down {
            return None;
        }
        let flushed = self.flush_save();
        self.torn_down = true;
        self.generation += 1;
        self.on_change = None;
        self.active_image = None;
        self.debouncer.cancel();
        tracing::info!(date_key = %self.date_key, "editor host torn down");
        flushed
    }

    fn flush_save(&mut self) -> Option<SaveTicket> {
        let serialized = self.debouncer.take()?;
        Some(self.save_ticket(serialized))
    }

    fn save_ticket(&self, serialized: String) -> SaveTicket {
        SaveTicket {
            generation: self.generation,
            date_key: self.date_key.clone(),
            serialized,
            store: Arc::clone(&self.services.store),
        }
    }

    fn commit(&mut self, timing: SaveTiming) {
        if self.torn_down {
            return;
        }
        let revision = self.editor.revision();
        if revision == self.last_revision {
            return;
        }
        self.last_revision = revision;

        let serialized = self.serialized().to_json_string();
        if let Some(on_change) = self.on_change.as_mut() {
            on_change(&serialized);
        }

        let now = self.clock.now();
        match timing {
            SaveTiming::Debounced => self.debouncer.push(serialized, now),
            SaveTiming::Immediate => self.debouncer.push_immediate(serialized, now),
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.torn_down || generation != self.generation
    }

    fn ensure_live(&self) -> Result<(), HostError> {
        if self.torn_down {
            Err(HostError::TornDown)
        } else {
            Ok(())
        }
    }
}

/// An upload waiting to run.
pub struct ImageIngest {
    generation: u64,
    file: ImageFile,
    uploader: Arc<dyn ImageUploader>,
}

impl ImageIngest {
    pub async fn run(self) -> ImageIngestResult {
        let response = self.uploader.upload_image(self.file).await;
        ImageIngestResult {
            generation: self.generation,
            result: response.into_result(),
        }
    }
}

#[derive(Debug)]
pub struct ImageIngestResult {
    generation: u64,
    result: Result<String, ServiceError>,
}

pub struct StructuringTicket {
    generation: u64,
    transcript: String,
    structurer: Arc<dyn NoteStructurer>,
}

impl StructuringTicket {
    pub async fn run(self) -> StructuringResult {
        let result = self.structurer.structure_notes(&self.transcript).await;
        StructuringResult {
            generation: self.generation,
            result,
        }
    }
}

#[derive(Debug)]
pub struct StructuringResult {
    generation: u64,
    result: Result<StructuredNotesResponse, ServiceError>,
}

pub struct LoadTicket {
    seq: u64,
    date_key: String,
    store: Arc<dyn NoteStore>,
}

impl LoadTicket {
    pub fn date_key(&self) -> &str {
        &self.date_key
    }

    pub async fn run(self) -> LoadResult {
        let result = self.store.load_note(&self.date_key).await;
        LoadResult {
            seq: self.seq,
            date_key: self.date_key,
            result,
        }
    }
}

#[derive(Debug)]
pub struct LoadResult {
    seq: u64,
    date_key: String,
    result: anyhow::Result<Option<Value>>,
}

/// One serialized state on its way to the store.
pub struct SaveTicket {
    generation: u64,
    date_key: String,
    serialized: String,
    store: Arc<dyn NoteStore>,
}

impl SaveTicket {
    pub fn date_key(&self) -> &str {
        &self.date_key
    }

    pub fn serialized(&self) -> &str {
        &self.serialized
    }

    pub async fn persist(self) -> SaveResult {
        let result = self.store.save_note(&self.date_key, &self.serialized).await;
        SaveResult {
            generation: self.generation,
            date_key: self.date_key,
            serialized: self.serialized,
            result,
        }
    }
}

#[derive(Debug)]
pub struct SaveResult {
    generation: u64,
    date_key: String,
    serialized: String,
    result: anyhow::Result<()>,
}

impl SaveResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
