#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use planner_note_core::StructuredNotesResponse;
use planner_note_host::{
    EditorHost, HostConfig, ImageFile, ImageUploader, ManualClock, NoteStore, NoteStructurer,
    Notifier, ServiceError, Services, UploadResponse,
};
use serde_json::Value;

#[derive(Default)]
pub struct MemoryStore {
    notes: Mutex<HashMap<String, Value>>,
    saves: Mutex<Vec<(String, String)>>,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
}

impl MemoryStore {
    pub fn with_note(self, date_key: &str, raw: Value) -> Self {
        self.notes.lock().unwrap().insert(date_key.to_string(), raw);
        self
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> Vec<(String, String)> {
        self.saves.lock().unwrap().clone()
    }

    pub fn stored(&self, date_key: &str) -> Option<Value> {
        self.notes.lock().unwrap().get(date_key).cloned()
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn save_note(&self, date_key: &str, serialized: &str) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.saves
            .lock()
            .unwrap()
            .push((date_key.to_string(), serialized.to_string()));
        self.notes
            .lock()
            .unwrap()
            .insert(date_key.to_string(), Value::String(serialized.to_string()));
        Ok(())
    }

    async fn load_note(&self, date_key: &str) -> anyhow::Result<Option<Value>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            anyhow::bail!("offline");
        }
        Ok(self.stored(date_key))
    }
}

pub struct FakeUploader {
    response: Mutex<UploadResponse>,
    uploads: Mutex<Vec<String>>,
}

impl FakeUploader {
    pub fn respond(&self, response: UploadResponse) {
        *self.response.lock().unwrap() = response;
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Default for FakeUploader {
    fn default() -> Self {
        Self {
            response: Mutex::new(UploadResponse::ok("https://cdn.example.com/uploaded.png")),
            uploads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ImageUploader for FakeUploader {
    async fn upload_image(&self, file: ImageFile) -> UploadResponse {
        self.uploads.lock().unwrap().push(file.name);
        self.response.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeStructurer {
    reply: Mutex<Option<Result<StructuredNotesResponse, String>>>,
    transcripts: Mutex<Vec<String>>,
}

impl FakeStructurer {
    pub fn reply(&self, reply: Result<StructuredNotesResponse, String>) {
        *self.reply.lock().unwrap() = Some(reply);
    }

    pub fn transcripts(&self) -> Vec<String> {
        self.transcripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl NoteStructurer for FakeStructurer {
    async fn structure_notes(
        &self,
        transcript: &str,
    ) -> Result<StructuredNotesResponse, ServiceError> {
        self.transcripts.lock().unwrap().push(transcript.to_string());
        match self.reply.lock().unwrap().clone() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ServiceError::Structuring(message)),
            None => Err(ServiceError::Unavailable("no reply configured".to_string())),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_error(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<MemoryStore>,
    pub uploader: Arc<FakeUploader>,
    pub structurer: Arc<FakeStructurer>,
    pub notifier: Arc<RecordingNotifier>,
    pub changes: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::default())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            clock: ManualClock::new(),
            store: Arc::new(store),
            uploader: Arc::new(FakeUploader::default()),
            structurer: Arc::new(FakeStructurer::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            changes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            uploader: self.uploader.clone(),
            structurer: self.structurer.clone(),
            store: self.store.clone(),
            notifier: self.notifier.clone(),
        }
    }

    /// A host over `raw` that records every `on_change` payload.
    pub fn host(&self, raw: Value) -> EditorHost {
        let mut host = EditorHost::new(
            "2024-03-04",
            &raw,
            HostConfig::default(),
            self.services(),
            Arc::new(self.clock.clone()),
        );
        self.record_changes(&mut host);
        host
    }

    pub fn record_changes(&self, host: &mut EditorHost) {
        let changes = Arc::clone(&self.changes);
        host.set_on_change(move |serialized| changes.lock().unwrap().push(serialized.to_string()));
    }

    pub fn changes(&self) -> Vec<String> {
        self.changes.lock().unwrap().clone()
    }
}

pub fn png(name: &str) -> ImageFile {
    ImageFile::new(name, "image/png", vec![0x89, 0x50, 0x4e, 0x47])
}
