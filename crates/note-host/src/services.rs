//! Collaborators the host talks to but does not own.
//!
//! Every async call runs outside the host: the host hands out a ticket, the
//! caller awaits the collaborator, and only the result re-enters the host.

use std::sync::Arc;

use async_trait::async_trait;
use planner_note_core::StructuredNotesResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Structuring failed: {0}")]
    Structuring(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A file dropped or pasted into the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// The upload endpoint's reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResponse {
    pub fn ok(url: impl Into<String>) -> Self {
        Self {
            success: true,
            url: Some(url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            url: None,
            error: Some(error.into()),
        }
    }

    /// The uploaded image's `src`. A success without a url counts as a failure.
    pub fn into_result(self) -> Result<String, ServiceError> {
        match (self.success, self.url) {
            (true, Some(url)) if !url.is_empty() => Ok(url),
            _ => Err(ServiceError::Upload(
                self.error.unwrap_or_else(|| "no url returned".to_string()),
            )),
        }
    }
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload_image(&self, file: ImageFile) -> UploadResponse;
}

/// Turns a free-form transcript into structured blocks.
#[async_trait]
pub trait NoteStructurer: Send + Sync {
    async fn structure_notes(&self, transcript: &str)
    -> Result<StructuredNotesResponse, ServiceError>;
}

/// Persistence for one serialized note per day.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Stores the serialized state under `date_key`, replacing what was there.
    async fn save_note(&self, date_key: &str, serialized: &str) -> anyhow::Result<()>;

    /// The raw stored value, in whatever shape it was written. `None` when the
    /// day has no note yet.
    async fn load_note(&self, date_key: &str) -> anyhow::Result<Option<Value>>;
}

/// Transient user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);
}

#[derive(Clone)]
pub struct Services {
    pub uploader: Arc<dyn ImageUploader>,
    pub structurer: Arc<dyn NoteStructurer>,
    pub store: Arc<dyn NoteStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_response_decodes_optional_fields() {
        let response: UploadResponse =
            serde_json::from_str(r#"{ "success": true, "url": "https://cdn/x.png" }"#).unwrap();
        assert_eq!(response.into_result().unwrap(), "https://cdn/x.png");

        let response: UploadResponse =
            serde_json::from_str(r#"{ "success": false, "error": "too large" }"#).unwrap();
        assert_eq!(
            response.into_result().unwrap_err().to_string(),
            "Upload failed: too large"
        );
    }

    #[test]
    fn success_without_url_is_a_failure() {
        let response = UploadResponse {
            success: true,
            url: None,
            error: None,
        };
        assert!(matches!(
            response.into_result(),
            Err(ServiceError::Upload(message)) if message == "no url returned"
        ));
    }
}
