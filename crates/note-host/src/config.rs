use std::time::Duration;

use planner_note_core::{DEFAULT_IMAGE_WIDTH, EditorConfig};
use serde::{Deserialize, Serialize};

/// Host settings. Every field is optional in JSON; missing ones take the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Quiet period after the last edit before the note is saved.
    pub save_debounce_ms: u64,
    pub toolbar_visible: bool,
    /// Vertical space the toolbar takes from the editing area, in pixels.
    pub toolbar_height: u32,
    /// Width given to freshly uploaded images.
    pub image_default_width: u32,
    pub max_undo: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            save_debounce_ms: 800,
            toolbar_visible: true,
            toolbar_height: 44,
            image_default_width: DEFAULT_IMAGE_WIDTH,
            max_undo: 200,
        }
    }
}

impl HostConfig {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn editor_config(&self) -> EditorConfig {
        EditorConfig {
            max_undo: self.max_undo,
            ..EditorConfig::default()
        }
    }
}
