use planner_note_core::{Editor, ListType};
use serde::Deserialize;

/// Formatting toolbar chrome. Only its own visibility lives here; showing or
/// hiding it never touches the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toolbar {
    visible: bool,
    height: u32,
}

impl Toolbar {
    pub fn new(visible: bool, height: u32) -> Self {
        Self { visible, height }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Returns whether the visibility changed.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        let changed = self.visible != visible;
        self.visible = visible;
        changed
    }

    /// Space the editing area gives up to the toolbar.
    pub fn content_offset(&self) -> u32 {
        if self.visible { self.height } else { 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolbarAction {
    Bold,
    Italic,
    Underline,
    HorizontalRule,
    ToggleChecked,
    Undo,
    Redo,
}

impl ToolbarAction {
    pub fn command_id(self) -> &'static str {
        match self {
            ToolbarAction::Bold => "format.toggle_bold",
            ToolbarAction::Italic => "format.toggle_italic",
            ToolbarAction::Underline => "format.toggle_underline",
            ToolbarAction::HorizontalRule => "core.insert_horizontal_rule",
            ToolbarAction::ToggleChecked => "list.toggle_checked",
            ToolbarAction::Undo => "core.undo",
            ToolbarAction::Redo => "core.redo",
        }
    }
}

/// What the toolbar buttons should show for the current caret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolbarState {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub list_type: Option<ListType>,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Deserialize)]
struct ActiveFormat {
    bold: bool,
    italic: bool,
    underline: bool,
}

impl ToolbarState {
    pub fn read(editor: &Editor) -> Self {
        let format = editor
            .run_query::<ActiveFormat>("format.active", None)
            .unwrap_or_else(|err| {
                tracing::debug!(error = %err, "format query failed");
                ActiveFormat {
                    bold: false,
                    italic: false,
                    underline: false,
                }
            });
        let list_type = editor
            .run_query::<Option<ListType>>("list.active_type", None)
            .unwrap_or_default();

        Self {
            bold: format.bold,
            italic: format.italic,
            underline: format.underline,
            list_type,
            can_undo: editor.can_undo(),
            can_redo: editor.can_redo(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_toolbar_takes_no_space() {
        let mut toolbar = Toolbar::new(true, 44);
        assert_eq!(toolbar.content_offset(), 44);

        assert!(toolbar.set_visible(false));
        assert!(!toolbar.set_visible(false));
        assert_eq!(toolbar.content_offset(), 0);
    }

    #[test]
    fn fresh_editor_shows_nothing_active() {
        let editor = Editor::with_planner_plugins();
        assert_eq!(ToolbarState::read(&editor), ToolbarState::default());
    }
}
