//! Turns whatever was stored for a note into something the editor can load.

use serde_json::Value;

use crate::core::{Document, Editor, Node};
use crate::markdown::to_markdown;
use crate::ops::{Op, Transaction};
use crate::state::{SerializedState, is_canonical_shape};

/// What [`normalize`] hands back: either a ready serialized state or a list of
/// paragraphs to build the document from.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadableState {
    Serialized(SerializedState),
    Initializer(Initializer),
}

/// Paragraphs to write into a cleared root in one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initializer {
    paragraphs: Vec<String>,
}

impl Initializer {
    /// A single paragraph holding `text` verbatim.
    pub fn plain_text(text: impl Into<String>) -> Self {
        Self {
            paragraphs: vec![text.into()],
        }
    }

    /// One paragraph per non-empty line; at least one (empty) paragraph.
    pub fn markdown_lines(markdown: &str) -> Self {
        let paragraphs: Vec<String> = markdown
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if paragraphs.is_empty() {
            return Self::plain_text("");
        }
        Self { paragraphs }
    }

    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    pub fn to_document(&self) -> Document {
        Document {
            children: self.paragraphs.iter().map(Node::paragraph).collect(),
        }
    }

    /// Clears the root and appends the paragraphs as a single transaction.
    pub fn transaction(&self, doc: &Document) -> Transaction {
        let mut ops: Vec<Op> = (0..doc.children.len())
            .rev()
            .map(|ix| Op::RemoveNode { path: vec![ix] })
            .collect();
        ops.extend(
            self.paragraphs
                .iter()
                .enumerate()
                .map(|(ix, text)| Op::InsertNode {
                    path: vec![ix],
                    node: Node::paragraph(text),
                }),
        );
        Transaction::new(ops).source("load:initializer")
    }
}

impl LoadableState {
    /// Loads into `editor`, replacing whatever it held. The load itself is not
    /// undoable and leaves no selection.
    pub fn load_into(self, editor: &mut Editor) {
        match self {
            LoadableState::Serialized(state) => {
                let doc = state.to_document(editor.registry());
                editor.replace_document(doc);
            }
            LoadableState::Initializer(init) => {
                let tx = init.transaction(editor.doc());
                if let Err(err) = editor.apply(tx) {
                    tracing::warn!(error = %err, "initializer did not apply, loading directly");
                    editor.replace_document(init.to_document());
                }
                editor.set_selection(None);
                editor.clear_history();
            }
        }
    }
}

/// Classifies a stored note value. Never fails: every unreadable shape falls
/// through to a more conservative branch.
pub fn normalize(raw: &Value) -> LoadableState {
    if is_canonical_shape(raw) {
        tracing::debug!("loading canonical serialized state");
        return from_canonical(raw.clone());
    }

    if let Value::String(s) = raw {
        if let Ok(parsed) = serde_json::from_str::<Value>(s) {
            if is_canonical_shape(&parsed) {
                tracing::debug!("loading serialized state from string");
                return from_canonical(parsed);
            }
        }
        tracing::debug!(len = s.len(), "loading legacy plain text");
        return LoadableState::Initializer(Initializer::plain_text(s.as_str()));
    }

    tracing::debug!("projecting legacy content through markdown");
    LoadableState::Initializer(Initializer::markdown_lines(&to_markdown(raw)))
}

fn from_canonical(value: Value) -> LoadableState {
    match SerializedState::from_value(value) {
        Some(state) if state.root_child_count() > 0 => LoadableState::Serialized(state),
        _ => LoadableState::Serialized(SerializedState::empty()),
    }
}

/// Convenience for callers holding a raw JSON string (or nothing at all).
pub fn normalize_str(raw: Option<&str>) -> LoadableState {
    match raw {
        Some(s) => normalize(&Value::String(s.to_string())),
        None => normalize(&Value::Null),
    }
}
