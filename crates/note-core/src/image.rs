//! The resizable image node: its serialized form, the commands that create and
//! change it, and the per-instance interaction state the host drives.

use serde_json::{Map, Value, json};

use crate::core::{ApplyError, Document, Editor, Node, Point, Selection, VoidNode, node_ref};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{
    ChildConstraint, CommandError, CommandSpec, NodeRole, NodeSpec, NotePlugin, PluginRegistry,
    block_insert_index, start_of_node,
};
use crate::state::NODE_VERSION;

/// No committed width is ever narrower than this.
pub const MIN_IMAGE_WIDTH: u32 = 120;
pub const DEFAULT_IMAGE_WIDTH: u32 = 480;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageNode {
    pub src: String,
    pub alt_text: String,
    pub width: u32,
}

impl ImageNode {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            alt_text: String::new(),
            width: DEFAULT_IMAGE_WIDTH,
        }
    }

    pub fn alt_text(mut self, alt_text: impl Into<String>) -> Self {
        self.alt_text = alt_text.into();
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = width.max(MIN_IMAGE_WIDTH);
        self
    }
}

/// Width to store for a (possibly fractional or out-of-range) draft value.
pub fn commit_width(draft: f64) -> u32 {
    if draft.is_nan() {
        return MIN_IMAGE_WIDTH;
    }
    // Float to int casts saturate, so huge drafts land on u32::MAX.
    (draft.floor() as u32).max(MIN_IMAGE_WIDTH)
}

/// Serialized `width` to stored width. Anything that is not a number falls
/// back to the default.
pub fn import_width(value: Option<&Value>) -> u32 {
    match value.and_then(Value::as_f64) {
        Some(width) if width.is_finite() => commit_width(width),
        _ => DEFAULT_IMAGE_WIDTH,
    }
}

fn import_image(map: &Map<String, Value>, _registry: &PluginRegistry) -> Option<Node> {
    let Some(src) = map.get("src").and_then(Value::as_str) else {
        tracing::debug!("dropping image without src");
        return None;
    };
    Some(Node::image(ImageNode {
        src: src.to_string(),
        alt_text: map
            .get("altText")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        width: import_width(map.get("width")),
    }))
}

fn export_image(node: &Node, _registry: &PluginRegistry) -> Option<Value> {
    let Node::Void(VoidNode::Image(image)) = node else {
        return None;
    };
    Some(json!({
        "altText": image.alt_text,
        "src": image.src,
        "type": "image",
        "version": NODE_VERSION,
        "width": image.width.max(MIN_IMAGE_WIDTH),
    }))
}

pub struct ImagePlugin;

impl NotePlugin for ImagePlugin {
    fn id(&self) -> &'static str {
        "image"
    }

    fn node_specs(&self) -> Vec<NodeSpec> {
        vec![NodeSpec {
            type_name: "image",
            version: NODE_VERSION,
            role: NodeRole::Block,
            is_void: true,
            children: ChildConstraint::None,
            import: import_image,
            export: export_image,
        }]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("image.insert", "Insert image", |editor, args| {
                let args = args.unwrap_or(Value::Null);
                let src = args
                    .get("src")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| CommandError::new("Missing args.src"))?;
                let mut image = ImageNode::new(src);
                if let Some(alt) = args.get("altText").and_then(Value::as_str) {
                    image = image.alt_text(alt);
                }
                if args.get("width").is_some() {
                    image.width = import_width(args.get("width"));
                }
                let tx = insert_image(editor, image);
                editor
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to insert image: {e}")))
            })
            .description("Insert an image block after the caret's block, or at the end.")
            .keywords(["image", "img", "picture", "upload"])
            .args_example(json!({ "src": "https://example.com/a.png", "altText": "Whiteboard" })),
            CommandSpec::new("image.remove", "Remove image", |editor, args| {
                let path = path_arg(args.as_ref())?;
                if !matches!(node_ref(editor.doc(), &path), Some(Node::Void(VoidNode::Image(_)))) {
                    return Err(CommandError::new("Path does not point at an image"));
                }
                editor
                    .apply(remove_image(&path))
                    .map_err(|e| CommandError::new(format!("Failed to remove image: {e}")))
            })
            .keywords(["image", "delete", "remove"])
            .args_example(json!({ "path": [1] })),
            CommandSpec::new("image.set_width", "Set image width", |editor, args| {
                let path = path_arg(args.as_ref())?;
                let width = args
                    .as_ref()
                    .and_then(|v| v.get("width"))
                    .and_then(Value::as_f64)
                    .ok_or_else(|| CommandError::new("Missing args.width"))?;
                let Some(Node::Void(VoidNode::Image(image))) = node_ref(editor.doc(), &path)
                else {
                    return Err(CommandError::new("Path does not point at an image"));
                };
                let tx = set_width(path, image, commit_width(width));
                editor
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to resize image: {e}")))
            })
            .keywords(["image", "resize", "width"])
            .args_example(json!({ "path": [1], "width": 320 })),
        ]
    }
}

fn path_arg(args: Option<&Value>) -> Result<Path, CommandError> {
    args.and_then(|v| v.get("path"))
        .and_then(Value::as_array)
        .and_then(|path| {
            path.iter()
                .map(|ix| ix.as_u64().and_then(|ix| usize::try_from(ix).ok()))
                .collect::<Option<Path>>()
        })
        .filter(|path| !path.is_empty())
        .ok_or_else(|| CommandError::new("Missing args.path"))
}

/// Inserts `image` after the caret's top-level block (or at the end). A
/// trailing empty paragraph is added only when nothing follows, so the caret
/// always has somewhere to land.
pub fn insert_image(editor: &Editor, image: ImageNode) -> Transaction {
    let insert_at = block_insert_index(editor);
    let mut ops = vec![Op::InsertNode {
        path: vec![insert_at],
        node: Node::image(image),
    }];

    let next = editor
        .doc()
        .children
        .get(insert_at)
        .and_then(|node| start_of_node(node, &[insert_at + 1]));
    let caret = match next {
        Some(point) => point,
        None => {
            ops.push(Op::InsertNode {
                path: vec![insert_at + 1],
                node: Node::paragraph(""),
            });
            Point::new(vec![insert_at + 1, 0], 0)
        }
    };

    Transaction::new(ops)
        .selection_after(Selection::collapsed(caret))
        .source("command:image.insert")
}

fn remove_image(path: &[usize]) -> Transaction {
    let top = path.first().copied().unwrap_or(0);
    Transaction::new(vec![Op::RemoveNode {
        path: path.to_vec(),
    }])
    .selection_after(Selection::collapsed(Point::new(vec![top], 0)))
    .source("command:image.remove")
}

fn set_width(path: Path, image: &ImageNode, width: u32) -> Transaction {
    Transaction::new(vec![Op::SetVoid {
        path,
        node: VoidNode::Image(ImageNode {
            width,
            ..image.clone()
        }),
    }])
    .source("image.resize")
}

/// Identifies one image instance. The path can go stale while the user edits
/// around the image, so `src` is kept to find it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTarget {
    pub path: Path,
    pub src: String,
}

impl ImageTarget {
    pub fn new(path: Path, src: impl Into<String>) -> Self {
        Self {
            path,
            src: src.into(),
        }
    }

    /// Current path and node of the targeted image, if it still exists.
    pub fn resolve<'a>(&self, doc: &'a Document) -> Option<(Path, &'a ImageNode)> {
        if let Some(Node::Void(VoidNode::Image(image))) = node_ref(doc, &self.path) {
            if image.src == self.src {
                return Some((self.path.clone(), image));
            }
        }
        doc.images().into_iter().find(|(_, image)| image.src == self.src)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKey {
    Backspace,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResizeGesture {
    pub start_x: f64,
    pub start_width: u32,
    pub draft_width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageViewState {
    Unselected,
    Selected,
    Resizing(ResizeGesture),
}

/// Transient UI state for one image. Never serialized.
#[derive(Debug, Clone)]
pub struct ImageView {
    target: ImageTarget,
    state: ImageViewState,
}

impl ImageView {
    pub fn new(target: ImageTarget) -> Self {
        Self {
            target,
            state: ImageViewState::Unselected,
        }
    }

    pub fn target(&self) -> &ImageTarget {
        &self.target
    }

    pub fn state(&self) -> &ImageViewState {
        &self.state
    }

    pub fn is_selected(&self) -> bool {
        !matches!(self.state, ImageViewState::Unselected)
    }

    pub fn is_resizing(&self) -> bool {
        matches!(self.state, ImageViewState::Resizing(_))
    }

    /// A click inside selects; a click outside deselects. Clicks during a
    /// drag are ignored.
    pub fn click(&mut self, inside: bool) {
        self.state = match (&self.state, inside) {
            (ImageViewState::Resizing(_), _) => return,
            (_, true) => ImageViewState::Selected,
            (_, false) => ImageViewState::Unselected,
        };
    }

    /// Backspace/Delete on a selected image removes it. Returns whether the
    /// key was consumed.
    pub fn key_down(&mut self, _key: EditKey, editor: &mut Editor) -> Result<bool, ApplyError> {
        if self.state != ImageViewState::Selected {
            return Ok(false);
        }
        let Some((path, _)) = self.target.resolve(editor.doc()) else {
            tracing::warn!(src = %self.target.src, "selected image no longer in document");
            self.state = ImageViewState::Unselected;
            return Ok(false);
        };
        editor.apply(remove_image(&path))?;
        self.state = ImageViewState::Unselected;
        Ok(true)
    }

    pub fn pointer_down_on_handle(&mut self, pointer_x: f64, editor: &Editor) -> bool {
        if self.state != ImageViewState::Selected {
            return false;
        }
        let Some((path, image)) = self.target.resolve(editor.doc()) else {
            tracing::warn!(src = %self.target.src, "resize started on a missing image");
            return false;
        };
        self.target.path = path;
        self.state = ImageViewState::Resizing(ResizeGesture {
            start_x: pointer_x,
            start_width: image.width,
            draft_width: f64::from(image.width),
        });
        true
    }

    /// Updates the draft width only. Returns the new draft while resizing.
    pub fn pointer_move(&mut self, pointer_x: f64, container_width: Option<f64>) -> Option<f64> {
        let ImageViewState::Resizing(gesture) = &mut self.state else {
            return None;
        };
        let min = f64::from(MIN_IMAGE_WIDTH);
        let max = container_width
            .filter(|w| w.is_finite())
            .map_or(f64::INFINITY, |w| w.max(min));
        let candidate = f64::from(gesture.start_width) + (pointer_x - gesture.start_x);
        gesture.draft_width = candidate.clamp(min, max);
        Some(gesture.draft_width)
    }

    /// Ends the drag and writes the final width as a single transaction.
    /// Returns the committed width, or `None` when no drag was active or the
    /// image is gone.
    pub fn pointer_up(&mut self, editor: &mut Editor) -> Result<Option<u32>, ApplyError> {
        let ImageViewState::Resizing(gesture) =
            std::mem::replace(&mut self.state, ImageViewState::Selected)
        else {
            return Ok(None);
        };

        let width = commit_width(gesture.draft_width);
        let Some((path, image)) = self.target.resolve(editor.doc()) else {
            tracing::warn!(src = %self.target.src, "resize target not found, dropping width");
            return Ok(None);
        };
        if image.width != width {
            let tx = set_width(path.clone(), image, width);
            editor.apply(tx)?;
        }
        self.target.path = path;
        Ok(Some(width))
    }

    /// Abandons an active drag without touching the document.
    pub fn cancel(&mut self) {
        if self.is_resizing() {
            self.state = ImageViewState::Selected;
        }
    }

    /// Width to render: the draft during a drag, otherwise the stored width.
    pub fn display_width(&self, stored_width: u32) -> f64 {
        match &self.state {
            ImageViewState::Resizing(gesture) => gesture.draft_width,
            _ => f64::from(stored_width),
        }
    }
}
