use std::ops::BitOr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::image::ImageNode;
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{CommandError, PluginRegistry, QueryError, TransactionPreview};

/// The children of the (implicit) root node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Document {
    /// The canonical empty document: a root holding one empty paragraph.
    pub fn empty() -> Self {
        Self {
            children: vec![Node::paragraph("")],
        }
    }

    pub fn is_empty_state(&self) -> bool {
        match self.children.as_slice() {
            [Node::Element(el)] => {
                el.kind == ElementKind::Paragraph
                    && el.children.iter().all(|n| match n {
                        Node::Text(t) => t.text.is_empty(),
                        _ => false,
                    })
            }
            _ => false,
        }
    }

    pub fn plain_text(&self) -> String {
        self.children
            .iter()
            .map(Node::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn images(&self) -> Vec<(Path, &ImageNode)> {
        fn walk<'a>(nodes: &'a [Node], path: &mut Vec<usize>, out: &mut Vec<(Path, &'a ImageNode)>) {
            for (ix, node) in nodes.iter().enumerate() {
                path.push(ix);
                match node {
                    Node::Void(VoidNode::Image(image)) => out.push((path.clone(), image)),
                    Node::Element(el) => walk(&el.children, path, out),
                    _ => {}
                }
                path.pop();
            }
        }

        let mut out = Vec::new();
        walk(&self.children, &mut Vec::new(), &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
    Void(VoidNode),
}

impl Node {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::element(ElementKind::Paragraph, vec![Node::text(text, TextFormat::empty())])
    }

    pub fn element(kind: ElementKind, children: Vec<Node>) -> Self {
        Node::Element(ElementNode {
            kind,
            style: BlockStyle::default(),
            children,
        })
    }

    pub fn text(text: impl Into<String>, format: TextFormat) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            format,
            style: String::new(),
        })
    }

    pub fn horizontal_rule() -> Self {
        Node::Void(VoidNode::HorizontalRule)
    }

    pub fn line_break() -> Self {
        Node::Void(VoidNode::LineBreak)
    }

    pub fn image(image: ImageNode) -> Self {
        Node::Void(VoidNode::Image(image))
    }

    /// The `type` discriminator this node carries in serialized state.
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Element(el) => el.kind.type_name(),
            Node::Text(_) => "text",
            Node::Void(v) => v.type_name(),
        }
    }

    pub fn plain_text(&self) -> String {
        match self {
            Node::Text(t) => t.text.clone(),
            Node::Void(VoidNode::LineBreak) => "\n".to_string(),
            Node::Void(_) => String::new(),
            Node::Element(el) => {
                let separator = match el.kind {
                    ElementKind::List { .. } => "\n",
                    _ => "",
                };
                el.children
                    .iter()
                    .map(Node::plain_text)
                    .collect::<Vec<_>>()
                    .join(separator)
            }
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub kind: ElementKind,
    pub style: BlockStyle,
    pub children: Vec<Node>,
}

impl ElementNode {
    /// Whether this element holds inline runs directly (as opposed to nested blocks).
    pub fn is_text_block(&self) -> bool {
        match self.kind {
            ElementKind::Paragraph
            | ElementKind::Heading { .. }
            | ElementKind::Quote
            | ElementKind::Code { .. } => true,
            ElementKind::List { .. } => false,
            ElementKind::ListItem { .. } => {
                !self.children.iter().any(|n| matches!(n, Node::Element(_)))
            }
        }
    }
}

/// Block-level presentation attributes carried through serialization unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockStyle {
    pub direction: Option<String>,
    pub format: String,
    pub indent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Paragraph,
    Heading { level: u8 },
    Quote,
    Code { language: Option<String> },
    List { list_type: ListType, start: u64 },
    ListItem { checked: Option<bool>, value: u64 },
}

impl ElementKind {
    pub fn heading(level: u8) -> Self {
        ElementKind::Heading {
            level: level.clamp(1, MAX_HEADING_LEVEL),
        }
    }

    pub fn list(list_type: ListType) -> Self {
        ElementKind::List {
            list_type,
            start: 1,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::Paragraph => "paragraph",
            ElementKind::Heading { .. } => "heading",
            ElementKind::Quote => "quote",
            ElementKind::Code { .. } => "code",
            ElementKind::List { .. } => "list",
            ElementKind::ListItem { .. } => "listitem",
        }
    }
}

pub const MAX_HEADING_LEVEL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListType {
    Bullet,
    Number,
    Check,
}

impl ListType {
    pub fn as_str(self) -> &'static str {
        match self {
            ListType::Bullet => "bullet",
            ListType::Number => "number",
            ListType::Check => "check",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bullet" => Some(ListType::Bullet),
            "number" => Some(ListType::Number),
            "check" => Some(ListType::Check),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            ListType::Number => "ol",
            ListType::Bullet | ListType::Check => "ul",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub text: String,
    pub format: TextFormat,
    pub style: String,
}

/// Inline format bit-set, wire compatible with the editor's `format` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextFormat(u32);

impl TextFormat {
    pub const BOLD: Self = Self(1);
    pub const ITALIC: Self = Self(1 << 1);
    pub const STRIKETHROUGH: Self = Self(1 << 2);
    pub const UNDERLINE: Self = Self(1 << 3);
    pub const CODE: Self = Self(1 << 4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn with(self, other: Self, on: bool) -> Self {
        if on {
            Self(self.0 | other.0)
        } else {
            Self(self.0 & !other.0)
        }
    }

    pub fn is_bold(self) -> bool {
        self.contains(Self::BOLD)
    }

    pub fn is_italic(self) -> bool {
        self.contains(Self::ITALIC)
    }

    pub fn is_underline(self) -> bool {
        self.contains(Self::UNDERLINE)
    }
}

impl BitOr for TextFormat {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoidNode {
    HorizontalRule,
    LineBreak,
    Image(ImageNode),
}

impl VoidNode {
    pub fn type_name(&self) -> &'static str {
        match self {
            VoidNode::HorizontalRule => "horizontalrule",
            VoidNode::LineBreak => "linebreak",
            VoidNode::Image(_) => "image",
        }
    }

    pub fn inline_text_len(&self) -> usize {
        match self {
            VoidNode::LineBreak => 1,
            VoidNode::HorizontalRule | VoidNode::Image(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Option<Selection>,
    pub selection_after: Option<Selection>,
}

#[derive(Debug, Default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
}

impl EditorConfig {
    fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        self
    }
}

/// The live document of one note plus its selection and undo history.
///
/// Every mutation goes through [`Editor::apply`], which applies a whole
/// [`Transaction`], runs the registry's normalize passes and records a single
/// undo entry. Readers never observe a half-applied transaction.
pub struct Editor {
    doc: Document,
    selection: Option<Selection>,
    registry: PluginRegistry,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    revision: u64,
}

impl Editor {
    pub fn new(doc: Document, selection: Option<Selection>, registry: PluginRegistry) -> Self {
        Self::with_config(doc, selection, registry, EditorConfig::default())
    }

    pub fn with_config(
        doc: Document,
        selection: Option<Selection>,
        registry: PluginRegistry,
        config: EditorConfig,
    ) -> Self {
        let mut editor = Self {
            doc,
            selection,
            registry,
            config: config.with_defaults(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            revision: 0,
        };
        editor.normalize_in_place();
        editor
    }

    /// An editor over the canonical empty document with the full planner vocabulary.
    pub fn with_planner_plugins() -> Self {
        Self::new(Document::empty(), None, PluginRegistry::planner())
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection;
        self.normalize_selection_in_place();
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Incremented once per committed mutation (apply, undo, redo, replace).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Swaps in a freshly loaded document. History is cleared and the
    /// selection dropped; loading is not an undoable edit.
    pub fn replace_document(&mut self, doc: Document) {
        self.doc = doc;
        self.selection = None;
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.normalize_in_place();
        self.revision += 1;
    }

    pub fn clear_history(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let mut redo_ops: Vec<Op> = Vec::new();
        for op in inverse_ops.iter().cloned() {
            if let Ok(inv) = self.apply_op(op) {
                redo_ops.push(inv);
            } else {
                // Stop at the first inverse op that no longer applies.
                break;
            }
        }
        redo_ops.reverse();

        self.selection = selection_before.clone();
        self.normalize_in_place();
        self.revision += 1;

        self.redo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: redo_ops,
        });
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };

        let UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        } = record;

        let mut undo_ops: Vec<Op> = Vec::new();
        for op in inverse_ops.iter().cloned() {
            if let Ok(inv) = self.apply_op(op) {
                undo_ops.push(inv);
            } else {
                break;
            }
        }
        undo_ops.reverse();

        self.selection = selection_after.clone();
        self.normalize_in_place();
        self.revision += 1;

        self.undo_stack.push(UndoRecord {
            selection_before,
            selection_after,
            inverse_ops: undo_ops,
        });
        true
    }

    pub fn apply(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        if tx.ops.is_empty() {
            if let Some(sel) = tx.selection_after {
                self.set_selection(Some(sel));
            }
            return Ok(());
        }

        // Validate on a scratch copy first so a failing op leaves the live document untouched.
        self.preview_transaction(&tx)?;

        let selection_before = self.selection.clone();

        let mut inverse_ops: Vec<Op> = Vec::new();
        for op in tx.ops.iter().cloned() {
            let inv = self.apply_op(op)?;
            inverse_ops.push(inv);
        }

        if let Some(sel) = tx.selection_after {
            self.selection = Some(sel);
        }

        let mut inverse_normalize = self.normalize_with_inverse_ops()?;
        inverse_ops.append(&mut inverse_normalize);
        inverse_ops.reverse();

        self.normalize_selection_in_place();

        let selection_after = self.selection.clone();

        self.undo_stack.push(UndoRecord {
            inverse_ops,
            selection_before,
            selection_after,
        });
        self.redo_stack.clear();
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }
        self.revision += 1;

        tracing::trace!(
            source = tx.meta.source.as_deref().unwrap_or("unknown"),
            revision = self.revision,
            "applied transaction"
        );
        Ok(())
    }

    pub fn preview_transaction(&self, tx: &Transaction) -> Result<TransactionPreview, ApplyError> {
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();

        for op in tx.ops.iter().cloned() {
            let _ = apply_op_to(&mut doc, &mut selection, op)?;
        }

        if let Some(sel) = &tx.selection_after {
            selection = Some(sel.clone());
        }

        let mut converged = false;
        for _ in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(&doc);
            if ops.is_empty() {
                converged = true;
                break;
            }
            for op in ops {
                let _ = apply_op_to(&mut doc, &mut selection, op)?;
            }
        }

        if !converged {
            return Err(ApplyError::NormalizeDidNotConverge);
        }

        let selection = selection.map(|sel| self.registry.normalize_selection(&doc, &sel));

        Ok(TransactionPreview { doc, selection })
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::new(format!("Unknown command: {id}")));
        };
        (command.handler)(self, args)
    }

    pub fn run_query_json(&self, id: &str, args: Option<Value>) -> Result<Value, QueryError> {
        let Some(query) = self.registry.query(id) else {
            return Err(QueryError::new(format!("Unknown query: {id}")));
        };
        (query.handler)(self, args)
    }

    pub fn run_query<T>(&self, id: &str, args: Option<Value>) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
    {
        let value = self.run_query_json(id, args)?;
        serde_json::from_value(value)
            .map_err(|err| QueryError::new(format!("Failed to decode query result: {err}")))
    }

    fn normalize_in_place(&mut self) {
        if let Err(err) = self.normalize_with_inverse_ops() {
            tracing::warn!(error = %err, "document normalization failed");
        }
        self.normalize_selection_in_place();
    }

    fn normalize_selection_in_place(&mut self) {
        self.selection = self
            .selection
            .take()
            .map(|sel| self.registry.normalize_selection(&self.doc, &sel));
    }

    fn normalize_with_inverse_ops(&mut self) -> Result<Vec<Op>, ApplyError> {
        let mut inverse_ops: Vec<Op> = Vec::new();
        for _ in 0..self.config.max_normalize_iterations {
            let ops = self.registry.normalize(&self.doc);
            if ops.is_empty() {
                return Ok(inverse_ops);
            }
            for op in ops {
                let inv = self.apply_op(op)?;
                inverse_ops.push(inv);
            }
        }
        Err(ApplyError::NormalizeDidNotConverge)
    }

    fn apply_op(&mut self, op: Op) -> Result<Op, ApplyError> {
        apply_op_to(&mut self.doc, &mut self.selection, op)
    }
}

fn apply_op_to(
    doc: &mut Document,
    selection: &mut Option<Selection>,
    op: Op,
) -> Result<Op, ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let text_node = node_text_mut(doc, &path)?;
            let offset = clamp_to_char_boundary(&text_node.text, offset);
            text_node.text.insert_str(offset, &text);
            if let Some(selection) = selection {
                transform_selection_insert_text(selection, &path, offset, text.len());
            }
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let text_node = node_text_mut(doc, &path)?;
            let start =
                clamp_to_char_boundary(&text_node.text, range.start.min(text_node.text.len()));
            let end = clamp_to_char_boundary(&text_node.text, range.end.min(text_node.text.len()));
            if start >= end {
                return Ok(Op::InsertText {
                    path,
                    offset: start,
                    text: String::new(),
                });
            }
            let removed = text_node.text[start..end].to_string();
            text_node.text.replace_range(start..end, "");
            if let Some(selection) = selection {
                transform_selection_remove_text(selection, &path, start..end);
            }
            Ok(Op::InsertText {
                path,
                offset: start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            insert_node(doc, &path, node)?;
            if let Some(selection) = selection {
                transform_selection_insert_node(selection, &path);
            }
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let removed = remove_node(doc, &path)?;
            if let Some(selection) = selection {
                transform_selection_remove_node(selection, &path, &removed, doc);
            }
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::SetTextFormat { path, format } => {
            let text_node = node_text_mut(doc, &path)?;
            let old = std::mem::replace(&mut text_node.format, format);
            Ok(Op::SetTextFormat { path, format: old })
        }
        Op::SetElementKind { path, kind } => {
            let Node::Element(el) = node_mut(doc, &path)? else {
                return Err(ApplyError::InvalidPath("Expected element node".into()));
            };
            let old = std::mem::replace(&mut el.kind, kind);
            Ok(Op::SetElementKind { path, kind: old })
        }
        Op::SetVoid { path, node } => {
            let Node::Void(void) = node_mut(doc, &path)? else {
                return Err(ApplyError::InvalidPath("Expected void node".into()));
            };
            let old = std::mem::replace(void, node);
            Ok(Op::SetVoid { path, node: old })
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("normalization did not converge")]
    NormalizeDidNotConverge,
}

impl From<PathError> for ApplyError {
    fn from(value: PathError) -> Self {
        ApplyError::InvalidPath(value.0)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct PathError(pub String);

pub(crate) fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(
    selection: &mut Selection,
    path: &[usize],
    range: std::ops::Range<usize>,
) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path {
            continue;
        }
        if point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Selection, path: &[usize]) {
    let Some((index, parent_path)) = path.split_last() else {
        return;
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        if point.path[depth] >= *index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(
    selection: &mut Selection,
    path: &[usize],
    removed: &Node,
    doc_after_remove: &Document,
) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    let merge_prefix_len = match (removed, index.checked_sub(1)) {
        (Node::Text(removed_text), Some(left_index)) => {
            let mut left_path = parent_path.to_vec();
            left_path.push(left_index);
            match node_ref(doc_after_remove, &left_path) {
                Some(Node::Text(left_text))
                    if left_text.format == removed_text.format
                        && left_text.text.ends_with(&removed_text.text) =>
                {
                    Some(left_text.text.len().saturating_sub(removed_text.text.len()))
                }
                _ => None,
            }
        }
        _ => None,
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() {
            continue;
        }
        if !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        // Point was inside the removed subtree. Map it to a nearby point.
        if let (Some(prefix), Node::Text(removed_text), Some(left_index)) =
            (merge_prefix_len, removed, index.checked_sub(1))
        {
            point.path.truncate(depth + 1);
            point.path[depth] = left_index;
            point.offset = (prefix + point.offset).min(prefix + removed_text.text.len());
        } else {
            point.path.truncate(depth + 1);
            point.path[depth] = index.saturating_sub(1);
            point.offset = 0;
        }
    }
}

pub(crate) fn node_ref<'a>(doc: &'a Document, path: &[usize]) -> Option<&'a Node> {
    let (first, rest) = path.split_first()?;
    let mut node = doc.children.get(*first)?;
    for &ix in rest {
        node = match node {
            Node::Element(el) => el.children.get(ix)?,
            Node::Void(_) | Node::Text(_) => return None,
        };
    }
    Some(node)
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, PathError> {
    let Some((first, rest)) = path.split_first() else {
        return Err(PathError("Empty path".into()));
    };

    let len = doc.children.len();
    let mut node = doc.children.get_mut(*first).ok_or_else(|| {
        PathError(format!("Path out of bounds at depth 0: {first} >= {len}"))
    })?;

    for (depth, &ix) in rest.iter().enumerate() {
        node = match node {
            Node::Element(el) => {
                let len = el.children.len();
                el.children.get_mut(ix).ok_or_else(|| {
                    PathError(format!(
                        "Path out of bounds at depth {}: {ix} >= {len}",
                        depth + 1
                    ))
                })?
            }
            Node::Void(_) | Node::Text(_) => {
                return Err(PathError(format!("Non-container node at depth {depth}")));
            }
        };
    }

    Ok(node)
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, PathError> {
    match node_mut(doc, path)? {
        Node::Text(t) => Ok(t),
        _ => Err(PathError("Expected Text node".into())),
    }
}

fn children_mut<'a>(
    doc: &'a mut Document,
    parent_path: &[usize],
) -> Result<&'a mut Vec<Node>, PathError> {
    if parent_path.is_empty() {
        return Ok(&mut doc.children);
    }
    match node_mut(doc, parent_path)? {
        Node::Element(el) => Ok(&mut el.children),
        Node::Void(_) | Node::Text(_) => Err(PathError("Parent is not a container".into())),
    }
}

fn insert_node(doc: &mut Document, path: &[usize], node: Node) -> Result<(), PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty insert path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index > children.len() {
        return Err(PathError(format!(
            "Insert index out of bounds: {index} > {}",
            children.len()
        )));
    }
    children.insert(index, node);
    Ok(())
}

fn remove_node(doc: &mut Document, path: &[usize]) -> Result<Node, PathError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(PathError("Empty remove path".into()));
    };

    let children = children_mut(doc, parent_path)?;
    if index >= children.len() {
        return Err(PathError(format!(
            "Remove index out of bounds: {index} >= {}",
            children.len()
        )));
    }
    Ok(children.remove(index))
}
