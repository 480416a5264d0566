use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{
    Document, Node, Point, Selection, TextFormat, TextNode, clamp_to_char_boundary,
    node_ref,
};
use crate::ops::{Op, Transaction};

#[derive(Debug, Clone)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandError {}

#[derive(Debug, Clone)]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for QueryError {}

pub type CommandHandler = std::sync::Arc<
    dyn Fn(&mut crate::core::Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync,
>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut crate::core::Editor, Option<Value>) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            handler: std::sync::Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }
}

#[derive(Clone)]
pub struct QuerySpec {
    pub id: String,
    pub handler: std::sync::Arc<
        dyn Fn(&crate::core::Editor, Option<Value>) -> Result<Value, QueryError> + Send + Sync,
    >,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Block,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
}

/// Reads one serialized node (already known to carry this spec's `type`).
pub type ImportFn = fn(&Map<String, Value>, &PluginRegistry) -> Option<Node>;
/// Writes one node; `None` when handed a node of another type.
pub type ExportFn = fn(&Node, &PluginRegistry) -> Option<Value>;

/// One entry of the per-type dispatch table: how a node type is tagged,
/// versioned, read and written.
#[derive(Clone)]
pub struct NodeSpec {
    pub type_name: &'static str,
    pub version: u32,
    pub role: NodeRole,
    pub is_void: bool,
    pub children: ChildConstraint,
    pub import: ImportFn,
    pub export: ExportFn,
}

pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document, registry: &PluginRegistry) -> Vec<Op>;
}

#[derive(Debug, Clone)]
pub struct TransactionPreview {
    pub doc: Document,
    pub selection: Option<Selection>,
}

pub trait NotePlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn node_specs(&self) -> Vec<NodeSpec> {
        Vec::new()
    }
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
    fn queries(&self) -> Vec<QuerySpec> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct PluginRegistry {
    node_specs: HashMap<&'static str, NodeSpec>,
    normalize_passes: Vec<Box<dyn NormalizePass>>,
    commands: HashMap<String, CommandSpec>,
    queries: HashMap<String, QuerySpec>,
}

impl PluginRegistry {
    pub fn new(plugins: impl IntoIterator<Item = Box<dyn NotePlugin>>) -> Result<Self, String> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    pub fn core() -> Self {
        let plugins: Vec<Box<dyn NotePlugin>> = vec![
            Box::new(crate::blocks::ParagraphPlugin),
            Box::new(crate::blocks::HorizontalRulePlugin),
            Box::new(CoreNormalizePlugin),
            Box::new(CoreCommandsPlugin),
        ];
        Self::new(plugins).expect("core registry must be valid")
    }

    /// Every node type a planner note can contain, plus the commands the
    /// editor host drives.
    pub fn planner() -> Self {
        let plugins: Vec<Box<dyn NotePlugin>> = vec![
            Box::new(crate::blocks::ParagraphPlugin),
            Box::new(crate::blocks::HorizontalRulePlugin),
            Box::new(CoreNormalizePlugin),
            Box::new(CoreCommandsPlugin),
            Box::new(crate::blocks::HeadingPlugin),
            Box::new(crate::blocks::QuotePlugin),
            Box::new(crate::blocks::CodePlugin),
            Box::new(crate::blocks::ListPlugin),
            Box::new(crate::format::FormatPlugin),
            Box::new(crate::image::ImagePlugin),
            Box::new(crate::structured::StructuredImportPlugin),
        ];
        Self::new(plugins).expect("planner registry must be valid")
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn NotePlugin>) -> Result<(), String> {
        for spec in plugin.node_specs() {
            if self.node_specs.contains_key(spec.type_name) {
                return Err(format!("Duplicate node spec type: {}", spec.type_name));
            }
            self.node_specs.insert(spec.type_name, spec);
        }

        self.normalize_passes.extend(plugin.normalize_passes());

        for cmd in plugin.commands() {
            if self.commands.contains_key(&cmd.id) {
                return Err(format!("Duplicate command id: {}", cmd.id));
            }
            self.commands.insert(cmd.id.clone(), cmd);
        }

        for query in plugin.queries() {
            if self.queries.contains_key(&query.id) {
                return Err(format!("Duplicate query id: {}", query.id));
            }
            self.queries.insert(query.id.clone(), query);
        }

        tracing::debug!(plugin = plugin.id(), "registered note plugin");
        Ok(())
    }

    pub fn node_specs(&self) -> &HashMap<&'static str, NodeSpec> {
        &self.node_specs
    }

    pub fn spec(&self, type_name: &str) -> Option<&NodeSpec> {
        self.node_specs.get(type_name)
    }

    pub fn spec_for(&self, node: &Node) -> Option<&NodeSpec> {
        self.node_specs.get(node.type_name())
    }

    pub fn normalize_passes(&self) -> &[Box<dyn NormalizePass>] {
        &self.normalize_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    pub fn queries(&self) -> &HashMap<String, QuerySpec> {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<QuerySpec> {
        self.queries.get(id).cloned()
    }

    pub fn normalize(&self, doc: &Document) -> Vec<Op> {
        let mut ops: Vec<Op> = Vec::new();
        for pass in &self.normalize_passes {
            ops.extend(pass.run(doc, self));
            // Later passes see paths computed against the unmodified document,
            // so stop at the first pass that has work to do.
            if !ops.is_empty() {
                break;
            }
        }
        ops
    }

    pub fn normalize_selection(&self, doc: &Document, selection: &Selection) -> Selection {
        let fallback = first_text_point(doc).unwrap_or(Point {
            path: vec![0],
            offset: 0,
        });

        let anchor =
            normalize_point_to_existing_text(doc, &selection.anchor).unwrap_or_else(|| {
                normalize_point_to_existing_text(doc, &selection.focus)
                    .unwrap_or_else(|| fallback.clone())
            });
        let focus = normalize_point_to_existing_text(doc, &selection.focus)
            .unwrap_or_else(|| anchor.clone());

        Selection { anchor, focus }
    }
}

fn first_text_point(doc: &Document) -> Option<Point> {
    first_text_descendant(&doc.children, &mut Vec::new())
}

fn first_text_descendant(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
    for (ix, node) in children.iter().enumerate() {
        path.push(ix);
        match node {
            Node::Text(_) => {
                let point = Point {
                    path: path.clone(),
                    offset: 0,
                };
                path.pop();
                return Some(point);
            }
            Node::Element(el) => {
                if let Some(point) = first_text_descendant(&el.children, path) {
                    path.pop();
                    return Some(point);
                }
            }
            Node::Void(_) => {}
        }
        path.pop();
    }
    None
}

fn last_text_descendant(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
    for (ix, node) in children.iter().enumerate().rev() {
        path.push(ix);
        match node {
            Node::Text(t) => {
                let point = Point {
                    path: path.clone(),
                    offset: t.text.len(),
                };
                path.pop();
                return Some(point);
            }
            Node::Element(el) => {
                if let Some(point) = last_text_descendant(&el.children, path) {
                    path.pop();
                    return Some(point);
                }
            }
            Node::Void(_) => {}
        }
        path.pop();
    }
    None
}

/// First caret position inside `node`, which lives at `path`.
pub(crate) fn start_of_node(node: &Node, path: &[usize]) -> Option<Point> {
    let mut path = path.to_vec();
    match node {
        Node::Text(_) => Some(Point::new(path, 0)),
        Node::Element(el) => first_text_descendant(&el.children, &mut path),
        Node::Void(_) => None,
    }
}

/// Last caret position inside `node`, which lives at `path`.
pub(crate) fn end_of_node(node: &Node, path: &[usize]) -> Option<Point> {
    let mut path = path.to_vec();
    match node {
        Node::Text(t) => Some(Point::new(path, t.text.len())),
        Node::Element(el) => last_text_descendant(&el.children, &mut path),
        Node::Void(_) => None,
    }
}

pub(crate) fn end_of_document(doc: &Document) -> Option<Point> {
    last_text_descendant(&doc.children, &mut Vec::new())
}

fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() || doc.children.is_empty() {
        return None;
    }

    let mut resolved_path: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved_path.push(ix);
        let node = &children[ix];
        match node {
            Node::Text(t) => {
                return Some(Point {
                    path: resolved_path,
                    offset: clamp_to_char_boundary(&t.text, point.offset),
                });
            }
            Node::Element(el) => {
                children = &el.children;
            }
            Node::Void(_) => {
                break;
            }
        }
    }

    let node = node_ref(doc, &resolved_path)?;
    match node {
        Node::Text(t) => Some(Point {
            path: resolved_path,
            offset: clamp_to_char_boundary(&t.text, point.offset),
        }),
        Node::Element(el) => first_text_descendant(&el.children, &mut resolved_path),
        Node::Void(_) => None,
    }
}

struct CoreNormalizePlugin;

impl NotePlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(EnsureTextBlocksHaveTextLeaf),
            Box::new(MergeAdjacentTextLeaves),
        ]
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

struct EnsureTextBlocksHaveTextLeaf;

impl NormalizePass for EnsureTextBlocksHaveTextLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_text_blocks_have_text_leaf"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                if el.is_text_block() {
                    let has_text = el.children.iter().any(|n| matches!(n, Node::Text(_)));
                    if !has_text {
                        let mut insert_path = path.clone();
                        insert_path.push(0);
                        ops.push(Op::InsertNode {
                            path: insert_path,
                            node: Node::text("", TextFormat::empty()),
                        });
                    }
                } else {
                    walk(&el.children, path, ops);
                }

                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document, _registry: &PluginRegistry) -> Vec<Op> {
        let mut ops = Vec::new();

        fn same_format(a: &TextNode, b: &TextNode) -> bool {
            a.format == b.format && a.style == b.style
        }

        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);

                if !el.is_text_block() {
                    walk(&el.children, path, ops);
                    path.pop();
                    continue;
                }

                let mut ix = el.children.len();
                while ix > 0 {
                    ix -= 1;
                    let Node::Text(right) = &el.children[ix] else {
                        continue;
                    };

                    let mut start = ix;
                    while start > 0 {
                        let Some(Node::Text(left)) = el.children.get(start - 1) else {
                            break;
                        };
                        if !same_format(left, right) {
                            break;
                        }
                        start -= 1;
                    }

                    if start == ix {
                        continue;
                    }

                    let Some(Node::Text(first)) = el.children.get(start) else {
                        continue;
                    };
                    let mut appended = String::new();
                    for node in el.children.iter().take(ix + 1).skip(start + 1) {
                        if let Node::Text(t) = node {
                            appended.push_str(&t.text);
                        }
                    }

                    if !appended.is_empty() {
                        let mut insert_text_path = path.clone();
                        insert_text_path.push(start);
                        ops.push(Op::InsertText {
                            path: insert_text_path,
                            offset: first.text.len(),
                            text: appended,
                        });
                    }

                    for remove_ix in (start + 1..=ix).rev() {
                        let mut remove_path = path.clone();
                        remove_path.push(remove_ix);
                        ops.push(Op::RemoveNode { path: remove_path });
                    }

                    ix = start;
                }

                path.pop();
            }
        }

        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

struct CoreCommandsPlugin;

impl NotePlugin for CoreCommandsPlugin {
    fn id(&self) -> &'static str {
        "core.commands"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("core.insert_text", "Insert text", |editor, args| {
                let text = args
                    .as_ref()
                    .and_then(|v| v.get("text"))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| CommandError::new("Missing args.text"))?
                    .to_string();
                let tx = insert_text(editor, text).map_err(CommandError::new)?;
                editor
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to insert text: {e}")))
            })
            .description("Insert plain text at the caret.")
            .keywords(["type", "text", "insert"])
            .args_example(serde_json::json!({ "text": "Buy milk" })),
            CommandSpec::new("core.delete_backward", "Delete backward", |editor, _args| {
                let Some(tx) = delete_backward(editor) else {
                    return Ok(());
                };
                editor
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("Failed to delete: {e}")))
            })
            .description("Delete the character before the caret.")
            .keywords(["backspace", "delete"]),
            CommandSpec::new(
                "core.insert_horizontal_rule",
                "Insert horizontal rule",
                |editor, _args| {
                    let tx = insert_horizontal_rule(editor);
                    editor.apply(tx).map_err(|e| {
                        CommandError::new(format!("Failed to insert horizontal rule: {e}"))
                    })
                },
            )
            .description("Insert a horizontal rule and a trailing paragraph.")
            .keywords(["divider", "separator", "hr", "horizontal rule"]),
            CommandSpec::new("core.select_end", "Move caret to end", |editor, _args| {
                let point = end_of_document(editor.doc())
                    .ok_or_else(|| CommandError::new("Document has no text"))?;
                editor.set_selection(Some(Selection::collapsed(point)));
                Ok(())
            })
            .description("Place a collapsed caret at the end of the document.")
            .keywords(["caret", "end", "focus"]),
            CommandSpec::new("core.blur", "Clear selection", |editor, _args| {
                editor.set_selection(None);
                Ok(())
            })
            .description("Drop the active selection.")
            .keywords(["blur", "deselect"]),
            CommandSpec::new("core.undo", "Undo", |editor, _args| {
                editor.undo();
                Ok(())
            })
            .keywords(["undo", "history"]),
            CommandSpec::new("core.redo", "Redo", |editor, _args| {
                editor.redo();
                Ok(())
            })
            .keywords(["redo", "history"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![
            QuerySpec {
                id: "selection.is_active".to_string(),
                handler: std::sync::Arc::new(|editor, _args| {
                    Ok(Value::Bool(editor.selection().is_some()))
                }),
            },
            QuerySpec {
                id: "history.can_undo".to_string(),
                handler: std::sync::Arc::new(|editor, _args| Ok(Value::Bool(editor.can_undo()))),
            },
            QuerySpec {
                id: "history.can_redo".to_string(),
                handler: std::sync::Arc::new(|editor, _args| Ok(Value::Bool(editor.can_redo()))),
            },
        ]
    }
}

/// The caret's top-level block index and, for a caret directly inside a
/// top-level text block, its inline child index and byte offset.
pub(crate) fn caret_position(selection: &Selection) -> (usize, Option<(usize, usize)>) {
    let focus = &selection.focus;
    let top = focus.path.first().copied().unwrap_or(0);
    let inline = match focus.path.as_slice() {
        [_, child_ix] => Some((*child_ix, focus.offset)),
        _ => None,
    };
    (top, inline)
}

fn insert_text(editor: &crate::core::Editor, text: String) -> Result<Transaction, String> {
    let Some(selection) = editor.selection() else {
        return Err("No active selection".into());
    };
    let focus = selection.focus.clone();
    let Some(Node::Text(node)) = node_ref(editor.doc(), &focus.path) else {
        return Err("Selection is not in a text node".into());
    };
    let offset = clamp_to_char_boundary(&node.text, focus.offset);
    let caret = Point::new(focus.path.clone(), offset + text.len());
    Ok(Transaction::new(vec![Op::InsertText {
        path: focus.path,
        offset,
        text,
    }])
    .selection_after(Selection::collapsed(caret))
    .source("command:core.insert_text"))
}

fn delete_backward(editor: &crate::core::Editor) -> Option<Transaction> {
    let focus = editor.selection()?.focus.clone();
    let Some(Node::Text(node)) = node_ref(editor.doc(), &focus.path) else {
        return None;
    };
    let end = clamp_to_char_boundary(&node.text, focus.offset);
    let start = node.text[..end].char_indices().last().map(|(ix, _)| ix)?;
    Some(
        Transaction::new(vec![Op::RemoveText {
            path: focus.path.clone(),
            range: start..end,
        }])
        .selection_after(Selection::collapsed(Point::new(focus.path, start)))
        .source("command:core.delete_backward"),
    )
}

/// Insertion index at the root for a new block: after the caret's top-level
/// block, or at the end when nothing is selected.
pub(crate) fn block_insert_index(editor: &crate::core::Editor) -> usize {
    match editor.selection() {
        Some(selection) => caret_position(selection).0 + 1,
        None => editor.doc().children.len(),
    }
    .min(editor.doc().children.len())
}

fn insert_horizontal_rule(editor: &crate::core::Editor) -> Transaction {
    let insert_at = block_insert_index(editor);

    Transaction::new(vec![
        Op::InsertNode {
            path: vec![insert_at],
            node: Node::horizontal_rule(),
        },
        Op::InsertNode {
            path: vec![insert_at + 1],
            node: Node::paragraph(""),
        },
    ])
    .selection_after(Selection::collapsed(Point::new(vec![insert_at + 1, 0], 0)))
    .source("command:core.insert_horizontal_rule")
}
