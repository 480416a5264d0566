//! Converts the note-structuring service's block/segment response into native
//! nodes and merges them into the live document.

use serde::{Deserialize, Serialize};

use crate::core::{
    ApplyError, Document, Editor, ElementKind, ElementNode, ListType, Node, Point, Selection,
    TextFormat, TextNode, clamp_to_char_boundary,
};
use crate::ops::{Op, Transaction};
use crate::plugin::{CommandError, CommandSpec, NotePlugin, caret_position, end_of_node, start_of_node};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredNotesResponse {
    #[serde(default)]
    pub blocks: Vec<StructuredBlock>,
}

impl StructuredNotesResponse {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredBlock {
    #[serde(rename = "type")]
    pub block_type: StructuredBlockType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<InlineSpan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<StructuredItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredBlockType {
    Heading1,
    Heading2,
    Heading3,
    Paragraph,
    BulletedList,
    NumberedList,
    Checklist,
    HorizontalRule,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineSpan {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
}

impl InlineSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn format(&self) -> TextFormat {
        TextFormat::empty()
            .with(TextFormat::BOLD, self.bold == Some(true))
            .with(TextFormat::ITALIC, self.italic == Some(true))
            .with(TextFormat::UNDERLINE, self.underline == Some(true))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredItem {
    #[serde(default)]
    pub segments: Vec<InlineSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

/// Maps every block to its node. An empty response yields no nodes.
pub fn build_nodes(response: &StructuredNotesResponse) -> Vec<Node> {
    response.blocks.iter().map(build_block).collect()
}

fn build_block(block: &StructuredBlock) -> Node {
    let list = |list_type| build_list(list_type, &block.items);
    match block.block_type {
        StructuredBlockType::Heading1 => Node::element(ElementKind::heading(1), runs(&block.segments)),
        StructuredBlockType::Heading2 => Node::element(ElementKind::heading(2), runs(&block.segments)),
        StructuredBlockType::Heading3 => Node::element(ElementKind::heading(3), runs(&block.segments)),
        StructuredBlockType::Paragraph => Node::element(ElementKind::Paragraph, runs(&block.segments)),
        StructuredBlockType::BulletedList => list(ListType::Bullet),
        StructuredBlockType::NumberedList => list(ListType::Number),
        StructuredBlockType::Checklist => list(ListType::Check),
        StructuredBlockType::HorizontalRule => Node::horizontal_rule(),
        StructuredBlockType::Unknown => {
            tracing::debug!("unknown structured block type, importing as paragraph");
            Node::element(ElementKind::Paragraph, runs(&block.segments))
        }
    }
}

fn build_list(list_type: ListType, items: &[StructuredItem]) -> Node {
    let empty_item = [StructuredItem::default()];
    let items = if items.is_empty() { &empty_item[..] } else { items };

    let children = items
        .iter()
        .enumerate()
        .map(|(ix, item)| {
            let checked = (list_type == ListType::Check).then(|| item.checked.unwrap_or(false));
            Node::element(
                ElementKind::ListItem {
                    checked,
                    value: ix as u64 + 1,
                },
                runs(&item.segments),
            )
        })
        .collect();
    Node::element(ElementKind::list(list_type), children)
}

/// Text runs for `segments`, with empty segments dropped and neighbours that
/// share a format merged. Always returns at least one run.
fn runs(segments: &[InlineSpan]) -> Vec<Node> {
    let mut out: Vec<TextNode> = Vec::new();
    for span in segments.iter().filter(|span| !span.text.is_empty()) {
        let format = span.format();
        match out.last_mut() {
            Some(last) if last.format == format => last.text.push_str(&span.text),
            _ => out.push(TextNode {
                text: span.text.clone(),
                format,
                style: String::new(),
            }),
        }
    }
    if out.is_empty() {
        return vec![Node::text("", TextFormat::empty())];
    }
    out.into_iter().map(Node::Text).collect()
}

/// A whole document built from `response`, for read-only previews.
pub fn structured_preview(response: &StructuredNotesResponse) -> Document {
    let children = build_nodes(response);
    if children.is_empty() {
        return Document::empty();
    }
    Document { children }
}

/// Inserts the response's nodes as one undoable transaction. Returns `false`
/// (and changes nothing) for an empty response.
pub fn insert_structured(
    editor: &mut Editor,
    response: &StructuredNotesResponse,
) -> Result<bool, ApplyError> {
    let Some(tx) = structured_transaction(editor.doc(), editor.selection(), build_nodes(response))
    else {
        return Ok(false);
    };
    editor.apply(tx)?;
    Ok(true)
}

/// Builds the insertion transaction for `nodes`.
///
/// With a caret directly inside a top-level text block, that block is split
/// at the caret and the nodes go between the halves; an empty half is not
/// kept. Any other caret inserts after its top-level block, and no caret at
/// all appends to the root. The caret lands at the end of the last inserted
/// node, or at the start of what follows when that node holds no text.
pub fn structured_transaction(
    doc: &Document,
    selection: Option<&Selection>,
    nodes: Vec<Node>,
) -> Option<Transaction> {
    if nodes.is_empty() {
        return None;
    }

    let doc_len = doc.children.len();
    let count = nodes.len();
    let mut ops: Vec<Op> = Vec::new();

    // Index of the first inserted node, and the node that will follow the last one.
    let (first, following): (usize, Option<Node>) = match selection.map(caret_position) {
        None => (doc_len, None),
        Some((top, inline)) => {
            let top = top.min(doc_len.saturating_sub(1));
            match (doc.children.get(top), inline) {
                (Some(Node::Element(el)), Some((child_ix, offset))) if el.is_text_block() => {
                    let (left, right) = split_block(el, child_ix, offset);
                    match (is_blank(&left.children), is_blank(&right.children)) {
                        (true, true) => {
                            ops.push(Op::RemoveNode { path: vec![top] });
                            (top, doc.children.get(top + 1).cloned())
                        }
                        (false, true) => (top + 1, doc.children.get(top + 1).cloned()),
                        (true, false) => (top, doc.children.get(top).cloned()),
                        (false, false) => {
                            ops.push(Op::RemoveNode { path: vec![top] });
                            ops.push(Op::InsertNode {
                                path: vec![top],
                                node: Node::Element(left),
                            });
                            let right = Node::Element(right);
                            ops.push(Op::InsertNode {
                                path: vec![top + 1],
                                node: right.clone(),
                            });
                            (top + 1, Some(right))
                        }
                    }
                }
                (Some(_), _) => (top + 1, doc.children.get(top + 1).cloned()),
                (None, _) => (doc_len, None),
            }
        }
    };

    let last_index = first + count - 1;
    let last_end = nodes.last().and_then(|node| end_of_node(node, &[last_index]));
    for (i, node) in nodes.into_iter().enumerate() {
        ops.push(Op::InsertNode {
            path: vec![first + i],
            node,
        });
    }

    let caret = match last_end {
        Some(point) => point,
        None => match following.as_ref().and_then(|node| start_of_node(node, &[last_index + 1])) {
            Some(point) => point,
            None => {
                ops.push(Op::InsertNode {
                    path: vec![last_index + 1],
                    node: Node::paragraph(""),
                });
                Point::new(vec![last_index + 1, 0], 0)
            }
        },
    };

    Some(
        Transaction::new(ops)
            .selection_after(Selection::collapsed(caret))
            .source("structured.insert"),
    )
}

/// Splits a text block's inline children at (`child_ix`, `offset`) into two
/// blocks of the same kind and style.
fn split_block(el: &ElementNode, child_ix: usize, offset: usize) -> (ElementNode, ElementNode) {
    let mut left: Vec<Node> = Vec::new();
    let mut right: Vec<Node> = Vec::new();

    for (ix, child) in el.children.iter().enumerate() {
        if ix < child_ix {
            left.push(child.clone());
            continue;
        }
        if ix > child_ix {
            right.push(child.clone());
            continue;
        }
        match child {
            Node::Text(t) => {
                let at = clamp_to_char_boundary(&t.text, offset);
                if at > 0 {
                    left.push(Node::Text(TextNode {
                        text: t.text[..at].to_string(),
                        ..t.clone()
                    }));
                }
                if at < t.text.len() {
                    right.push(Node::Text(TextNode {
                        text: t.text[at..].to_string(),
                        ..t.clone()
                    }));
                }
            }
            other if offset == 0 => right.push(other.clone()),
            other => left.push(other.clone()),
        }
    }

    let half = |children: Vec<Node>| ElementNode {
        kind: el.kind.clone(),
        style: el.style.clone(),
        children,
    };
    (half(left), half(right))
}

fn is_blank(children: &[Node]) -> bool {
    children
        .iter()
        .all(|n| matches!(n, Node::Text(t) if t.text.is_empty()))
}

pub struct StructuredImportPlugin;

impl NotePlugin for StructuredImportPlugin {
    fn id(&self) -> &'static str {
        "structured"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("structured.insert", "Insert structured notes", |editor, args| {
                let response: StructuredNotesResponse =
                    serde_json::from_value(args.unwrap_or_default()).map_err(|e| {
                        CommandError::new(format!("Invalid structured response: {e}"))
                    })?;
                insert_structured(editor, &response)
                    .map(|_| ())
                    .map_err(|e| CommandError::new(format!("Failed to insert notes: {e}")))
            })
            .description("Insert AI-structured blocks at the caret, or at the end.")
            .keywords(["ai", "structure", "import", "dictation"])
            .args_example(serde_json::json!({
                "blocks": [
                    { "type": "heading2", "segments": [{ "text": "Today" }] },
                    { "type": "checklist", "items": [{ "segments": [{ "text": "Call Sam" }] }] }
                ]
            })),
        ]
    }
}
