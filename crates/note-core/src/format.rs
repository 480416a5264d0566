use serde_json::json;

use crate::core::{
    Document, Editor, ElementNode, Node, Point, Selection, TextFormat, TextNode,
    clamp_to_char_boundary, node_ref,
};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{CommandError, CommandSpec, NotePlugin, QuerySpec};

/// Inline format toggles for the toolbar (bold, italic, underline).
pub struct FormatPlugin;

impl NotePlugin for FormatPlugin {
    fn id(&self) -> &'static str {
        "format"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("format.toggle_bold", "Bold", |editor, _args| {
                run_toggle(editor, TextFormat::BOLD, "command:format.toggle_bold")
            })
            .keywords(["bold", "strong"]),
            CommandSpec::new("format.toggle_italic", "Italic", |editor, _args| {
                run_toggle(editor, TextFormat::ITALIC, "command:format.toggle_italic")
            })
            .keywords(["italic", "emphasis"]),
            CommandSpec::new("format.toggle_underline", "Underline", |editor, _args| {
                run_toggle(
                    editor,
                    TextFormat::UNDERLINE,
                    "command:format.toggle_underline",
                )
            })
            .keywords(["underline"]),
        ]
    }

    fn queries(&self) -> Vec<QuerySpec> {
        vec![QuerySpec {
            id: "format.active".to_string(),
            handler: std::sync::Arc::new(|editor, _args| {
                let format = active_format(editor);
                Ok(json!({
                    "bits": format.bits(),
                    "bold": format.is_bold(),
                    "italic": format.is_italic(),
                    "underline": format.is_underline(),
                }))
            }),
        }]
    }
}

fn run_toggle(editor: &mut Editor, flag: TextFormat, source: &'static str) -> Result<(), CommandError> {
    let tx = toggle_format(editor, flag, source).map_err(CommandError::new)?;
    editor
        .apply(tx)
        .map_err(|e| CommandError::new(format!("Failed to toggle format: {e}")))
}

/// The format of the text run under the caret, or empty without one.
pub fn active_format(editor: &Editor) -> TextFormat {
    let Some(selection) = editor.selection() else {
        return TextFormat::empty();
    };
    match node_ref(editor.doc(), &selection.focus.path) {
        Some(Node::Text(text)) => text.format,
        _ => TextFormat::empty(),
    }
}

fn toggle_format(
    editor: &Editor,
    flag: TextFormat,
    source: &'static str,
) -> Result<Transaction, String> {
    let Some(sel) = editor.selection().cloned() else {
        return Err("No active selection".into());
    };

    let (ops, selection_after) = if sel.is_collapsed() {
        toggle_format_at_caret(editor.doc(), &sel.focus, |format| {
            format.with(flag, !format.contains(flag))
        })?
    } else {
        let target = !all_selected_text_has_format(editor.doc(), &sel, flag)?;
        apply_format_range(editor.doc(), &sel, &|format: TextFormat| {
            format.with(flag, target)
        })?
    };

    Ok(Transaction::new(ops)
        .selection_after(selection_after)
        .source(source))
}

/// Splits the run at the caret and leaves an empty run carrying the new
/// format for the next typed text.
fn toggle_format_at_caret(
    doc: &Document,
    focus: &Point,
    apply: impl Fn(TextFormat) -> TextFormat,
) -> Result<(Vec<Op>, Selection), String> {
    let (child_ix, block_path) = focus
        .path
        .split_last()
        .ok_or_else(|| "Selection is not in a text node".to_string())?;

    let Some(Node::Element(el)) = node_ref(doc, block_path) else {
        return Err("Selection is not in a text block".into());
    };
    let Some(Node::Text(text)) = el.children.get(*child_ix) else {
        return Err("Selection is not in a text node".into());
    };

    let cursor = clamp_to_char_boundary(&text.text, focus.offset);
    let format_after = apply(text.format);

    if text.text.is_empty() {
        return Ok((
            vec![Op::SetTextFormat {
                path: focus.path.clone(),
                format: format_after,
            }],
            Selection::collapsed(Point::new(focus.path.clone(), 0)),
        ));
    }

    let left = &text.text[..cursor];
    let right = &text.text[cursor..];

    let mut replacement: Vec<Node> = Vec::new();
    let mut caret_child_ix = *child_ix;
    if !left.is_empty() {
        replacement.push(Node::Text(TextNode {
            text: left.to_string(),
            ..text.clone()
        }));
        caret_child_ix += 1;
    }
    replacement.push(Node::Text(TextNode {
        text: String::new(),
        format: format_after,
        style: text.style.clone(),
    }));
    if !right.is_empty() {
        replacement.push(Node::Text(TextNode {
            text: right.to_string(),
            ..text.clone()
        }));
    }

    let mut ops = vec![Op::RemoveNode {
        path: focus.path.clone(),
    }];
    for (i, node) in replacement.into_iter().enumerate() {
        let mut path = block_path.to_vec();
        path.push(child_ix + i);
        ops.push(Op::InsertNode { path, node });
    }

    let mut caret_path = block_path.to_vec();
    caret_path.push(caret_child_ix);
    Ok((ops, Selection::collapsed(Point::new(caret_path, 0))))
}

struct TextBlock<'a> {
    path: Path,
    el: &'a ElementNode,
}

fn text_blocks_in_order(doc: &Document) -> Vec<TextBlock<'_>> {
    fn walk<'a>(nodes: &'a [Node], path: &mut Vec<usize>, out: &mut Vec<TextBlock<'a>>) {
        for (ix, node) in nodes.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };
            path.push(ix);
            if el.is_text_block() {
                out.push(TextBlock {
                    path: path.clone(),
                    el,
                });
            } else {
                walk(&el.children, path, out);
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut out);
    out
}

fn ordered_selection_points(sel: &Selection) -> (Point, Point) {
    let mut start = sel.anchor.clone();
    let mut end = sel.focus.clone();
    if (end.path.as_slice(), end.offset) < (start.path.as_slice(), start.offset) {
        std::mem::swap(&mut start, &mut end);
    }
    (start, end)
}

fn inline_len(node: &Node) -> usize {
    match node {
        Node::Text(t) => t.text.len(),
        Node::Void(v) => v.inline_text_len(),
        Node::Element(_) => 0,
    }
}

fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let before: usize = children.iter().take(child_ix).map(inline_len).sum();
    let within = match children.get(child_ix) {
        Some(Node::Text(t)) => clamp_to_char_boundary(&t.text, offset),
        Some(node) => offset.min(inline_len(node)),
        None => 0,
    };
    before + within
}

fn point_for_global_offset(block_path: &[usize], children: &[Node], global_offset: usize) -> Point {
    let mut remaining = global_offset;
    let mut last_text: Option<(usize, usize)> = None;
    for (child_ix, node) in children.iter().enumerate() {
        if let Node::Text(t) = node {
            if remaining <= t.text.len() {
                let mut path = block_path.to_vec();
                path.push(child_ix);
                return Point::new(path, clamp_to_char_boundary(&t.text, remaining));
            }
            last_text = Some((child_ix, t.text.len()));
        }
        remaining = remaining.saturating_sub(inline_len(node));
    }

    let (child_ix, offset) = last_text.unwrap_or((0, 0));
    let mut path = block_path.to_vec();
    path.push(child_ix);
    Point::new(path, offset)
}

/// Selection bounds per text block, as global inline offsets.
fn selected_ranges<'a>(
    doc: &'a Document,
    sel: &Selection,
) -> Result<Vec<(TextBlock<'a>, usize, usize)>, String> {
    let (start, end) = ordered_selection_points(sel);
    let (start_inline_ix, start_block_path) = start
        .path
        .split_last()
        .ok_or_else(|| "Selection start is not in a text block".to_string())?;
    let (end_inline_ix, end_block_path) = end
        .path
        .split_last()
        .ok_or_else(|| "Selection end is not in a text block".to_string())?;

    let blocks = text_blocks_in_order(doc);
    let start_index = blocks
        .iter()
        .position(|b| b.path == start_block_path)
        .ok_or_else(|| "Selection start is not in a text block".to_string())?;
    let end_index = blocks
        .iter()
        .position(|b| b.path == end_block_path)
        .ok_or_else(|| "Selection end is not in a text block".to_string())?;

    let mut out = Vec::new();
    for (block_index, block) in blocks.into_iter().enumerate() {
        if block_index < start_index || block_index > end_index {
            continue;
        }
        let children = block.el.children.as_slice();
        let total: usize = children.iter().map(inline_len).sum();
        let start_global = if block_index == start_index {
            point_global_offset(children, *start_inline_ix, start.offset)
        } else {
            0
        };
        let end_global = if block_index == end_index {
            point_global_offset(children, *end_inline_ix, end.offset)
        } else {
            total
        };
        if start_global < end_global {
            out.push((block, start_global, end_global));
        }
    }
    Ok(out)
}

fn all_selected_text_has_format(
    doc: &Document,
    sel: &Selection,
    flag: TextFormat,
) -> Result<bool, String> {
    for (block, start_global, end_global) in selected_ranges(doc, sel)? {
        let mut cursor = 0usize;
        for node in &block.el.children {
            let node_start = cursor;
            cursor += inline_len(node);
            if end_global <= node_start || start_global >= cursor {
                continue;
            }
            if let Node::Text(t) = node {
                if !t.format.contains(flag) {
                    return Ok(false);
                }
            }
        }
    }
    Ok(true)
}

fn apply_format_in_block(
    children: &[Node],
    start_global: usize,
    end_global: usize,
    apply: &dyn Fn(TextFormat) -> TextFormat,
) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let node_start = cursor;
        cursor += inline_len(node);
        let Node::Text(t) = node else {
            out.push(node.clone());
            continue;
        };
        if end_global <= node_start || start_global >= cursor {
            out.push(node.clone());
            continue;
        }

        let sel_start = clamp_to_char_boundary(&t.text, start_global.saturating_sub(node_start));
        let sel_end = clamp_to_char_boundary(&t.text, end_global.saturating_sub(node_start));

        let pieces = [
            (&t.text[..sel_start], t.format),
            (&t.text[sel_start..sel_end], apply(t.format)),
            (&t.text[sel_end..], t.format),
        ];
        for (text, format) in pieces {
            if !text.is_empty() {
                out.push(Node::Text(TextNode {
                    text: text.to_string(),
                    format,
                    style: t.style.clone(),
                }));
            }
        }
    }

    if out.is_empty() {
        out.push(Node::text("", TextFormat::empty()));
    }
    out
}

fn apply_format_range(
    doc: &Document,
    sel: &Selection,
    apply: &dyn Fn(TextFormat) -> TextFormat,
) -> Result<(Vec<Op>, Selection), String> {
    let mut ops: Vec<Op> = Vec::new();
    let mut anchor = sel.anchor.clone();
    let mut focus = sel.focus.clone();

    for (block, start_global, end_global) in selected_ranges(doc, sel)? {
        let children = block.el.children.as_slice();
        let new_children = apply_format_in_block(children, start_global, end_global, apply);

        for child_ix in (0..children.len()).rev() {
            let mut path = block.path.clone();
            path.push(child_ix);
            ops.push(Op::RemoveNode { path });
        }
        for (child_ix, node) in new_children.iter().cloned().enumerate() {
            let mut path = block.path.clone();
            path.push(child_ix);
            ops.push(Op::InsertNode { path, node });
        }

        for point in [&mut anchor, &mut focus] {
            let Some((inline_ix, block_path)) = point.path.split_last() else {
                continue;
            };
            if block_path != block.path.as_slice() {
                continue;
            }
            let global = point_global_offset(children, *inline_ix, point.offset);
            *point = point_for_global_offset(&block.path, &new_children, global);
        }
    }

    Ok((ops, Selection { anchor, focus }))
}
