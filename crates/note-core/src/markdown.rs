//! Flat markdown projections: of the legacy block array, and of a live document.

use serde_json::Value;

use crate::core::{Document, ElementKind, ElementNode, ListType, Node, VoidNode};

/// Projects a legacy block array to markdown, one line per block.
///
/// Empty headings vanish while empty checklist items are still written; older
/// notes were stored that way and previews depend on it. Input that is not an
/// array yields `""`.
pub fn to_markdown(blocks: &Value) -> String {
    let Some(blocks) = blocks.as_array() else {
        return String::new();
    };

    blocks
        .iter()
        .filter_map(block_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn block_line(block: &Value) -> Option<String> {
    let block_type = block.get("type").and_then(Value::as_str).unwrap_or("");
    let text = block_text(block.get("content"));
    let text = text.trim();

    let heading = |marker: &str| (!text.is_empty()).then(|| format!("{marker} {text}"));
    let with_marker = |marker: &str| {
        if text.is_empty() {
            marker.to_string()
        } else {
            format!("{marker} {text}")
        }
    };

    match block_type {
        "heading" | "heading_1" => heading("#"),
        "heading_2" => heading("##"),
        "heading_3" => heading("###"),
        "bulletListItem" => Some(with_marker("-")),
        "numberedListItem" => Some(with_marker("1.")),
        "checkListItem" => {
            let checked = block
                .get("props")
                .and_then(|props| props.get("checked"))
                .and_then(Value::as_bool)
                == Some(true);
            let mark = if checked { "x" } else { " " };
            Some(format!("- [{mark}] {text}"))
        }
        _ => (!text.is_empty()).then(|| text.to_string()),
    }
}

fn block_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(spans)) => spans
            .iter()
            .filter_map(|span| span.get("text").and_then(Value::as_str))
            .collect(),
        _ => String::new(),
    }
}

/// Projects a document with the same line conventions as [`to_markdown`].
/// Rules become `---`, images `![alt](src)`, and nested list items are
/// indented two spaces per level.
pub fn document_to_markdown(doc: &Document) -> String {
    let mut lines = Vec::new();
    for node in &doc.children {
        node_lines(node, 0, &mut lines);
    }
    lines.join("\n")
}

fn node_lines(node: &Node, depth: usize, lines: &mut Vec<String>) {
    match node {
        Node::Text(t) => push_nonempty(lines, t.text.trim()),
        Node::Void(VoidNode::HorizontalRule) => lines.push("---".to_string()),
        Node::Void(VoidNode::Image(image)) => {
            lines.push(format!("![{}]({})", image.alt_text, image.src));
        }
        Node::Void(VoidNode::LineBreak) => {}
        Node::Element(el) => element_lines(el, depth, lines),
    }
}

fn element_lines(el: &ElementNode, depth: usize, lines: &mut Vec<String>) {
    let text = inline_text(el);
    let text = text.trim();

    match &el.kind {
        ElementKind::Paragraph => {
            push_nonempty(lines, text);
            for child in &el.children {
                if let Node::Void(VoidNode::Image(_)) = child {
                    node_lines(child, depth, lines);
                }
            }
        }
        ElementKind::Heading { level } => {
            if !text.is_empty() {
                lines.push(format!("{} {text}", "#".repeat(usize::from(*level))));
            }
        }
        ElementKind::Quote => {
            if !text.is_empty() {
                lines.push(format!("> {text}"));
            }
        }
        ElementKind::Code { language } => {
            lines.push(format!("```{}", language.as_deref().unwrap_or("")));
            lines.extend(text.split('\n').map(str::to_string));
            lines.push("```".to_string());
        }
        ElementKind::List { list_type, .. } => {
            for item in &el.children {
                let Node::Element(item) = item else {
                    continue;
                };
                list_item_lines(item, *list_type, depth, lines);
            }
        }
        ElementKind::ListItem { .. } => list_item_lines(el, ListType::Bullet, depth, lines),
    }
}

fn list_item_lines(item: &ElementNode, list_type: ListType, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let text = inline_text(item);
    let text = text.trim();
    let marker = match (list_type, &item.kind) {
        (ListType::Check, ElementKind::ListItem { checked, .. }) => {
            if *checked == Some(true) {
                "- [x]".to_string()
            } else {
                "- [ ]".to_string()
            }
        }
        (ListType::Number, ElementKind::ListItem { value, .. }) => format!("{value}."),
        _ => "-".to_string(),
    };

    let has_inline = item.children.iter().any(|n| !matches!(n, Node::Element(_)));
    if has_inline {
        if list_type == ListType::Check || !text.is_empty() {
            lines.push(format!("{indent}{marker} {text}"));
        } else {
            lines.push(format!("{indent}{marker}"));
        }
    }

    for child in &item.children {
        if let Node::Element(nested) = child {
            element_lines(nested, depth + 1, lines);
        }
    }
}

fn inline_text(el: &ElementNode) -> String {
    el.children
        .iter()
        .filter(|n| !matches!(n, Node::Element(_)))
        .map(Node::plain_text)
        .collect()
}

fn push_nonempty(lines: &mut Vec<String>, text: &str) {
    if !text.is_empty() {
        lines.push(text.to_string());
    }
}
